//! pdfseal - PDF standard security handler, per-object encryption and a
//! staged writer for full rewrites and incremental updates.

pub mod codec;
pub mod document;
pub mod error;
pub mod model;
pub mod parser;
pub mod security;
pub mod writer;

// Re-export codec modules for convenience
pub use codec::aes;
pub use codec::arcfour;

pub use document::{Document, SourceFile};
pub use error::{PdfError, Result};
pub use model::{Dictionary, PDFObject, PDFStream, PDFString};
pub use security::{
    Cipher, CipherKind, CryptoHandler, EncryptionDescriptor, EncryptionSettings, Encryptor,
    Permissions, SecurityHandler,
};
pub use writer::{Archive, CreateFlags, Creator, FileArchive, Stage};
