//! Standard security handler and per-object encryption.
//!
//! This module contains:
//! - `descriptor`: typed view of the `/Encrypt` dictionary
//! - `handler`: password authentication and file key derivation
//! - `crypto`: string/stream encryption and the decrypt walk
//! - `encryptor`: per-object binding used while writing
//! - `settings`: configuration for encrypting a document

pub mod crypto;
pub mod descriptor;
pub mod encryptor;
pub mod handler;
pub mod settings;

pub use crypto::{CipherKind, CipherSession, CryptoHandler};
pub use descriptor::EncryptionDescriptor;
pub use encryptor::Encryptor;
pub use handler::{
    PASSWORD_PADDING, PasswordEncoding, SecurityHandler, pad_password, revision6_hash,
};
pub use settings::{Cipher, EncryptionSettings, Permissions};
