//! Error types for the pdfseal security and writer library.

use thiserror::Error;

/// Primary error type for security, parsing and writing operations.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("invalid token at position {pos}: {msg}")]
    TokenError { pos: usize, msg: String },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("key not found: {0}")]
    KeyError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF object not found: {0}")]
    ObjectNotFound(u32),

    #[error("no valid xref table found")]
    NoValidXRef,

    #[error("PDF syntax error: {0}")]
    SyntaxError(String),

    #[error("decode error: {0}")]
    DecodeError(String),

    /// The supplied password matched neither the user nor the owner hash.
    #[error("incorrect password")]
    InvalidPassword,

    /// The encryption dictionary is malformed (short hash fields, bad key
    /// length, corrupt `Perms`).
    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    #[error("invalid writer state: {0}")]
    InvalidState(String),
}

impl PdfError {
    /// True when the document could not be opened because of the password,
    /// as opposed to a damaged or unsupported file.
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::InvalidPassword)
    }
}

/// Convenience Result type alias for PdfError.
pub type Result<T> = std::result::Result<T, PdfError>;
