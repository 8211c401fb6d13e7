//! Typed view of an `/Encrypt` dictionary.

use crate::error::{PdfError, Result};
use crate::model::{Dictionary, PDFObject};

/// The fields of an encryption dictionary the standard handler reads.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionDescriptor {
    /// `Filter`; only `Standard` is supported.
    pub filter: String,
    /// `V`
    pub version: i64,
    /// `R`
    pub revision: i64,
    /// `Length` in bits, when present.
    pub length: Option<i64>,
    /// `P`, sign-extended.
    pub permissions: i32,
    /// `O`
    pub owner_hash: Vec<u8>,
    /// `U`
    pub user_hash: Vec<u8>,
    /// `OE` (revision 5 and later).
    pub owner_key: Option<Vec<u8>>,
    /// `UE` (revision 5 and later).
    pub user_key: Option<Vec<u8>>,
    /// `Perms` (revision 5 and later).
    pub perms: Option<Vec<u8>>,
    pub stream_filter: Option<String>,
    pub string_filter: Option<String>,
    /// `CF`: crypt filter name to its dictionary.
    pub crypt_filters: Dictionary,
    pub encrypt_metadata: bool,
}

impl EncryptionDescriptor {
    pub fn from_dict(dict: &Dictionary) -> Result<Self> {
        let filter = dict
            .get("Filter")
            .and_then(|v| v.as_name().ok())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            filter,
            version: get_int_default(dict, "V", 0),
            revision: get_int_default(dict, "R", 0),
            length: dict.get("Length").and_then(|v| v.as_int().ok()),
            // Writers disagree on signed vs unsigned P; keep the low 32 bits.
            permissions: get_int_default(dict, "P", -1) as i32,
            owner_hash: get_bytes(dict, "O")?.unwrap_or_default(),
            user_hash: get_bytes(dict, "U")?.unwrap_or_default(),
            owner_key: get_bytes(dict, "OE")?,
            user_key: get_bytes(dict, "UE")?,
            perms: get_bytes(dict, "Perms")?,
            stream_filter: get_name(dict, "StmF"),
            string_filter: get_name(dict, "StrF"),
            crypt_filters: dict
                .get("CF")
                .and_then(|v| v.as_dict().ok())
                .cloned()
                .unwrap_or_default(),
            encrypt_metadata: dict
                .get("EncryptMetadata")
                .and_then(|v| v.as_bool().ok())
                .unwrap_or(true),
        })
    }

    pub fn is_standard(&self) -> bool {
        self.filter == "Standard"
    }

    /// Crypt filter dictionary named `name` in `CF`.
    pub fn crypt_filter(&self, name: &str) -> Option<&Dictionary> {
        self.crypt_filters.get(name).and_then(|v| v.as_dict().ok())
    }
}

fn get_int_default(dict: &Dictionary, key: &str, default: i64) -> i64 {
    dict.get(key)
        .and_then(|v| v.as_int().ok())
        .unwrap_or(default)
}

fn get_name(dict: &Dictionary, key: &str) -> Option<String> {
    dict.get(key)
        .and_then(|v| v.as_name().ok())
        .map(str::to_string)
}

fn get_bytes(dict: &Dictionary, key: &str) -> Result<Option<Vec<u8>>> {
    match dict.get(key) {
        None | Some(PDFObject::Null) => Ok(None),
        Some(PDFObject::String(s)) => Ok(Some(s.as_bytes().to_vec())),
        Some(other) => Err(PdfError::EncryptionError(format!(
            "/{key} in /Encrypt must be a string, got {}",
            other.type_name()
        ))),
    }
}
