//! Typed configuration for encrypting a document.

use crate::model::{Dictionary, PDFObject};
use bitflags::bitflags;
use std::fmt;

/// Encryption algorithm and key size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    /// RC4 with a 40-bit key (`V 1`, `R 2`).
    Rc4_40,
    /// RC4 with a 128-bit key (`V 2`, `R 3`).
    Rc4_128,
    /// AES-128 crypt filter (`V 4`, `R 4`, `AESV2`).
    Aes128,
    /// AES-256 crypt filter (`V 5`, `R 5` or `6`, `AESV3`).
    Aes256,
}

bitflags! {
    /// User access permission bits (`P`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        const PRINT = 1 << 2;
        const MODIFY = 1 << 3;
        const COPY = 1 << 4;
        const ANNOTATE = 1 << 5;
        const FILL_FORMS = 1 << 8;
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        const ASSEMBLE = 1 << 10;
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    const NAMED: [(Self, &'static str); 8] = [
        (Self::PRINT, "print"),
        (Self::MODIFY, "modify"),
        (Self::COPY, "copy"),
        (Self::ANNOTATE, "annotate"),
        (Self::FILL_FORMS, "fill-forms"),
        (Self::EXTRACT_ACCESSIBILITY, "extract-accessibility"),
        (Self::ASSEMBLE, "assemble"),
        (Self::PRINT_HIGH_QUALITY, "print-high-quality"),
    ];

    /// Bits as stored in `P`: reserved low bits clear, reserved high bits set.
    pub const fn to_p_value(self) -> i32 {
        ((self.bits() & 0xFFFF_FFFC) | 0xFFFF_F0C0) as i32
    }

    /// Names of the granted permissions.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Parse a permission name as printed by [`names`](Self::names).
    pub fn from_cli_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(flag, _)| *flag)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join(","))
    }
}

/// Settings for a new encryption dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionSettings {
    pub cipher: Cipher,
    /// Revision for [`Cipher::Aes256`]: 5 (SHA-256) or 6 (hardened hash).
    pub aes256_revision: u8,
    pub permissions: Permissions,
    pub encrypt_metadata: bool,
}

impl EncryptionSettings {
    pub const fn new(cipher: Cipher) -> Self {
        Self {
            cipher,
            aes256_revision: 6,
            permissions: Permissions::all(),
            encrypt_metadata: true,
        }
    }

    pub const fn rc4_40() -> Self {
        Self::new(Cipher::Rc4_40)
    }

    pub const fn rc4_128() -> Self {
        Self::new(Cipher::Rc4_128)
    }

    pub const fn aes_128() -> Self {
        Self::new(Cipher::Aes128)
    }

    /// AES-256 with revision 5 or 6; anything else selects 6.
    pub const fn aes_256(revision: u8) -> Self {
        let mut settings = Self::new(Cipher::Aes256);
        settings.aes256_revision = if revision == 5 { 5 } else { 6 };
        settings
    }

    pub const fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub const fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    /// `(V, R, key length in bits)`.
    pub const fn version_revision_bits(&self) -> (i64, i64, i64) {
        match self.cipher {
            Cipher::Rc4_40 => (1, 2, 40),
            Cipher::Rc4_128 => (2, 3, 128),
            Cipher::Aes128 => (4, 4, 128),
            Cipher::Aes256 => (5, self.aes256_revision as i64, 256),
        }
    }

    /// Encryption dictionary without the password-dependent entries, which
    /// [`SecurityHandler::on_create`](super::SecurityHandler::on_create) fills.
    pub fn to_dict(&self) -> Dictionary {
        let (v, r, bits) = self.version_revision_bits();
        let mut dict = Dictionary::new();
        dict.insert("Filter".into(), PDFObject::name("Standard"));
        dict.insert("V".into(), PDFObject::Int(v));
        dict.insert("R".into(), PDFObject::Int(r));
        dict.insert("Length".into(), PDFObject::Int(bits));
        dict.insert(
            "P".into(),
            PDFObject::Int(i64::from(self.permissions.to_p_value())),
        );

        if v >= 4 {
            let method = if v == 5 { "AESV3" } else { "AESV2" };
            let mut std_cf = Dictionary::new();
            std_cf.insert("CFM".into(), PDFObject::name(method));
            std_cf.insert("AuthEvent".into(), PDFObject::name("DocOpen"));
            std_cf.insert("Length".into(), PDFObject::Int(bits / 8));
            let mut cf = Dictionary::new();
            cf.insert("StdCF".into(), PDFObject::Dict(std_cf));
            dict.insert("CF".into(), PDFObject::Dict(cf));
            dict.insert("StmF".into(), PDFObject::name("StdCF"));
            dict.insert("StrF".into(), PDFObject::name("StdCF"));
        }
        if !self.encrypt_metadata {
            dict.insert("EncryptMetadata".into(), PDFObject::Bool(false));
        }
        dict
    }
}
