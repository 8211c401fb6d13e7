//! Standard security handler: file key derivation and password checks.
//!
//! Revisions 2 to 4 derive an RC4 or AES-128 key from the MD5 of the padded
//! password; revisions 5 and 6 unwrap a random AES-256 key with a SHA-2 based
//! password hash.

use super::crypto::{CipherKind, CryptoHandler};
use super::descriptor::EncryptionDescriptor;
use crate::codec::aes::{
    aes128_cbc_encrypt_in_place, aes256_decrypt_block, aes256_encrypt_block, aes256_unwrap_key,
    aes256_wrap_key,
};
use crate::codec::arcfour::Arcfour;
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, PDFObject};
use rand::Rng as _;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Password padding string.
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Revision 5/6 passwords are limited to this many bytes.
const MAX_AES256_PASSWORD_LEN: usize = 127;

/// Reinterpretation of the password bytes that authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordEncoding {
    /// Used as given.
    #[default]
    None,
    /// Each byte taken as a Latin-1 character and re-encoded as UTF-8.
    Latin1ToUtf8,
    /// Decoded as UTF-8 and re-encoded as Latin-1.
    Utf8ToLatin1,
}

impl PasswordEncoding {
    pub fn apply(self, password: &[u8]) -> Vec<u8> {
        match self {
            Self::None => password.to_vec(),
            Self::Latin1ToUtf8 => password
                .iter()
                .map(|&b| char::from(b))
                .collect::<String>()
                .into_bytes(),
            Self::Utf8ToLatin1 => String::from_utf8_lossy(password)
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

/// Authenticated state of the standard security handler.
#[derive(Clone)]
pub struct SecurityHandler {
    cipher: CipherKind,
    key_len: usize,
    key: [u8; 32],
    revision: i64,
    permissions: i32,
    file_id: Vec<u8>,
    owner_unlocked: bool,
    encrypt_metadata: bool,
    password_encoding: PasswordEncoding,
    crypto: CryptoHandler,
}

impl std::fmt::Debug for SecurityHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityHandler")
            .field("cipher", &self.cipher)
            .field("key_len", &self.key_len)
            .field("revision", &self.revision)
            .field("permissions", &self.permissions)
            .field("owner_unlocked", &self.owner_unlocked)
            .field("password_encoding", &self.password_encoding)
            .finish_non_exhaustive()
    }
}

impl SecurityHandler {
    /// Authenticate `password` against an existing encryption dictionary.
    ///
    /// The password is tried as the owner password first, then as the user
    /// password. `file_id` is the first element of the trailer `/ID`.
    pub fn on_init(
        descriptor: &EncryptionDescriptor,
        file_id: &[u8],
        password: impl AsRef<[u8]>,
    ) -> Result<Self> {
        let mut handler = Self::load(descriptor, file_id)?;
        if handler.cipher == CipherKind::None {
            return Ok(handler);
        }
        handler.validate_hash_fields(descriptor)?;

        if !handler.check_security(descriptor, password.as_ref())? {
            tracing::debug!(revision = handler.revision, "password rejected");
            return Err(PdfError::InvalidPassword);
        }
        handler.crypto = CryptoHandler::new(
            handler.cipher,
            handler.file_key(),
            handler.encrypt_metadata,
        );
        tracing::debug!(
            revision = handler.revision,
            cipher = %handler.cipher,
            owner = handler.owner_unlocked,
            "document unlocked"
        );
        Ok(handler)
    }

    /// Fill `O`, `U` (and for AES-256 `OE`, `UE`, `Perms`) of `dict` for a
    /// new file key. An empty owner password defaults to the user password.
    pub fn on_create(
        dict: &mut Dictionary,
        file_id: &[u8],
        user_password: &[u8],
        owner_password: &[u8],
    ) -> Result<Self> {
        Self::create(dict, file_id, user_password, owner_password, true)
    }

    /// Recompute the file key and `U` for a new file identifier, keeping the
    /// existing `O`.
    pub fn on_create_user_only(
        dict: &mut Dictionary,
        file_id: &[u8],
        user_password: &[u8],
    ) -> Result<Self> {
        Self::create(dict, file_id, user_password, b"", false)
    }

    fn create(
        dict: &mut Dictionary,
        file_id: &[u8],
        user_password: &[u8],
        owner_password: &[u8],
        with_owner: bool,
    ) -> Result<Self> {
        let descriptor = EncryptionDescriptor::from_dict(dict)?;
        let mut handler = Self::load(&descriptor, file_id)?;
        if handler.cipher == CipherKind::None {
            return Ok(handler);
        }
        let owner_password = if with_owner && owner_password.is_empty() {
            user_password
        } else {
            owner_password
        };

        if handler.revision >= 5 {
            let mut seed = [0u8; 16];
            rand::rng().fill(&mut seed);
            handler.key.copy_from_slice(&Sha256::digest(seed));
            handler.aes256_set_password(dict, truncate_aes256(user_password), false)?;
            if with_owner {
                handler.aes256_set_password(dict, truncate_aes256(owner_password), true)?;
            }
            handler.aes256_set_perms(dict);
        } else {
            if with_owner {
                let owner_hash = handler.compute_owner_hash(owner_password, user_password);
                dict.insert("O".into(), PDFObject::string(owner_hash.to_vec()));
            }
            let owner_hash = dict
                .get("O")
                .and_then(|v| v.as_string().ok())
                .ok_or_else(|| PdfError::EncryptionError("missing /O in /Encrypt".into()))?
                .to_vec();
            handler.key = handler.calc_encrypt_key(user_password, &owner_hash, false);
            let user_hash = handler.compute_user_hash();
            dict.insert("U".into(), PDFObject::string(user_hash.to_vec()));
        }

        handler.crypto = CryptoHandler::new(
            handler.cipher,
            handler.file_key(),
            handler.encrypt_metadata,
        );
        Ok(handler)
    }

    fn load(descriptor: &EncryptionDescriptor, file_id: &[u8]) -> Result<Self> {
        if !descriptor.is_standard() {
            let filter = if descriptor.filter.is_empty() {
                "<missing>"
            } else {
                descriptor.filter.as_str()
            };
            return Err(PdfError::UnsupportedEncryption(format!(
                "security handler /{filter}"
            )));
        }
        if !(2..=6).contains(&descriptor.revision) {
            return Err(PdfError::UnsupportedEncryption(format!(
                "standard handler revision {}",
                descriptor.revision
            )));
        }
        let (cipher, key_len) = load_cipher(descriptor)?;

        Ok(Self {
            cipher,
            key_len,
            key: [0u8; 32],
            revision: descriptor.revision,
            permissions: descriptor.permissions,
            file_id: file_id.to_vec(),
            owner_unlocked: false,
            encrypt_metadata: descriptor.encrypt_metadata,
            password_encoding: PasswordEncoding::None,
            crypto: CryptoHandler::identity(),
        })
    }

    fn validate_hash_fields(&self, descriptor: &EncryptionDescriptor) -> Result<()> {
        let require = |name: &str, field: Option<&[u8]>, min: usize| match field {
            Some(v) if v.len() >= min => Ok(()),
            Some(v) => Err(PdfError::EncryptionError(format!(
                "/{name} is {} bytes, expected at least {min}",
                v.len()
            ))),
            None => Err(PdfError::EncryptionError(format!(
                "missing /{name} in /Encrypt"
            ))),
        };
        if self.revision >= 5 {
            require("O", Some(&descriptor.owner_hash), 48)?;
            require("U", Some(&descriptor.user_hash), 48)?;
            require("OE", descriptor.owner_key.as_deref(), 32)?;
            require("UE", descriptor.user_key.as_deref(), 32)?;
            require("Perms", descriptor.perms.as_deref(), 16)?;
        } else {
            require("O", Some(&descriptor.owner_hash), 32)?;
            require("U", Some(&descriptor.user_hash), 16)?;
        }
        Ok(())
    }

    fn check_security(
        &mut self,
        descriptor: &EncryptionDescriptor,
        password: &[u8],
    ) -> Result<bool> {
        if !password.is_empty() && self.check_password(descriptor, password, true)? {
            self.owner_unlocked = true;
            return Ok(true);
        }
        self.check_password(descriptor, password, false)
    }

    fn check_password(
        &mut self,
        descriptor: &EncryptionDescriptor,
        password: &[u8],
        owner: bool,
    ) -> Result<bool> {
        if let Some(key) = self.check_password_impl(descriptor, password, owner)? {
            self.key = key;
            self.password_encoding = PasswordEncoding::None;
            return Ok(true);
        }
        if password.is_ascii() {
            return Ok(false);
        }

        let conversion = if self.revision >= 5 {
            PasswordEncoding::Latin1ToUtf8
        } else {
            PasswordEncoding::Utf8ToLatin1
        };
        match self.check_password_impl(descriptor, &conversion.apply(password), owner)? {
            Some(key) => {
                self.key = key;
                self.password_encoding = conversion;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn check_password_impl(
        &self,
        descriptor: &EncryptionDescriptor,
        password: &[u8],
        owner: bool,
    ) -> Result<Option<[u8; 32]>> {
        if self.revision >= 5 {
            return self.aes256_check_password(descriptor, password, owner);
        }
        if owner {
            return Ok(self.check_owner_password(descriptor, password));
        }
        Ok(self
            .check_user_password(descriptor, password, false)
            .or_else(|| self.check_user_password(descriptor, password, true)))
    }

    /// Derive the file key from a user password (revisions 2 to 4).
    ///
    /// With `ignore_metadata` the `EncryptMetadata false` marker is left out
    /// of the hash, for files whose writer forgot it.
    pub fn calc_encrypt_key(
        &self,
        password: &[u8],
        owner_hash: &[u8],
        ignore_metadata: bool,
    ) -> [u8; 32] {
        let mut ctx = md5::Context::new();
        ctx.consume(pad_password(password));
        ctx.consume(owner_hash);
        ctx.consume((self.permissions as u32).to_le_bytes());
        ctx.consume(&self.file_id);
        if !ignore_metadata && self.revision >= 3 && !self.encrypt_metadata {
            ctx.consume([0xFF; 4]);
        }
        let mut digest = ctx.finalize().0;

        let copy_len = self.key_len.min(digest.len());
        if self.revision >= 3 {
            for _ in 0..50 {
                digest = md5::compute(&digest[..copy_len]).0;
            }
        }
        let mut key = [0u8; 32];
        key[..copy_len].copy_from_slice(&digest[..copy_len]);
        key
    }

    /// Returns the file key when `password` is the user password.
    pub fn check_user_password(
        &self,
        descriptor: &EncryptionDescriptor,
        password: &[u8],
        ignore_metadata: bool,
    ) -> Option<[u8; 32]> {
        let key = self.calc_encrypt_key(password, &descriptor.owner_hash, ignore_metadata);
        let user_hash = descriptor.user_hash.get(..16)?;
        let file_key = &key[..self.key_len];

        if self.revision == 2 {
            let mut buf = PASSWORD_PADDING;
            Arcfour::crypt(file_key, &mut buf);
            return (buf[..16] == *user_hash).then_some(key);
        }

        let mut test = [0u8; 32];
        let copy_len = descriptor.user_hash.len().min(32);
        test[..copy_len].copy_from_slice(&descriptor.user_hash[..copy_len]);
        rc4_rounds(file_key, &mut test, (0..20).rev());

        let mut ctx = md5::Context::new();
        ctx.consume(PASSWORD_PADDING);
        ctx.consume(&self.file_id);
        (test[..16] == ctx.finalize().0).then_some(key)
    }

    /// Recover the user password from an owner password by decrypting `O`.
    pub fn get_user_password(
        &self,
        descriptor: &EncryptionDescriptor,
        owner_password: &[u8],
    ) -> Vec<u8> {
        let owner_key = self.owner_key(owner_password);
        let Some(owner_hash) = descriptor.owner_hash.get(..32) else {
            return Vec::new();
        };
        let mut buf = [0u8; 32];
        buf.copy_from_slice(owner_hash);
        if self.revision == 2 {
            Arcfour::crypt(&owner_key, &mut buf);
        } else {
            rc4_rounds(&owner_key, &mut buf, (0..20).rev());
        }

        let len = (0..=buf.len())
            .find(|&n| buf[n..] == PASSWORD_PADDING[..buf.len() - n])
            .unwrap_or(buf.len());
        buf[..len].to_vec()
    }

    fn check_owner_password(
        &self,
        descriptor: &EncryptionDescriptor,
        password: &[u8],
    ) -> Option<[u8; 32]> {
        let user_password = self.get_user_password(descriptor, password);
        self.check_user_password(descriptor, &user_password, false)
            .or_else(|| self.check_user_password(descriptor, &user_password, true))
    }

    /// RC4 key protecting `O`, derived from the owner password.
    fn owner_key(&self, owner_password: &[u8]) -> Vec<u8> {
        let mut digest = md5::compute(pad_password(owner_password)).0;
        if self.revision >= 3 {
            for _ in 0..50 {
                digest = md5::compute(digest).0;
            }
        }
        digest[..self.key_len.min(16)].to_vec()
    }

    fn compute_owner_hash(&self, owner_password: &[u8], user_password: &[u8]) -> [u8; 32] {
        let owner_key = self.owner_key(owner_password);
        let mut passcode = pad_password(user_password);
        Arcfour::crypt(&owner_key, &mut passcode);
        if self.revision >= 3 {
            rc4_rounds(&owner_key, &mut passcode, 1..20);
        }
        passcode
    }

    fn compute_user_hash(&self) -> [u8; 32] {
        let key = &self.key[..self.key_len];
        if self.revision < 3 {
            let mut buf = PASSWORD_PADDING;
            Arcfour::crypt(key, &mut buf);
            return buf;
        }

        let mut ctx = md5::Context::new();
        ctx.consume(PASSWORD_PADDING);
        ctx.consume(&self.file_id);
        let mut digest = ctx.finalize().0;
        Arcfour::crypt(key, &mut digest);
        rc4_rounds(key, &mut digest, 1..20);

        let mut out = [0u8; 32];
        out[..16].copy_from_slice(&digest);
        out[16..].copy_from_slice(&md5::compute(digest).0);
        out
    }

    fn aes256_hash(&self, password: &[u8], salt: &[u8; 8], vector: Option<&[u8; 48]>) -> [u8; 32] {
        if self.revision >= 6 {
            return revision6_hash(password, salt, vector);
        }
        let mut sha = Sha256::new();
        sha.update(password);
        sha.update(salt);
        if let Some(v) = vector {
            sha.update(v);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&sha.finalize());
        out
    }

    /// Check a revision 5/6 password; returns the unwrapped file key.
    pub fn aes256_check_password(
        &self,
        descriptor: &EncryptionDescriptor,
        password: &[u8],
        owner: bool,
    ) -> Result<Option<[u8; 32]>> {
        let password = truncate_aes256(password);
        let (hash_field, wrapped_key) = if owner {
            (&descriptor.owner_hash, descriptor.owner_key.as_deref())
        } else {
            (&descriptor.user_hash, descriptor.user_key.as_deref())
        };
        let (hash, validation_salt, key_salt) = split_hash_field(hash_field)?;
        let vector = if owner {
            Some(user_vector(&descriptor.user_hash)?)
        } else {
            None
        };

        if self.aes256_hash(password, &validation_salt, vector) != *hash {
            return Ok(None);
        }

        let intermediate = self.aes256_hash(password, &key_salt, vector);
        let wrapped: &[u8; 32] = wrapped_key
            .and_then(|k| k.get(..32))
            .and_then(|k| k.try_into().ok())
            .ok_or_else(|| PdfError::EncryptionError("/OE or /UE shorter than 32 bytes".into()))?;
        let file_key = aes256_unwrap_key(&intermediate, wrapped);
        self.verify_perms(descriptor, &file_key)?;
        Ok(Some(file_key))
    }

    fn verify_perms(&self, descriptor: &EncryptionDescriptor, file_key: &[u8; 32]) -> Result<()> {
        let perms: &[u8; 16] = descriptor
            .perms
            .as_deref()
            .and_then(|p| p.get(..16))
            .and_then(|p| p.try_into().ok())
            .ok_or_else(|| PdfError::EncryptionError("/Perms shorter than 16 bytes".into()))?;
        let plain = aes256_decrypt_block(file_key, perms);

        if &plain[9..12] != b"adb" {
            return Err(PdfError::EncryptionError("/Perms failed to decrypt".into()));
        }
        let stored = u32::from_le_bytes([plain[0], plain[1], plain[2], plain[3]]);
        if stored != self.permissions as u32 {
            return Err(PdfError::EncryptionError(format!(
                "/Perms value {stored:#010x} does not match /P"
            )));
        }
        match plain[8] {
            b'T' if !self.encrypt_metadata => Err(PdfError::EncryptionError(
                "/Perms requires encrypted metadata but /EncryptMetadata is false".into(),
            )),
            b'F' if self.encrypt_metadata => {
                tracing::warn!("/Perms marks metadata unencrypted but /EncryptMetadata is true");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn aes256_set_password(
        &self,
        dict: &mut Dictionary,
        password: &[u8],
        owner: bool,
    ) -> Result<()> {
        let mut sha = Sha1::new();
        sha.update(self.key);
        sha.update(b"hello");
        let digest = sha.finalize();
        let mut validation_salt = [0u8; 8];
        let mut key_salt = [0u8; 8];
        validation_salt.copy_from_slice(&digest[..8]);
        key_salt.copy_from_slice(&digest[8..16]);

        let vector = if owner {
            let user_hash = dict
                .get("U")
                .and_then(|v| v.as_string().ok())
                .unwrap_or_default();
            Some(*user_vector(user_hash)?)
        } else {
            None
        };

        let mut field = self.aes256_hash(password, &validation_salt, vector.as_ref()).to_vec();
        field.extend_from_slice(&digest[..16]);
        let intermediate = self.aes256_hash(password, &key_salt, vector.as_ref());
        let wrapped = aes256_wrap_key(&intermediate, &self.key);

        let (hash_key, wrapped_key) = if owner { ("O", "OE") } else { ("U", "UE") };
        dict.insert(hash_key.into(), PDFObject::string(field));
        dict.insert(wrapped_key.into(), PDFObject::string(wrapped.to_vec()));
        Ok(())
    }

    fn aes256_set_perms(&self, dict: &mut Dictionary) {
        let mut buf = [0u8; 16];
        buf[..4].copy_from_slice(&(self.permissions as u32).to_le_bytes());
        buf[4..8].fill(0xFF);
        buf[8] = if self.encrypt_metadata { b'T' } else { b'F' };
        buf[9..12].copy_from_slice(b"adb");
        rand::rng().fill(&mut buf[12..]);
        let perms = aes256_encrypt_block(&self.key, &buf);
        dict.insert("Perms".into(), PDFObject::string(perms.to_vec()));
    }

    /// Effective permission bits.
    ///
    /// An owner-authenticated handler reports every permission when
    /// `owner_perms` is set. The two reserved low bits are always clear and
    /// the reserved high bits always set.
    pub fn permissions(&self, owner_perms: bool) -> u32 {
        let raw = if self.owner_unlocked && owner_perms {
            0xFFFF_FFFF
        } else {
            self.permissions as u32
        };
        (raw & 0xFFFF_FFFC) | 0xFFFF_F0C0
    }

    /// `password` re-encoded the way it was when it authenticated.
    pub fn encoded_password(&self, password: &[u8]) -> Vec<u8> {
        self.password_encoding.apply(password)
    }

    pub const fn password_encoding(&self) -> PasswordEncoding {
        self.password_encoding
    }

    pub const fn cipher(&self) -> CipherKind {
        self.cipher
    }

    pub const fn key_len(&self) -> usize {
        self.key_len
    }

    pub const fn revision(&self) -> i64 {
        self.revision
    }

    pub const fn is_owner_unlocked(&self) -> bool {
        self.owner_unlocked
    }

    pub const fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    pub fn file_key(&self) -> &[u8] {
        &self.key[..self.key_len]
    }

    pub const fn crypto_handler(&self) -> &CryptoHandler {
        &self.crypto
    }
}

/// Cipher and key length selected by the dictionary.
fn load_cipher(descriptor: &EncryptionDescriptor) -> Result<(CipherKind, usize)> {
    let version = descriptor.version;
    if !(0..=5).contains(&version) {
        return Err(PdfError::UnsupportedEncryption(format!(
            "encryption version {version}"
        )));
    }
    let (cipher, key_len) = if version < 4 {
        let len = if version > 1 {
            descriptor.length.unwrap_or(40) / 8
        } else {
            5
        };
        (CipherKind::Rc4, len)
    } else {
        let stream_filter = descriptor.stream_filter.as_deref().unwrap_or("Identity");
        let string_filter = descriptor.string_filter.as_deref().unwrap_or("Identity");
        if stream_filter != string_filter {
            return Err(PdfError::UnsupportedEncryption(format!(
                "/StmF {stream_filter} differs from /StrF {string_filter}"
            )));
        }
        if stream_filter == "Identity" {
            return Ok((CipherKind::None, 0));
        }

        let filter = descriptor.crypt_filter(stream_filter).ok_or_else(|| {
            PdfError::EncryptionError(format!("crypt filter /{stream_filter} missing from /CF"))
        })?;
        let mut bits = if version == 4 {
            match filter.get("Length").and_then(|v| v.as_int().ok()) {
                Some(n) if n != 0 => n,
                _ => descriptor.length.unwrap_or(128),
            }
        } else {
            descriptor.length.unwrap_or(256)
        };
        if bits < 0 {
            return Err(PdfError::EncryptionError(format!("negative key length {bits}")));
        }
        // Some writers give the crypt filter length in bytes.
        if bits < 40 {
            bits *= 8;
        }
        let len = bits / 8;

        let method = filter
            .get("CFM")
            .and_then(|v| v.as_name().ok())
            .unwrap_or("None");
        match method {
            "V2" => (CipherKind::Rc4, len),
            "AESV2" | "AESV3" if len == 32 => (CipherKind::Aes256, len),
            "AESV2" | "AESV3" => (CipherKind::Aes128, len),
            "None" => return Ok((CipherKind::None, 0)),
            other => {
                return Err(PdfError::UnsupportedEncryption(format!(
                    "crypt filter method /{other}"
                )));
            }
        }
    };

    let valid = match cipher {
        CipherKind::Rc4 => (5..=16).contains(&key_len),
        CipherKind::Aes128 => key_len == 16,
        CipherKind::Aes256 => key_len == 32,
        CipherKind::None => true,
    };
    if !valid {
        return Err(PdfError::EncryptionError(format!(
            "invalid {cipher} key length {key_len}"
        )));
    }
    Ok((cipher, key_len as usize))
}

/// Pad or truncate a password to 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PASSWORD_PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

/// RC4 `data` once per round with the key XORed by the round number.
fn rc4_rounds(key: &[u8], data: &mut [u8], rounds: impl Iterator<Item = u8>) {
    let mut round_key = [0u8; 32];
    let round_key = &mut round_key[..key.len()];
    for i in rounds {
        for (dst, src) in round_key.iter_mut().zip(key) {
            *dst = src ^ i;
        }
        Arcfour::crypt(round_key, data);
    }
}

fn truncate_aes256(password: &[u8]) -> &[u8] {
    &password[..password.len().min(MAX_AES256_PASSWORD_LEN)]
}

fn split_hash_field(field: &[u8]) -> Result<(&[u8; 32], [u8; 8], [u8; 8])> {
    if field.len() < 48 {
        return Err(PdfError::EncryptionError(format!(
            "password hash is {} bytes, expected 48",
            field.len()
        )));
    }
    let hash = <&[u8; 32]>::try_from(&field[..32])
        .map_err(|_| PdfError::EncryptionError("password hash truncated".into()))?;
    let mut validation_salt = [0u8; 8];
    let mut key_salt = [0u8; 8];
    validation_salt.copy_from_slice(&field[32..40]);
    key_salt.copy_from_slice(&field[40..48]);
    Ok((hash, validation_salt, key_salt))
}

fn user_vector(user_hash: &[u8]) -> Result<&[u8; 48]> {
    user_hash
        .get(..48)
        .and_then(|u| u.try_into().ok())
        .ok_or_else(|| PdfError::EncryptionError("/U shorter than 48 bytes".into()))
}

/// Hardened password hash of revision 6.
///
/// Rounds of AES-128-CBC over 64 repetitions of `password ‖ K ‖ vector`,
/// each followed by SHA-256, -384 or -512 chosen by the ciphertext. At
/// least 64 rounds run; after that the last ciphertext byte decides when
/// to stop.
pub fn revision6_hash(password: &[u8], salt: &[u8; 8], vector: Option<&[u8; 48]>) -> [u8; 32] {
    let vector: &[u8] = vector.map_or(&[], |v| v.as_slice());
    let mut sha = Sha256::new();
    sha.update(password);
    sha.update(salt);
    sha.update(vector);
    let mut k = sha.finalize().to_vec();

    let mut round = 0usize;
    let mut last = 0u8;
    while round < 64 || round < usize::from(last) + 32 {
        let mut block = Vec::with_capacity((password.len() + k.len() + vector.len()) * 64);
        for _ in 0..64 {
            block.extend_from_slice(password);
            block.extend_from_slice(&k);
            block.extend_from_slice(vector);
        }

        let mut key = [0u8; 16];
        let mut iv = [0u8; 16];
        key.copy_from_slice(&k[..16]);
        iv.copy_from_slice(&k[16..32]);
        aes128_cbc_encrypt_in_place(&key, &iv, &mut block);

        // 256 = 1 (mod 3), so the 128-bit big-endian value mod 3 is the
        // byte sum mod 3.
        let selector = block[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
        k = match selector {
            0 => Sha256::digest(&block).to_vec(),
            1 => Sha384::digest(&block).to_vec(),
            _ => Sha512::digest(&block).to_vec(),
        };
        last = block.last().copied().unwrap_or(0);
        round += 1;
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_fills_short_passwords() {
        let padded = pad_password(b"ab");
        assert_eq!(&padded[..2], b"ab");
        assert_eq!(&padded[2..], &PASSWORD_PADDING[..30]);
        assert_eq!(pad_password(&[7u8; 40]), [7u8; 32]);
    }

    #[test]
    fn revision6_hash_is_deterministic_and_input_sensitive() {
        let salt = [1u8; 8];
        let a = revision6_hash(b"password", &salt, None);
        assert_eq!(a, revision6_hash(b"password", &salt, None));
        assert_ne!(a, revision6_hash(b"passwore", &salt, None));
        assert_ne!(a, revision6_hash(b"password", &[2u8; 8], None));
        assert_ne!(a, revision6_hash(b"password", &salt, Some(&[0u8; 48])));
    }

    #[test]
    fn revision6_hash_known_answers() {
        assert_eq!(
            hex::encode(revision6_hash(b"password", &[1u8; 8], None)),
            "56b1b46cb090dead71998d52c3b2eda13f9d129f787b2f88e3ca76c7d567cbb0"
        );
        let vector: [u8; 48] = std::array::from_fn(|i| i as u8);
        assert_eq!(
            hex::encode(revision6_hash(b"owner", &[7u8; 8], Some(&vector))),
            "4f7030de29a94c4a123aa2f2f3aba9e63ba1c1c259fd1bc2717281e73d36769c"
        );
    }

    #[test]
    fn password_encodings() {
        assert_eq!(PasswordEncoding::Latin1ToUtf8.apply(b"\xe9"), "é".as_bytes());
        assert_eq!(PasswordEncoding::Utf8ToLatin1.apply("é".as_bytes()), b"\xe9");
        assert_eq!(PasswordEncoding::Utf8ToLatin1.apply("€".as_bytes()), b"?");
        assert_eq!(PasswordEncoding::None.apply(b"abc"), b"abc");
    }

    #[test]
    fn non_standard_filter_is_unsupported() {
        let mut dict = Dictionary::new();
        dict.insert("Filter".into(), PDFObject::name("Adobe.PubSec"));
        dict.insert("R".into(), PDFObject::Int(4));
        let desc = EncryptionDescriptor::from_dict(&dict).unwrap();
        assert!(matches!(
            SecurityHandler::on_init(&desc, b"", b""),
            Err(PdfError::UnsupportedEncryption(_))
        ));
    }

    #[test]
    fn mismatched_stream_and_string_filters_are_unsupported() {
        let mut dict = Dictionary::new();
        dict.insert("Filter".into(), PDFObject::name("Standard"));
        dict.insert("V".into(), PDFObject::Int(4));
        dict.insert("R".into(), PDFObject::Int(4));
        dict.insert("StmF".into(), PDFObject::name("StdCF"));
        dict.insert("StrF".into(), PDFObject::name("Identity"));
        let desc = EncryptionDescriptor::from_dict(&dict).unwrap();
        assert!(matches!(
            load_cipher(&desc),
            Err(PdfError::UnsupportedEncryption(_))
        ));
    }

    #[test]
    fn crypt_filter_length_in_bytes() {
        let mut cf = Dictionary::new();
        let mut std_cf = Dictionary::new();
        std_cf.insert("CFM".into(), PDFObject::name("AESV2"));
        std_cf.insert("Length".into(), PDFObject::Int(16));
        cf.insert("StdCF".into(), PDFObject::Dict(std_cf));

        let mut dict = Dictionary::new();
        dict.insert("Filter".into(), PDFObject::name("Standard"));
        dict.insert("V".into(), PDFObject::Int(4));
        dict.insert("R".into(), PDFObject::Int(4));
        dict.insert("CF".into(), PDFObject::Dict(cf));
        dict.insert("StmF".into(), PDFObject::name("StdCF"));
        dict.insert("StrF".into(), PDFObject::name("StdCF"));
        let desc = EncryptionDescriptor::from_dict(&dict).unwrap();
        assert_eq!(load_cipher(&desc).unwrap(), (CipherKind::Aes128, 16));
    }

    #[test]
    fn bad_rc4_key_length_is_structural() {
        let mut dict = Dictionary::new();
        dict.insert("Filter".into(), PDFObject::name("Standard"));
        dict.insert("V".into(), PDFObject::Int(2));
        dict.insert("R".into(), PDFObject::Int(3));
        dict.insert("Length".into(), PDFObject::Int(256));
        let desc = EncryptionDescriptor::from_dict(&dict).unwrap();
        assert!(matches!(load_cipher(&desc), Err(PdfError::EncryptionError(_))));
    }

    #[test]
    fn permission_masking() {
        let mut dict = Dictionary::new();
        dict.insert("Filter".into(), PDFObject::name("Standard"));
        dict.insert("V".into(), PDFObject::Int(1));
        dict.insert("R".into(), PDFObject::Int(2));
        dict.insert("P".into(), PDFObject::Int(-3904));
        let desc = EncryptionDescriptor::from_dict(&dict).unwrap();
        let handler = SecurityHandler::load(&desc, b"").unwrap();
        assert_eq!(handler.permissions(true), (-3904i32 as u32 & 0xFFFF_FFFC) | 0xFFFF_F0C0);
    }
}
