//! AES-CBC primitives for the standard security handler.
//!
//! Whole-buffer helpers cover the fixed-size key wrapping done by the
//! revision 5/6 algorithms; the block-at-a-time chaining states back the
//! streaming cipher sessions used for strings and streams.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};

type Aes128CbcDec = Decryptor<aes::Aes128>;
type Aes256CbcDec = Decryptor<aes::Aes256>;
type Aes128CbcEnc = Encryptor<aes::Aes128>;
type Aes256CbcEnc = Encryptor<aes::Aes256>;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// An AES key of one of the two sizes PDF uses.
#[derive(Clone, PartialEq, Eq)]
pub enum AesKey {
    Aes128([u8; 16]),
    Aes256([u8; 32]),
}

impl AesKey {
    /// Build a key from a 16 or 32 byte slice.
    pub fn from_slice(key: &[u8]) -> Option<Self> {
        match key.len() {
            16 => {
                let mut k = [0u8; 16];
                k.copy_from_slice(key);
                Some(Self::Aes128(k))
            }
            32 => {
                let mut k = [0u8; 32];
                k.copy_from_slice(key);
                Some(Self::Aes256(k))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aes128(_) => f.write_str("AesKey::Aes128(..)"),
            Self::Aes256(_) => f.write_str("AesKey::Aes256(..)"),
        }
    }
}

/// CBC encryption chaining state, fed one block at a time.
pub enum CbcEncryptor {
    Aes128(Aes128CbcEnc),
    Aes256(Aes256CbcEnc),
}

impl CbcEncryptor {
    pub fn new(key: &AesKey, iv: &[u8; AES_BLOCK_SIZE]) -> Self {
        match key {
            AesKey::Aes128(k) => Self::Aes128(Aes128CbcEnc::new(
                GenericArray::from_slice(k),
                GenericArray::from_slice(iv),
            )),
            AesKey::Aes256(k) => Self::Aes256(Aes256CbcEnc::new(
                GenericArray::from_slice(k),
                GenericArray::from_slice(iv),
            )),
        }
    }

    /// Encrypt one block in place, chaining from the previous block.
    pub fn encrypt_block(&mut self, block: &mut [u8; AES_BLOCK_SIZE]) {
        match self {
            Self::Aes128(c) => c.encrypt_block_mut(GenericArray::from_mut_slice(block)),
            Self::Aes256(c) => c.encrypt_block_mut(GenericArray::from_mut_slice(block)),
        }
    }
}

/// CBC decryption chaining state, fed one block at a time.
pub enum CbcDecryptor {
    Aes128(Aes128CbcDec),
    Aes256(Aes256CbcDec),
}

impl CbcDecryptor {
    pub fn new(key: &AesKey, iv: &[u8; AES_BLOCK_SIZE]) -> Self {
        match key {
            AesKey::Aes128(k) => Self::Aes128(Aes128CbcDec::new(
                GenericArray::from_slice(k),
                GenericArray::from_slice(iv),
            )),
            AesKey::Aes256(k) => Self::Aes256(Aes256CbcDec::new(
                GenericArray::from_slice(k),
                GenericArray::from_slice(iv),
            )),
        }
    }

    /// Decrypt one block in place, chaining from the previous block.
    pub fn decrypt_block(&mut self, block: &mut [u8; AES_BLOCK_SIZE]) {
        match self {
            Self::Aes128(c) => c.decrypt_block_mut(GenericArray::from_mut_slice(block)),
            Self::Aes256(c) => c.decrypt_block_mut(GenericArray::from_mut_slice(block)),
        }
    }
}

/// AES-128-CBC encrypt a buffer whose length is a multiple of 16, no padding.
///
/// Used by the revision 6 hardened hash. Trailing bytes that do not fill a
/// block are left untouched.
pub fn aes128_cbc_encrypt_in_place(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let mut cipher = Aes128CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(iv));
    for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
}

/// AES-256-CBC encrypt 32 bytes with a zero IV and no padding.
///
/// This is the key wrapping used for `OE`, `UE`.
pub fn aes256_wrap_key(key: &[u8; 32], plain: &[u8; 32]) -> [u8; 32] {
    let mut cipher = CbcEncryptor::new(&AesKey::Aes256(*key), &[0u8; AES_BLOCK_SIZE]);
    let mut out = [0u8; 32];
    for (src, dst) in plain.chunks_exact(16).zip(out.chunks_exact_mut(16)) {
        let mut block = [0u8; AES_BLOCK_SIZE];
        block.copy_from_slice(src);
        cipher.encrypt_block(&mut block);
        dst.copy_from_slice(&block);
    }
    out
}

/// Reverse of [`aes256_wrap_key`].
pub fn aes256_unwrap_key(key: &[u8; 32], wrapped: &[u8; 32]) -> [u8; 32] {
    let mut cipher = CbcDecryptor::new(&AesKey::Aes256(*key), &[0u8; AES_BLOCK_SIZE]);
    let mut out = [0u8; 32];
    for (src, dst) in wrapped.chunks_exact(16).zip(out.chunks_exact_mut(16)) {
        let mut block = [0u8; AES_BLOCK_SIZE];
        block.copy_from_slice(src);
        cipher.decrypt_block(&mut block);
        dst.copy_from_slice(&block);
    }
    out
}

/// AES-256 encrypt a single block (ECB, equivalently CBC with a zero IV).
pub fn aes256_encrypt_block(key: &[u8; 32], block: &[u8; 16]) -> [u8; 16] {
    let mut out = *block;
    CbcEncryptor::new(&AesKey::Aes256(*key), &[0u8; 16]).encrypt_block(&mut out);
    out
}

/// AES-256 decrypt a single block (ECB, equivalently CBC with a zero IV).
pub fn aes256_decrypt_block(key: &[u8; 32], block: &[u8; 16]) -> [u8; 16] {
    let mut out = *block;
    CbcDecryptor::new(&AesKey::Aes256(*key), &[0u8; 16]).decrypt_block(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_then_unwrap_restores_key() {
        let kek = [7u8; 32];
        let file_key: [u8; 32] = std::array::from_fn(|i| i as u8);
        let wrapped = aes256_wrap_key(&kek, &file_key);
        assert_ne!(wrapped, file_key);
        assert_eq!(aes256_unwrap_key(&kek, &wrapped), file_key);
    }

    #[test]
    fn chained_blocks_match_whole_buffer_encrypt() {
        let key = [3u8; 16];
        let iv = [9u8; 16];
        let mut whole = [0x5Au8; 48];
        aes128_cbc_encrypt_in_place(&key, &iv, &mut whole);

        let mut enc = CbcEncryptor::new(&AesKey::Aes128(key), &iv);
        let mut pieces = Vec::new();
        for _ in 0..3 {
            let mut block = [0x5Au8; 16];
            enc.encrypt_block(&mut block);
            pieces.extend_from_slice(&block);
        }
        assert_eq!(&whole[..], &pieces[..]);
    }

    #[test]
    fn aes_key_rejects_odd_sizes() {
        assert!(AesKey::from_slice(&[0u8; 24]).is_none());
        assert!(matches!(AesKey::from_slice(&[0u8; 16]), Some(AesKey::Aes128(_))));
    }
}
