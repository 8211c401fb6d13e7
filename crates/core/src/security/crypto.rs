//! Per-object string and stream encryption.
//!
//! A [`CryptoHandler`] holds the authenticated file key and the cipher the
//! document uses. Keys for individual objects are derived from it, except for
//! AES-256 where the file key is used as-is.

use crate::codec::aes::{AES_BLOCK_SIZE, AesKey, CbcDecryptor, CbcEncryptor};
use crate::codec::arcfour::Arcfour;
use crate::model::{PDFObject, is_signature_dict};
use rand::Rng as _;

/// Cipher selected by the encryption dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    /// `Identity` crypt filter: data is stored in the clear.
    None,
    Rc4,
    Aes128,
    Aes256,
}

impl CipherKind {
    pub const fn is_aes(self) -> bool {
        matches!(self, Self::Aes128 | Self::Aes256)
    }
}

impl std::fmt::Display for CipherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Rc4 => "RC4",
            Self::Aes128 => "AES-128",
            Self::Aes256 => "AES-256",
        })
    }
}

/// File key plus cipher, ready to encrypt or decrypt object data.
#[derive(Clone)]
pub struct CryptoHandler {
    cipher: CipherKind,
    key: [u8; 32],
    key_len: usize,
    encrypt_metadata: bool,
}

impl std::fmt::Debug for CryptoHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoHandler")
            .field("cipher", &self.cipher)
            .field("key_len", &self.key_len)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .finish_non_exhaustive()
    }
}

impl CryptoHandler {
    /// `key` is truncated to 32 bytes. RC4 keys are 5 to 16 bytes, AES keys
    /// 16 or 32.
    pub fn new(cipher: CipherKind, key: &[u8], encrypt_metadata: bool) -> Self {
        let key_len = key.len().min(32);
        debug_assert!(match cipher {
            CipherKind::None => true,
            CipherKind::Rc4 => (5..=16).contains(&key_len),
            CipherKind::Aes128 => key_len == 16,
            CipherKind::Aes256 => key_len == 32,
        });
        let mut buf = [0u8; 32];
        if cipher != CipherKind::None {
            buf[..key_len].copy_from_slice(&key[..key_len]);
        }
        Self {
            cipher,
            key: buf,
            key_len,
            encrypt_metadata,
        }
    }

    /// Handler that passes data through unchanged.
    pub fn identity() -> Self {
        Self::new(CipherKind::None, &[], true)
    }

    pub const fn cipher(&self) -> CipherKind {
        self.cipher
    }

    pub const fn is_cipher_aes(&self) -> bool {
        self.cipher.is_aes()
    }

    /// Whether XMP metadata streams are encrypted along with everything else.
    pub const fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    /// Exact size of [`encrypt_content`](Self::encrypt_content) output.
    pub const fn encrypt_get_size(&self, src_len: usize) -> usize {
        if self.cipher.is_aes() {
            AES_BLOCK_SIZE + (src_len / AES_BLOCK_SIZE + 1) * AES_BLOCK_SIZE
        } else {
            src_len
        }
    }

    /// Upper bound on decrypted size.
    pub const fn decrypt_get_size(&self, src_len: usize) -> usize {
        if self.cipher.is_aes() {
            src_len.saturating_sub(AES_BLOCK_SIZE)
        } else {
            src_len
        }
    }

    /// Encrypt `src` for object `objnum`, drawing a fresh IV for AES.
    pub fn encrypt_content(&self, objnum: u32, genno: u32, src: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        if self.cipher.is_aes() {
            rand::rng().fill(&mut iv);
        }
        self.encrypt_content_with_iv(objnum, genno, src, &iv)
    }

    /// Encrypt with a caller-chosen IV. The IV is ignored by RC4.
    pub fn encrypt_content_with_iv(
        &self,
        objnum: u32,
        genno: u32,
        src: &[u8],
        iv: &[u8; AES_BLOCK_SIZE],
    ) -> Vec<u8> {
        match self.cipher {
            CipherKind::None => src.to_vec(),
            CipherKind::Rc4 => {
                let (key, len) = self.object_key(objnum, genno);
                Arcfour::new(&key[..len]).process(src)
            }
            CipherKind::Aes128 | CipherKind::Aes256 => {
                let mut cbc = CbcEncryptor::new(&self.aes_key(objnum, genno), iv);
                let mut out = Vec::with_capacity(self.encrypt_get_size(src.len()));
                out.extend_from_slice(iv);

                let mut chunks = src.chunks_exact(AES_BLOCK_SIZE);
                for chunk in &mut chunks {
                    let mut block = [0u8; AES_BLOCK_SIZE];
                    block.copy_from_slice(chunk);
                    cbc.encrypt_block(&mut block);
                    out.extend_from_slice(&block);
                }

                let tail = chunks.remainder();
                let mut last = [(AES_BLOCK_SIZE - tail.len()) as u8; AES_BLOCK_SIZE];
                last[..tail.len()].copy_from_slice(tail);
                cbc.encrypt_block(&mut last);
                out.extend_from_slice(&last);
                out
            }
        }
    }

    pub fn encrypt_start(&self, objnum: u32, genno: u32) -> CipherSession {
        let mut iv = [0u8; AES_BLOCK_SIZE];
        if self.cipher.is_aes() {
            rand::rng().fill(&mut iv);
        }
        self.encrypt_start_with_iv(objnum, genno, &iv)
    }

    pub fn encrypt_start_with_iv(
        &self,
        objnum: u32,
        genno: u32,
        iv: &[u8; AES_BLOCK_SIZE],
    ) -> CipherSession {
        let state = match self.cipher {
            CipherKind::None => SessionState::Identity,
            CipherKind::Rc4 => {
                let (key, len) = self.object_key(objnum, genno);
                SessionState::Rc4(Arcfour::new(&key[..len]))
            }
            CipherKind::Aes128 | CipherKind::Aes256 => SessionState::AesEncrypt {
                cbc: CbcEncryptor::new(&self.aes_key(objnum, genno), iv),
                pending_iv: Some(*iv),
                block: [0u8; AES_BLOCK_SIZE],
                filled: 0,
            },
        };
        CipherSession { state }
    }

    pub fn decrypt_start(&self, objnum: u32, genno: u32) -> CipherSession {
        let state = match self.cipher {
            CipherKind::None => SessionState::Identity,
            CipherKind::Rc4 => {
                let (key, len) = self.object_key(objnum, genno);
                SessionState::Rc4(Arcfour::new(&key[..len]))
            }
            CipherKind::Aes128 | CipherKind::Aes256 => SessionState::AesDecrypt {
                key: self.aes_key(objnum, genno),
                cbc: None,
                block: [0u8; AES_BLOCK_SIZE],
                filled: 0,
            },
        };
        CipherSession { state }
    }

    /// Single-call decryption.
    pub fn decrypt(&self, objnum: u32, genno: u32, src: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.decrypt_get_size(src.len()));
        let mut session = self.decrypt_start(objnum, genno);
        session.update(src, &mut out);
        session.finish(&mut out);
        out
    }

    /// Decrypt every string and stream reachable from `root` in place.
    ///
    /// The `Contents` of a dictionary that carries `Type` or `FT` is held
    /// back until the rest of the tree is done, since those keys may
    /// themselves be encrypted strings. Once they are readable, the held
    /// value is decrypted only if its dictionary is not a signature.
    pub fn decrypt_object_tree(&self, root: &mut PDFObject, objnum: u32, genno: u32) {
        if self.cipher == CipherKind::None {
            return;
        }

        let mut deferred: Vec<(ObjectPath, ObjectPath)> = Vec::new();
        let mut next: Option<ObjectPath> = Some(Vec::new());

        while let Some(start) = next.take() {
            let mut worklist = vec![start];
            while let Some(path) = worklist.pop() {
                let Some(obj) = resolve_mut(root, &path) else {
                    continue;
                };
                match obj {
                    PDFObject::String(s) => {
                        let plain = self.decrypt(objnum, genno, s.as_bytes());
                        s.set_bytes(plain);
                    }
                    PDFObject::Array(items) => {
                        for idx in (0..items.len()).rev() {
                            worklist.push(child_path(&path, PathStep::Index(idx)));
                        }
                    }
                    PDFObject::Dict(dict) => {
                        queue_dict_children(dict, &path, &mut worklist, &mut deferred);
                    }
                    PDFObject::Stream(stream) => {
                        if !self.encrypt_metadata && stream.is_metadata() {
                            tracing::debug!(objnum, "leaving metadata stream in the clear");
                        } else if self.is_cipher_aes()
                            && stream.get_rawdata().len() < AES_BLOCK_SIZE
                        {
                            stream.set_rawdata(Vec::new());
                        } else {
                            let plain = self.decrypt(objnum, genno, stream.get_rawdata());
                            stream.set_rawdata(plain);
                        }
                        queue_dict_children(&stream.attrs, &path, &mut worklist, &mut deferred);
                    }
                    _ => {}
                }
            }

            while let Some((parent, contents)) = deferred.pop() {
                let is_signature = resolve_mut(root, &parent)
                    .is_some_and(|p| p.dict().is_some_and(is_signature_dict));
                if !is_signature {
                    next = Some(contents);
                    break;
                }
            }
        }
    }

    fn object_key(&self, objnum: u32, genno: u32) -> ([u8; 16], usize) {
        let mut ctx = md5::Context::new();
        ctx.consume(&self.key[..self.key_len]);
        ctx.consume(&objnum.to_le_bytes()[..3]);
        ctx.consume(&genno.to_le_bytes()[..2]);
        if self.cipher.is_aes() {
            ctx.consume(b"sAlT");
        }
        (ctx.finalize().0, (self.key_len + 5).min(16))
    }

    fn aes_key(&self, objnum: u32, genno: u32) -> AesKey {
        if self.cipher == CipherKind::Aes256 {
            let mut key = [0u8; 32];
            key.copy_from_slice(&self.key);
            AesKey::Aes256(key)
        } else {
            AesKey::Aes128(self.object_key(objnum, genno).0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathStep {
    Key(String),
    Index(usize),
}

type ObjectPath = Vec<PathStep>;

fn child_path(parent: &ObjectPath, step: PathStep) -> ObjectPath {
    let mut path = parent.clone();
    path.push(step);
    path
}

fn queue_dict_children(
    dict: &crate::model::Dictionary,
    path: &ObjectPath,
    worklist: &mut Vec<ObjectPath>,
    deferred: &mut Vec<(ObjectPath, ObjectPath)>,
) {
    let maybe_signature = dict.contains_key("Type") || dict.contains_key("FT");
    for key in dict.keys().rev() {
        let child = child_path(path, PathStep::Key(key.clone()));
        if maybe_signature && key == "Contents" {
            deferred.push((path.clone(), child));
        } else {
            worklist.push(child);
        }
    }
}

fn resolve_mut<'a>(root: &'a mut PDFObject, path: &[PathStep]) -> Option<&'a mut PDFObject> {
    let mut current = root;
    for step in path {
        current = match (current, step) {
            (PDFObject::Array(items), PathStep::Index(i)) => items.get_mut(*i)?,
            (PDFObject::Dict(dict), PathStep::Key(k)) => dict.get_mut(k)?,
            (PDFObject::Stream(stream), PathStep::Key(k)) => stream.attrs.get_mut(k)?,
            _ => return None,
        };
    }
    Some(current)
}

/// One in-flight encryption or decryption.
///
/// Feed data with [`update`](Self::update) in chunks of any size, then
/// [`finish`](Self::finish) to flush the final block. The output equals that
/// of the single-call methods for the same input.
pub struct CipherSession {
    state: SessionState,
}

enum SessionState {
    Identity,
    Rc4(Arcfour),
    AesEncrypt {
        cbc: CbcEncryptor,
        pending_iv: Option<[u8; AES_BLOCK_SIZE]>,
        block: [u8; AES_BLOCK_SIZE],
        filled: usize,
    },
    AesDecrypt {
        key: AesKey,
        cbc: Option<CbcDecryptor>,
        block: [u8; AES_BLOCK_SIZE],
        filled: usize,
    },
}

impl CipherSession {
    pub fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        match &mut self.state {
            SessionState::Identity => out.extend_from_slice(chunk),
            SessionState::Rc4(rc4) => {
                let start = out.len();
                out.extend_from_slice(chunk);
                rc4.apply(&mut out[start..]);
            }
            SessionState::AesEncrypt {
                cbc,
                pending_iv,
                block,
                filled,
            } => {
                if let Some(iv) = pending_iv.take() {
                    out.extend_from_slice(&iv);
                }
                let mut src = chunk;
                while !src.is_empty() {
                    let take = (AES_BLOCK_SIZE - *filled).min(src.len());
                    block[*filled..*filled + take].copy_from_slice(&src[..take]);
                    *filled += take;
                    src = &src[take..];
                    if *filled == AES_BLOCK_SIZE {
                        cbc.encrypt_block(block);
                        out.extend_from_slice(block);
                        *filled = 0;
                    }
                }
            }
            SessionState::AesDecrypt {
                key,
                cbc,
                block,
                filled,
            } => {
                let mut src = chunk;
                loop {
                    let take = (AES_BLOCK_SIZE - *filled).min(src.len());
                    block[*filled..*filled + take].copy_from_slice(&src[..take]);
                    *filled += take;
                    src = &src[take..];
                    if *filled == AES_BLOCK_SIZE {
                        match cbc {
                            None => {
                                *cbc = Some(CbcDecryptor::new(key, block));
                                *filled = 0;
                            }
                            // The last full block is held back until more
                            // data arrives, since it may carry the padding.
                            Some(dec) if !src.is_empty() => {
                                let mut plain = *block;
                                dec.decrypt_block(&mut plain);
                                out.extend_from_slice(&plain);
                                *filled = 0;
                            }
                            Some(_) => {}
                        }
                    }
                    if src.is_empty() {
                        break;
                    }
                }
            }
        }
    }

    pub fn finish(self, out: &mut Vec<u8>) {
        match self.state {
            SessionState::Identity | SessionState::Rc4(_) => {}
            SessionState::AesEncrypt {
                mut cbc,
                pending_iv,
                mut block,
                filled,
            } => {
                if let Some(iv) = pending_iv {
                    out.extend_from_slice(&iv);
                }
                let pad = (AES_BLOCK_SIZE - filled) as u8;
                block[filled..].fill(pad);
                cbc.encrypt_block(&mut block);
                out.extend_from_slice(&block);
            }
            SessionState::AesDecrypt {
                cbc, block, filled, ..
            } => {
                let Some(mut dec) = cbc else {
                    tracing::debug!(len = filled, "AES data shorter than its IV");
                    return;
                };
                if filled != AES_BLOCK_SIZE {
                    if filled != 0 {
                        tracing::warn!(trailing = filled, "AES data is not block aligned");
                    }
                    return;
                }
                let mut plain = block;
                dec.decrypt_block(&mut plain);
                let pad = plain[AES_BLOCK_SIZE - 1] as usize;
                if pad <= AES_BLOCK_SIZE {
                    out.extend_from_slice(&plain[..AES_BLOCK_SIZE - pad]);
                } else {
                    tracing::warn!(pad, "invalid AES padding, dropping final block");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dictionary, PDFStream};

    fn aes128() -> CryptoHandler {
        CryptoHandler::new(CipherKind::Aes128, &[0x11; 16], true)
    }

    #[test]
    fn aes_output_size_includes_iv_and_padding() {
        let handler = aes128();
        for len in [0usize, 1, 15, 16, 17, 32] {
            let out = handler.encrypt_content(4, 0, &vec![0xAB; len]);
            assert_eq!(out.len(), handler.encrypt_get_size(len), "len {len}");
        }
    }

    #[test]
    fn aes_round_trip() {
        let handler = aes128();
        let plain = b"The quick brown fox jumps over the lazy dog".to_vec();
        let enc = handler.encrypt_content(9, 0, &plain);
        assert_eq!(handler.decrypt(9, 0, &enc), plain);
        // Different object, different key.
        assert_ne!(handler.decrypt(10, 0, &enc), plain);
    }

    #[test]
    fn short_aes_input_decrypts_to_nothing() {
        assert!(aes128().decrypt(1, 0, &[1, 2, 3]).is_empty());
    }

    #[test]
    fn oversized_pad_drops_final_block() {
        let handler = aes128();
        let iv = [0u8; 16];
        // Encrypt a block whose last byte claims a pad of 200.
        let mut forged = [0u8; 16];
        forged[15] = 200;
        let mut session = handler.encrypt_start_with_iv(1, 0, &iv);
        let mut out = Vec::new();
        session.update(&forged, &mut out);
        session.finish(&mut out);
        // Drop the real pad block so the forged one is last.
        out.truncate(32);
        assert!(handler.decrypt(1, 0, &out).is_empty());
    }

    #[test]
    fn rc4_is_symmetric() {
        let handler = CryptoHandler::new(CipherKind::Rc4, b"\x01\x02\x03\x04\x05", true);
        let enc = handler.encrypt_content(7, 0, b"hello");
        assert_ne!(enc, b"hello");
        assert_eq!(handler.decrypt(7, 0, &enc), b"hello");
    }

    #[test]
    fn tree_walk_skips_signature_contents() {
        let handler = aes128();
        let enc = |data: &[u8]| PDFObject::string(handler.encrypt_content(5, 0, data));

        let mut sig = Dictionary::new();
        sig.insert("Type".into(), PDFObject::name("Sig"));
        sig.insert("Contents".into(), PDFObject::hex_string(vec![0xde, 0xad]));
        sig.insert("Reason".into(), enc(b"approved"));

        let mut annot = Dictionary::new();
        annot.insert("Type".into(), PDFObject::name("Annot"));
        annot.insert("Contents".into(), enc(b"note"));

        let mut root = PDFObject::Array(vec![PDFObject::Dict(sig), PDFObject::Dict(annot)]);
        handler.decrypt_object_tree(&mut root, 5, 0);

        let items = root.as_array().unwrap();
        let sig = items[0].as_dict().unwrap();
        assert_eq!(sig["Contents"].as_string().unwrap(), &[0xde, 0xad]);
        assert_eq!(sig["Reason"].as_string().unwrap(), b"approved");
        let annot = items[1].as_dict().unwrap();
        assert_eq!(annot["Contents"].as_string().unwrap(), b"note");
    }

    #[test]
    fn tree_walk_leaves_clear_metadata_alone() {
        let handler = CryptoHandler::new(CipherKind::Aes128, &[0x22; 16], false);
        let mut attrs = Dictionary::new();
        attrs.insert("Type".into(), PDFObject::name("Metadata"));
        attrs.insert("Subtype".into(), PDFObject::name("XML"));
        let xmp = b"<x:xmpmeta/>".to_vec();
        let mut obj = PDFObject::Stream(Box::new(PDFStream::new(attrs, xmp.clone())));
        handler.decrypt_object_tree(&mut obj, 3, 0);
        assert_eq!(obj.as_stream().unwrap().get_rawdata(), &xmp[..]);
    }
}
