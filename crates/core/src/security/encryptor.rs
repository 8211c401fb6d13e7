//! Binds a [`CryptoHandler`] to the object currently being written.

use super::crypto::CryptoHandler;
use std::borrow::Cow;

/// Encrypts strings and streams of one indirect object.
///
/// Objects are always written as generation 0, so that is the generation
/// used for key derivation.
#[derive(Debug, Clone, Copy)]
pub struct Encryptor<'a> {
    handler: &'a CryptoHandler,
    objnum: u32,
}

impl<'a> Encryptor<'a> {
    pub const fn new(handler: &'a CryptoHandler, objnum: u32) -> Self {
        Self { handler, objnum }
    }

    pub const fn objnum(&self) -> u32 {
        self.objnum
    }

    pub const fn encrypts_metadata(&self) -> bool {
        self.handler.encrypt_metadata()
    }

    pub fn encrypt<'s>(&self, src: &'s [u8]) -> Cow<'s, [u8]> {
        if src.is_empty() {
            return Cow::Borrowed(src);
        }
        Cow::Owned(self.handler.encrypt_content(self.objnum, 0, src))
    }
}
