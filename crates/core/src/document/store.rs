//! In-memory object store layered over an optional source file.

use super::source::{SourceFile, XRefEntry};
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, PDFObject};
use crate::security::{CryptoHandler, EncryptionDescriptor, SecurityHandler};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};

/// A PDF document: objects parsed from the source on demand plus objects
/// added or replaced in memory.
#[derive(Debug, Default)]
pub struct Document {
    source: Option<SourceFile>,
    objects: BTreeMap<u32, PDFObject>,
    modified: BTreeSet<u32>,
    last_obj_num: u32,
    root: Option<u32>,
    info: Option<u32>,
    security_handler: Option<SecurityHandler>,
    encrypt_dict: Option<Dictionary>,
    encrypt_objnum: Option<u32>,
    encoded_password: Vec<u8>,
}

impl Document {
    /// An empty document with no source file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `data` and authenticate `password` when the file is encrypted.
    pub fn load(data: impl Into<Bytes>, password: impl AsRef<[u8]>) -> Result<Self> {
        let source = SourceFile::parse(data)?;
        let password = password.as_ref();

        let mut doc = Self {
            last_obj_num: source.last_obj_num(),
            root: trailer_ref(source.trailer(), "Root"),
            info: trailer_ref(source.trailer(), "Info"),
            ..Self::default()
        };

        if let Some((dict, objnum)) = source.encrypt_dict()? {
            let descriptor = EncryptionDescriptor::from_dict(&dict)?;
            let file_id = source.id_entry(0).unwrap_or_default();
            let handler = SecurityHandler::on_init(&descriptor, file_id, password)?;
            doc.encoded_password = handler.encoded_password(password);
            doc.security_handler = Some(handler);
            doc.encrypt_dict = Some(dict);
            doc.encrypt_objnum = objnum;
        }

        doc.source = Some(source);
        Ok(doc)
    }

    /// Object `objnum`, parsing and decrypting it from the source on first
    /// access.
    pub fn get_or_parse_indirect_object(&mut self, objnum: u32) -> Result<&PDFObject> {
        if !self.objects.contains_key(&objnum) {
            let object = self.parse_from_source(objnum)?;
            self.objects.insert(objnum, object);
        }
        self.objects
            .get(&objnum)
            .ok_or(PdfError::ObjectNotFound(objnum))
    }

    fn parse_from_source(&self, objnum: u32) -> Result<PDFObject> {
        let source = self
            .source
            .as_ref()
            .ok_or(PdfError::ObjectNotFound(objnum))?;
        let crypto = self.crypto_handler();
        let mut object = source.parse_indirect_object(objnum, crypto)?;

        // Object stream members are decrypted with their container; the
        // encryption dictionary and xref streams are never encrypted.
        let is_plain = matches!(source.entry(objnum), Some(XRefEntry::InUse { .. }));
        let is_xref_stream = object
            .dict()
            .is_some_and(|d| matches!(d.get("Type"), Some(PDFObject::Name(t)) if t == "XRef"));
        if let Some(crypto) = crypto
            && is_plain
            && !is_xref_stream
            && self.encrypt_objnum != Some(objnum)
        {
            crypto.decrypt_object_tree(&mut object, objnum, source.generation(objnum));
        }
        Ok(object)
    }

    /// Object `objnum` if it is in memory.
    pub fn get_indirect_object(&self, objnum: u32) -> Option<&PDFObject> {
        self.objects.get(&objnum)
    }

    /// Store `object` under the next free object number.
    pub fn add_indirect_object(&mut self, object: PDFObject) -> u32 {
        self.last_obj_num += 1;
        let objnum = self.last_obj_num;
        self.objects.insert(objnum, object);
        objnum
    }

    /// Replace (or create) object `objnum` and mark it modified.
    pub fn replace_indirect_object(&mut self, objnum: u32, object: PDFObject) {
        self.objects.insert(objnum, object);
        self.modified.insert(objnum);
        self.last_obj_num = self.last_obj_num.max(objnum);
    }

    /// Release object `objnum` from memory. A source object can be parsed
    /// again afterwards.
    pub fn delete_indirect_object(&mut self, objnum: u32) {
        self.objects.remove(&objnum);
    }

    pub fn is_loaded(&self, objnum: u32) -> bool {
        self.objects.contains_key(&objnum)
    }

    pub fn is_modified(&self, objnum: u32) -> bool {
        self.modified.contains(&objnum)
    }

    /// Numbers of the objects held in memory, ascending.
    pub fn loaded_object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.objects.keys().copied()
    }

    /// Numbers of the modified objects, ascending.
    pub fn modified_object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.modified.iter().copied()
    }

    /// Object number of the catalog.
    pub const fn root(&self) -> Option<u32> {
        self.root
    }

    pub fn set_root(&mut self, objnum: u32) {
        self.root = Some(objnum);
    }

    /// Object number of the document information dictionary.
    pub const fn info(&self) -> Option<u32> {
        self.info
    }

    pub fn set_info(&mut self, objnum: u32) {
        self.info = Some(objnum);
    }

    pub const fn last_obj_num(&self) -> u32 {
        self.last_obj_num
    }

    pub const fn security_handler(&self) -> Option<&SecurityHandler> {
        self.security_handler.as_ref()
    }

    pub fn crypto_handler(&self) -> Option<&CryptoHandler> {
        self.security_handler
            .as_ref()
            .map(SecurityHandler::crypto_handler)
    }

    /// Encryption dictionary as stored in the source.
    pub const fn encrypt_dict(&self) -> Option<&Dictionary> {
        self.encrypt_dict.as_ref()
    }

    /// Object number of an indirect encryption dictionary.
    pub const fn encrypt_objnum(&self) -> Option<u32> {
        self.encrypt_objnum
    }

    /// The password that authenticated, in the encoding that matched.
    pub fn encoded_password(&self) -> &[u8] {
        &self.encoded_password
    }

    pub const fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }
}

fn trailer_ref(trailer: &Dictionary, key: &str) -> Option<u32> {
    trailer.get(key).and_then(|v| v.as_ref().ok()).map(|r| r.objid)
}
