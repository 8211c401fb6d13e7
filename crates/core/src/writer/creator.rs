//! Staged writer producing a complete file or an incremental update.
//!
//! A session runs through a fixed sequence of [`Stage`]s. [`Creator::step`]
//! performs one stage, [`Creator::continue_`] runs to the end. An archive
//! failure leaves the session in [`Stage::Invalid`] for good.

use super::CreateFlags;
use super::archive::Archive;
use crate::codec::generate_file_id;
use crate::document::{DEFAULT_FILE_VERSION, Document};
use crate::error::{PdfError, Result};
use crate::model::serialize::encode_name;
use crate::model::{Dictionary, PDFObject};
use crate::security::{
    CryptoHandler, EncryptionDescriptor, EncryptionSettings, Encryptor, SecurityHandler,
};
use std::collections::BTreeMap;

/// Binary marker on the second header line.
const HEADER_MARKER: &[u8; 7] = b"%\xA1\xB3\xC5\xD7\r\n";

/// Trailer keys that are rewritten or describe the old cross-reference data.
const SKIPPED_TRAILER_KEYS: [&str; 13] = [
    "Encrypt", "Size", "Filter", "Index", "Length", "Prev", "W", "XRefStm", "ID", "DecodeParms",
    "Type", "Root", "Info",
];

/// Writer stage. Stages only move forward; `Invalid` and `Complete` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Invalid,
    Init,
    WriteHeader,
    WriteIncremental,
    InitWriteObjs,
    WriteOldObjs,
    InitWriteNewObjs,
    WriteNewObjs,
    WriteEncryptDict,
    InitWriteXRefs,
    WriteXrefsNotIncremental,
    WriteXrefsIncremental,
    WriteTrailerAndFinish,
    Complete,
}

impl Stage {
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Invalid | Self::Complete)
    }
}

#[derive(Debug, Clone)]
enum SecurityChange {
    Remove,
    Set {
        settings: EncryptionSettings,
        user_password: Vec<u8>,
        owner_password: Vec<u8>,
    },
}

/// Serializes a [`Document`] into an [`Archive`].
pub struct Creator<'d, A: Archive> {
    document: &'d mut Document,
    archive: A,
    stage: Stage,
    started: bool,
    incremental: bool,
    is_original: bool,
    security_changed: bool,
    pending_security: Option<SecurityChange>,
    file_version: u8,
    /// Encryption dictionary to reference from the trailer.
    encrypt_dict: Option<Dictionary>,
    /// Source object number of an indirect encryption dictionary.
    encrypt_objnum: Option<u32>,
    /// Object number the inline dictionary was written under.
    written_encrypt_objnum: Option<u32>,
    crypto: Option<CryptoHandler>,
    fixed_id: Option<(Vec<u8>, Vec<u8>)>,
    id_array: Option<(Vec<u8>, Vec<u8>)>,
    last_obj_num: u32,
    object_offsets: BTreeMap<u32, u64>,
    new_objnums: Vec<u32>,
    /// Added to archive offsets when only the update is written.
    base_offset: u64,
    xref_start: u64,
}

impl<'d, A: Archive> Creator<'d, A> {
    pub fn new(document: &'d mut Document, archive: A) -> Self {
        let encrypt_dict = document.encrypt_dict().cloned();
        let encrypt_objnum = document.encrypt_objnum();
        let crypto = document.crypto_handler().cloned();
        Self {
            document,
            archive,
            stage: Stage::Init,
            started: false,
            incremental: false,
            is_original: true,
            security_changed: false,
            pending_security: None,
            file_version: 0,
            encrypt_dict,
            encrypt_objnum,
            written_encrypt_objnum: None,
            crypto,
            fixed_id: None,
            id_array: None,
            last_obj_num: 0,
            object_offsets: BTreeMap::new(),
            new_objnums: Vec::new(),
            base_offset: 0,
            xref_start: 0,
        }
    }

    /// Header version as two digits (`10` to `17`). Returns false and keeps
    /// the current setting for anything else.
    pub fn set_file_version(&mut self, version: u8) -> bool {
        if !(10..=17).contains(&version) {
            return false;
        }
        self.file_version = version;
        true
    }

    /// Use fixed `ID` values instead of reused or generated ones.
    pub fn set_file_identifier(&mut self, first: impl Into<Vec<u8>>, second: impl Into<Vec<u8>>) {
        self.fixed_id = Some((first.into(), second.into()));
    }

    /// Write the document without encryption.
    pub fn remove_security(&mut self) {
        self.pending_security = Some(SecurityChange::Remove);
        self.security_changed = true;
    }

    /// Encrypt the output with a new dictionary built from `settings`.
    ///
    /// An empty owner password defaults to the user password.
    pub fn set_security(
        &mut self,
        settings: EncryptionSettings,
        user_password: impl Into<Vec<u8>>,
        owner_password: impl Into<Vec<u8>>,
    ) {
        self.pending_security = Some(SecurityChange::Set {
            settings,
            user_password: user_password.into(),
            owner_password: owner_password.into(),
        });
        self.security_changed = true;
    }

    pub const fn stage(&self) -> Stage {
        self.stage
    }

    pub const fn is_incremental(&self) -> bool {
        self.incremental
    }

    pub const fn security_changed(&self) -> bool {
        self.security_changed
    }

    /// `ID` array written to the trailer, once the session has started.
    pub fn file_identifier(&self) -> Option<(&[u8], &[u8])> {
        self.id_array
            .as_ref()
            .map(|(a, b)| (a.as_slice(), b.as_slice()))
    }

    /// Offsets recorded for written objects.
    pub const fn object_offsets(&self) -> &BTreeMap<u32, u64> {
        &self.object_offsets
    }

    pub const fn archive(&self) -> &A {
        &self.archive
    }

    pub fn into_archive(self) -> A {
        self.archive
    }

    /// Start a session and run it to the end.
    pub fn create(&mut self, flags: CreateFlags) -> Result<Stage> {
        self.start(flags)?;
        self.continue_()
    }

    /// Start a session without running any stage; drive it with
    /// [`step`](Self::step) or [`continue_`](Self::continue_).
    ///
    /// A creator runs one session. Starting again after it began, finished
    /// or failed is an error, since the archive already holds its output.
    pub fn start(&mut self, flags: CreateFlags) -> Result<()> {
        if self.started || self.stage == Stage::Invalid {
            return Err(PdfError::InvalidState(format!(
                "session already started ({:?})",
                self.stage
            )));
        }
        let has_source = self.document.source().is_some();
        self.incremental = flags.contains(CreateFlags::INCREMENTAL) && has_source;
        self.is_original = !flags.contains(CreateFlags::NO_ORIGINAL);
        self.stage = Stage::Init;
        self.last_obj_num = self.document.last_obj_num();
        self.object_offsets.clear();
        self.new_objnums.clear();
        self.written_encrypt_objnum = None;
        self.base_offset = 0;
        self.xref_start = 0;

        if let Err(err) = self.init_id().and_then(|()| self.apply_security_change()) {
            self.stage = Stage::Invalid;
            return Err(err);
        }
        self.started = true;
        Ok(())
    }

    /// Run stages until the session completes or fails.
    pub fn continue_(&mut self) -> Result<Stage> {
        while !self.stage.is_finished() {
            self.step()?;
        }
        Ok(self.stage)
    }

    /// Run the current stage and move to the next one.
    pub fn step(&mut self) -> Result<Stage> {
        if self.stage.is_finished() {
            return Ok(self.stage);
        }
        if !self.started {
            return Err(PdfError::InvalidState("session not started".into()));
        }

        match self.run_stage() {
            Ok(next) => {
                tracing::debug!(
                    from = ?self.stage,
                    to = ?next,
                    offset = self.archive.current_offset(),
                    "writer stage"
                );
                self.stage = next;
                Ok(next)
            }
            Err(err) => {
                tracing::warn!(stage = ?self.stage, error = %err, "write failed");
                self.stage = Stage::Invalid;
                Err(err)
            }
        }
    }

    fn run_stage(&mut self) -> Result<Stage> {
        match self.stage {
            Stage::Init => {
                if self.security_changed && self.is_original {
                    self.incremental = false;
                }
                Ok(Stage::WriteHeader)
            }
            Stage::WriteHeader => self.write_header(),
            Stage::WriteIncremental => self.write_incremental(),
            Stage::InitWriteObjs => Ok(if self.incremental {
                Stage::InitWriteNewObjs
            } else {
                Stage::WriteOldObjs
            }),
            Stage::WriteOldObjs => {
                self.write_old_objects()?;
                Ok(Stage::InitWriteNewObjs)
            }
            Stage::InitWriteNewObjs => {
                self.init_new_objects();
                Ok(Stage::WriteNewObjs)
            }
            Stage::WriteNewObjs => {
                self.write_new_objects()?;
                Ok(Stage::WriteEncryptDict)
            }
            Stage::WriteEncryptDict => {
                self.write_encrypt_dict()?;
                Ok(Stage::InitWriteXRefs)
            }
            Stage::InitWriteXRefs => self.init_write_xrefs(),
            Stage::WriteXrefsNotIncremental => {
                let entries: Vec<(u32, u64)> = self
                    .object_offsets
                    .range(1..)
                    .filter(|&(&n, _)| n <= self.last_obj_num)
                    .map(|(&n, &off)| (n, off))
                    .collect();
                write_xref_runs(&mut self.archive, &entries)?;
                Ok(Stage::WriteTrailerAndFinish)
            }
            Stage::WriteXrefsIncremental => {
                let entries: Vec<(u32, u64)> = self
                    .new_objnums
                    .iter()
                    .filter_map(|n| self.object_offsets.get(n).map(|&off| (*n, off)))
                    .collect();
                write_xref_runs(&mut self.archive, &entries)?;
                Ok(Stage::WriteTrailerAndFinish)
            }
            Stage::WriteTrailerAndFinish => {
                self.write_trailer()?;
                Ok(Stage::Complete)
            }
            Stage::Invalid | Stage::Complete => Ok(self.stage),
        }
    }

    fn offset(&self) -> u64 {
        self.base_offset + self.archive.current_offset()
    }

    fn write_header(&mut self) -> Result<Stage> {
        if self.incremental {
            return Ok(Stage::WriteIncremental);
        }
        if self.file_version == 0 {
            self.file_version = self
                .document
                .source()
                .map_or(DEFAULT_FILE_VERSION, |s| s.file_version());
        }
        let major = self.file_version / 10;
        let minor = self.file_version % 10;
        self.archive.write_string(&format!("%PDF-{major}.{minor}\r\n"))?;
        self.archive.write_block(HEADER_MARKER)?;
        Ok(Stage::InitWriteObjs)
    }

    /// Copy the source verbatim so the update can be appended to it.
    fn write_incremental(&mut self) -> Result<Stage> {
        let Some(source) = self.document.source() else {
            return Err(PdfError::InvalidState("incremental write without a source".into()));
        };
        if self.is_original {
            let size = usize::try_from(source.document_size()).unwrap_or(usize::MAX);
            let prefix = &source.data()[..size.min(source.data().len())];
            self.archive.write_block(prefix)?;
        } else {
            self.base_offset = source.document_size();
        }

        // A rebuilt source has no table to chain to, so the new one lists
        // every object.
        if source.last_xref_offset() == 0 {
            for objnum in source.object_numbers() {
                if let Some(pos) = source.object_position(objnum) {
                    self.object_offsets.insert(objnum, pos);
                }
            }
        }
        Ok(Stage::InitWriteObjs)
    }

    fn write_old_objects(&mut self) -> Result<()> {
        let Some(last) = self.document.source().map(|s| s.last_obj_num()) else {
            return Ok(());
        };
        let replaced_encrypt_dict = if self.security_changed {
            self.document.encrypt_objnum()
        } else {
            None
        };

        for objnum in 1..=last {
            let skip = self
                .document
                .source()
                .is_none_or(|s| s.is_object_free(objnum) || s.is_structural(objnum));
            if skip || replaced_encrypt_dict == Some(objnum) {
                continue;
            }

            let was_loaded = self.document.is_loaded(objnum);
            let offset = self.offset();
            let object = match self.document.get_or_parse_indirect_object(objnum) {
                Ok(object) => object,
                Err(err) => {
                    tracing::warn!(objnum, error = %err, "dropping unreadable object");
                    continue;
                }
            };
            let crypto = if self.encrypt_objnum == Some(objnum) {
                None
            } else {
                self.crypto.as_ref()
            };
            write_indirect_object(&mut self.archive, objnum, object, crypto)?;
            self.object_offsets.insert(objnum, offset);

            if !was_loaded {
                self.document.delete_indirect_object(objnum);
            }
        }
        Ok(())
    }

    /// Objects the source does not have, plus modified source objects when
    /// only an update is written.
    fn init_new_objects(&mut self) {
        let source = self.document.source();
        let mut new_objnums: Vec<u32> = self
            .document
            .loaded_object_numbers()
            .filter(|&n| match source {
                None => true,
                Some(s) => {
                    s.is_object_free(n) || (self.incremental && self.document.is_modified(n))
                }
            })
            .collect();
        new_objnums.sort_unstable();
        self.new_objnums = new_objnums;
    }

    fn write_new_objects(&mut self) -> Result<()> {
        for &objnum in &self.new_objnums {
            let Some(object) = self.document.get_indirect_object(objnum) else {
                continue;
            };
            let offset = self.base_offset + self.archive.current_offset();
            let crypto = if self.encrypt_objnum == Some(objnum) {
                None
            } else {
                self.crypto.as_ref()
            };
            write_indirect_object(&mut self.archive, objnum, object, crypto)?;
            self.object_offsets.insert(objnum, offset);
        }
        Ok(())
    }

    fn write_encrypt_dict(&mut self) -> Result<()> {
        let Some(dict) = self.encrypt_dict.as_ref() else {
            return Ok(());
        };
        if self.encrypt_objnum.is_some() {
            return Ok(());
        }
        self.last_obj_num += 1;
        let objnum = self.last_obj_num;
        let offset = self.offset();
        write_indirect_object(&mut self.archive, objnum, &PDFObject::Dict(dict.clone()), None)?;
        self.object_offsets.insert(objnum, offset);
        self.written_encrypt_objnum = Some(objnum);
        if self.incremental {
            self.new_objnums.push(objnum);
        }
        Ok(())
    }

    fn init_write_xrefs(&mut self) -> Result<Stage> {
        self.xref_start = self.offset();
        let (xref_stream, prev) = self.source_xref_state();

        if self.incremental && xref_stream {
            return Ok(Stage::WriteTrailerAndFinish);
        }
        if !self.incremental || prev == 0 {
            if self.object_offsets.contains_key(&1) {
                self.archive.write_string("xref\r\n")?;
            } else {
                self.archive
                    .write_string("xref\r\n0 1\r\n0000000000 65535 f\r\n")?;
            }
            Ok(Stage::WriteXrefsNotIncremental)
        } else {
            self.archive.write_string("xref\r\n")?;
            Ok(Stage::WriteXrefsIncremental)
        }
    }

    /// Whether the source ends in an xref stream, and its `startxref` offset.
    fn source_xref_state(&self) -> (bool, u64) {
        self.document
            .source()
            .map_or((false, 0), |s| (s.is_xref_stream(), s.last_xref_offset()))
    }

    fn write_trailer(&mut self) -> Result<()> {
        let (source_xref_stream, prev) = self.source_xref_state();
        let xref_stream = self.incremental && source_xref_stream;
        let stream_objnum = self.last_obj_num + 1;

        if xref_stream {
            self.archive.write_dword(stream_objnum)?;
            self.archive.write_string(" 0 obj <<")?;
        } else {
            self.archive.write_string("trailer\r\n<<")?;
        }

        if let Some(source) = self.document.source() {
            for (key, value) in source.trailer() {
                if SKIPPED_TRAILER_KEYS.contains(&key.as_str()) {
                    continue;
                }
                self.archive.write_byte(b'/')?;
                self.archive.write_block(&encode_name(key))?;
                value.write_to(&mut self.archive, None)?;
            }
        }
        if let Some(root) = self.document.root() {
            self.archive.write_string("/Root")?;
            PDFObject::reference(root).write_to(&mut self.archive, None)?;
        }
        if let Some(info) = self.document.info() {
            self.archive.write_string("/Info")?;
            PDFObject::reference(info).write_to(&mut self.archive, None)?;
        }

        if self.encrypt_dict.is_some() {
            let objnum = self.encrypt_objnum.or(self.written_encrypt_objnum);
            if let Some(objnum) = objnum {
                self.archive.write_string("/Encrypt")?;
                PDFObject::reference(objnum).write_to(&mut self.archive, None)?;
            }
        }

        let size = self.last_obj_num + if xref_stream { 2 } else { 1 };
        self.archive.write_string("/Size ")?;
        self.archive.write_dword(size)?;

        if self.incremental && prev != 0 {
            self.archive.write_string("/Prev ")?;
            self.archive.write_string(&prev.to_string())?;
        }

        if let Some((first, second)) = &self.id_array {
            self.archive.write_string("/ID")?;
            PDFObject::Array(vec![
                PDFObject::hex_string(first.clone()),
                PDFObject::hex_string(second.clone()),
            ])
            .write_to(&mut self.archive, None)?;
        }

        if xref_stream {
            self.write_xref_stream_body(stream_objnum, prev)?;
        } else {
            self.archive.write_string(">>")?;
        }

        self.archive.write_string("\r\nstartxref\r\n")?;
        self.archive.write_string(&self.xref_start.to_string())?;
        self.archive.write_string("\r\n%%EOF\r\n")
    }

    /// `W`/`Index`/`Length` plus the records of an xref stream update.
    fn write_xref_stream_body(&mut self, stream_objnum: u32, prev: u64) -> Result<()> {
        let mut entries: Vec<(u32, u64)> = if prev == 0 {
            self.object_offsets
                .range(..=self.last_obj_num)
                .map(|(&n, &off)| (n, off))
                .collect()
        } else {
            self.new_objnums
                .iter()
                .filter_map(|n| self.object_offsets.get(n).map(|&off| (*n, off)))
                .collect()
        };
        entries.push((stream_objnum, self.xref_start));

        self.archive.write_string("/W[0 4 1]/Index[")?;
        for (objnum, _) in &entries {
            self.archive.write_string(&format!(" {objnum} 1"))?;
        }
        self.archive.write_string("]/Length ")?;
        self.archive.write_dword((entries.len() * 5) as u32)?;
        self.archive.write_string(">>stream\r\n")?;

        let mut records = Vec::with_capacity(entries.len() * 5);
        for (_, offset) in &entries {
            records.extend_from_slice(&(*offset as u32).to_be_bytes());
            records.push(0);
        }
        self.archive.write_block(&records)?;
        self.archive.write_string("\r\nendstream\r\nendobj")
    }

    /// Choose the `ID` pair; re-key an old-style dictionary that was bound to
    /// a missing identifier.
    fn init_id(&mut self) -> Result<()> {
        let seed1 = std::ptr::from_ref(self).addr() as u32;
        let seed2 = self.last_obj_num;
        let source = self.document.source();
        let old_first = source.and_then(|s| s.id_entry(0)).filter(|id| !id.is_empty());
        let old_second = source.and_then(|s| s.id_entry(1)).filter(|id| !id.is_empty());
        let had_id = source.is_some_and(|s| s.id_array().is_some());

        let first = old_first
            .map(<[u8]>::to_vec)
            .unwrap_or_else(|| generate_file_id(seed1, seed2).to_vec());
        let second = if had_id {
            match old_second {
                Some(id) if self.incremental && self.encrypt_dict.is_some() => id.to_vec(),
                _ => generate_file_id(seed1, seed2).to_vec(),
            }
        } else {
            first.clone()
        };
        self.id_array = Some(self.fixed_id.clone().unwrap_or((first, second)));

        if !had_id {
            self.rekey_without_source_id()?;
        }
        Ok(())
    }

    /// Revision 2/3 keys depend on the identifier, so a file that had none
    /// gets its dictionary recomputed for the one being written.
    fn rekey_without_source_id(&mut self) -> Result<()> {
        let Some(dict) = self.encrypt_dict.as_ref() else {
            return Ok(());
        };
        let descriptor = EncryptionDescriptor::from_dict(dict)?;
        if !descriptor.is_standard() || !matches!(descriptor.revision, 2 | 3) {
            return Ok(());
        }
        let Some((file_id, _)) = self.id_array.as_ref() else {
            return Ok(());
        };

        let mut password = self.document.encoded_password().to_vec();
        if let Some(handler) = self.document.security_handler()
            && handler.is_owner_unlocked()
        {
            password = handler.get_user_password(&descriptor, &password);
        }

        let mut new_dict = dict.clone();
        let handler = SecurityHandler::on_create_user_only(&mut new_dict, file_id, &password)?;
        tracing::debug!(
            revision = descriptor.revision,
            "re-keyed encryption for new file identifier"
        );
        self.crypto = Some(handler.crypto_handler().clone());
        self.encrypt_dict = Some(new_dict);
        self.encrypt_objnum = None;
        self.security_changed = true;
        Ok(())
    }

    fn apply_security_change(&mut self) -> Result<()> {
        match self.pending_security.clone() {
            None => {}
            Some(SecurityChange::Remove) => {
                self.encrypt_dict = None;
                self.encrypt_objnum = None;
                self.crypto = None;
            }
            Some(SecurityChange::Set {
                settings,
                user_password,
                owner_password,
            }) => {
                let Some((file_id, _)) = self.id_array.as_ref() else {
                    return Err(PdfError::InvalidState("file identifier not initialized".into()));
                };
                let mut dict = settings.to_dict();
                let handler = SecurityHandler::on_create(
                    &mut dict,
                    file_id,
                    &user_password,
                    &owner_password,
                )?;
                self.crypto = Some(handler.crypto_handler().clone());
                self.encrypt_dict = Some(dict);
                self.encrypt_objnum = None;
            }
        }
        Ok(())
    }
}

/// `N 0 obj\r\n` body `\r\nendobj\r\n`.
fn write_indirect_object<A: Archive + ?Sized>(
    archive: &mut A,
    objnum: u32,
    object: &PDFObject,
    crypto: Option<&CryptoHandler>,
) -> Result<()> {
    let encryptor = crypto.map(|c| Encryptor::new(c, objnum));
    archive.write_dword(objnum)?;
    archive.write_string(" 0 obj\r\n")?;
    object.write_to(archive, encryptor.as_ref())?;
    archive.write_string("\r\nendobj\r\n")
}

/// Subsections of consecutive object numbers. A run starting at 1 also
/// carries the head of the free list.
fn write_xref_runs<A: Archive + ?Sized>(archive: &mut A, entries: &[(u32, u64)]) -> Result<()> {
    let mut i = 0;
    while i < entries.len() {
        let first = entries[i].0;
        let mut j = i + 1;
        while j < entries.len() && entries[j].0 == entries[j - 1].0 + 1 {
            j += 1;
        }
        let count = (j - i) as u32;
        if first == 1 {
            archive.write_string(&format!("0 {}\r\n0000000000 65535 f\r\n", count + 1))?;
        } else {
            archive.write_string(&format!("{first} {count}\r\n"))?;
        }
        for (_, offset) in &entries[i..j] {
            archive.write_string(&format!("{offset:010} 00000 n\r\n"))?;
        }
        i = j;
    }
    Ok(())
}
