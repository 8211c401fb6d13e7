//! Read-only view of an existing PDF file: header, cross-reference data and
//! trailer, plus on-demand parsing of the objects it contains.

use crate::codec::decode_stream_data;
use crate::error::{PdfError, Result};
use crate::model::{Dictionary, PDFObjRef, PDFObject};
use crate::parser::{Keyword, Lexer, ObjectParser, Token};
use crate::security::CryptoHandler;
use bytes::Bytes;
use regex::bytes::Regex;
use std::collections::{BTreeMap, HashSet};

/// Version used when the header cannot be read.
pub const DEFAULT_FILE_VERSION: u8 = 17;

/// Trailer keys that describe one cross-reference section only.
const SECTION_KEYS: [&str; 8] = [
    "Prev", "XRefStm", "Length", "Filter", "DecodeParms", "W", "Index", "Type",
];

/// Where an object lives in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    Free,
    /// Byte offset of `N G obj`.
    InUse { offset: usize, genno: u32 },
    /// Member `index` of object stream `stream_objnum`.
    Compressed { stream_objnum: u32, index: usize },
}

/// A parsed source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    data: Bytes,
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dictionary,
    last_xref_offset: u64,
    xref_stream: bool,
    /// Xref streams and object stream containers.
    structural: HashSet<u32>,
    file_version: u8,
}

impl SourceFile {
    /// Parse the header, cross-reference chain and trailer of `data`.
    ///
    /// A file whose `startxref` chain is unreadable is indexed by scanning
    /// for object headers; [`last_xref_offset`](Self::last_xref_offset) is
    /// then 0.
    pub fn parse(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let mut source = Self {
            file_version: read_file_version(&data),
            data,
            entries: BTreeMap::new(),
            trailer: Dictionary::new(),
            last_xref_offset: 0,
            xref_stream: false,
            structural: HashSet::new(),
        };

        let loaded = find_startxref(&source.data).and_then(|pos| {
            source.load_xrefs(pos)?;
            Ok(pos)
        });
        match loaded {
            Ok(pos) if !source.trailer.is_empty() => {
                source.last_xref_offset = pos as u64;
            }
            other => {
                if let Err(err) = other {
                    tracing::warn!(
                        error = %err,
                        "cross-reference data unreadable, scanning objects"
                    );
                }
                source.entries.clear();
                source.trailer.clear();
                source.structural.clear();
                source.xref_stream = false;
                source.load_xref_fallback()?;
            }
        }

        for entry in source.entries.values() {
            if let XRefEntry::Compressed { stream_objnum, .. } = entry {
                source.structural.insert(*stream_objnum);
            }
        }

        tracing::debug!(
            objects = source.entries.len(),
            last_xref = source.last_xref_offset,
            xref_stream = source.xref_stream,
            "source file indexed"
        );
        Ok(source)
    }

    /// Size of the file in bytes.
    pub fn document_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Offset named by `startxref`, or 0 when the file was rebuilt by scanning.
    pub const fn last_xref_offset(&self) -> u64 {
        self.last_xref_offset
    }

    /// Whether the newest cross-reference section is an xref stream.
    pub const fn is_xref_stream(&self) -> bool {
        self.xref_stream
    }

    /// Highest object number with a cross-reference entry.
    pub fn last_obj_num(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    pub fn is_object_free(&self, objnum: u32) -> bool {
        matches!(self.entries.get(&objnum), None | Some(XRefEntry::Free))
    }

    /// Xref streams and object stream containers, which a full rewrite drops.
    pub fn is_structural(&self, objnum: u32) -> bool {
        self.structural.contains(&objnum)
    }

    pub fn entry(&self, objnum: u32) -> Option<XRefEntry> {
        self.entries.get(&objnum).copied()
    }

    /// Byte offset of an uncompressed object.
    pub fn object_position(&self, objnum: u32) -> Option<u64> {
        match self.entries.get(&objnum) {
            Some(XRefEntry::InUse { offset, .. }) => Some(*offset as u64),
            _ => None,
        }
    }

    pub fn generation(&self, objnum: u32) -> u32 {
        match self.entries.get(&objnum) {
            Some(XRefEntry::InUse { genno, .. }) => *genno,
            _ => 0,
        }
    }

    /// Object numbers in use, ascending.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| !matches!(e, XRefEntry::Free))
            .map(|(n, _)| *n)
    }

    /// Merged trailer: newer sections override older ones.
    pub const fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// The `ID` array of the trailer.
    pub fn id_array(&self) -> Option<&[PDFObject]> {
        self.trailer
            .get("ID")
            .and_then(|id| id.as_array().ok())
            .map(Vec::as_slice)
    }

    /// Element `index` of the `ID` array as bytes.
    pub fn id_entry(&self, index: usize) -> Option<&[u8]> {
        self.id_array()?
            .get(index)
            .and_then(|v| v.as_string().ok())
    }

    /// The `Encrypt` dictionary and, when indirect, its object number.
    ///
    /// The dictionary is returned as stored; its strings are never encrypted.
    pub fn encrypt_dict(&self) -> Result<Option<(Dictionary, Option<u32>)>> {
        match self.trailer.get("Encrypt") {
            None | Some(PDFObject::Null) => Ok(None),
            Some(PDFObject::Dict(dict)) => Ok(Some((dict.clone(), None))),
            Some(PDFObject::Ref(r)) => {
                let obj = self.parse_indirect_object(r.objid, None)?;
                Ok(Some((obj.as_dict()?.clone(), Some(r.objid))))
            }
            Some(other) => Err(PdfError::EncryptionError(format!(
                "/Encrypt must be a dictionary, got {}",
                other.type_name()
            ))),
        }
    }

    /// Two-digit version from the header, e.g. 17 for `%PDF-1.7`.
    pub const fn file_version(&self) -> u8 {
        self.file_version
    }

    /// Parse object `objnum` without decrypting it.
    ///
    /// Members of object streams are read from the decoded container;
    /// `crypto` decrypts the container data when the file is encrypted.
    pub fn parse_indirect_object(
        &self,
        objnum: u32,
        crypto: Option<&CryptoHandler>,
    ) -> Result<PDFObject> {
        match self.entries.get(&objnum) {
            Some(XRefEntry::InUse { offset, .. }) => {
                let ind = self.parse_object_at(*offset)?;
                if ind.objid != objnum {
                    tracing::warn!(
                        expected = objnum,
                        found = ind.objid,
                        offset,
                        "object number mismatch at xref offset"
                    );
                }
                Ok(ind.object)
            }
            Some(XRefEntry::Compressed {
                stream_objnum,
                index,
            }) => self.parse_object_from_stream(objnum, *stream_objnum, *index, crypto),
            None | Some(XRefEntry::Free) => Err(PdfError::ObjectNotFound(objnum)),
        }
    }

    fn parse_object_at(&self, offset: usize) -> Result<crate::model::IndirectObject> {
        if offset >= self.data.len() {
            return Err(PdfError::SyntaxError(format!(
                "object offset {offset} exceeds file size {}",
                self.data.len()
            )));
        }
        let mut parser = ObjectParser::at(&self.data, offset);
        parser.parse_indirect_object(|r| self.resolve_length(r))
    }

    /// Value of an indirect stream `Length`.
    fn resolve_length(&self, r: PDFObjRef) -> Option<i64> {
        let XRefEntry::InUse { offset, .. } = self.entries.get(&r.objid)? else {
            return None;
        };
        let mut parser = ObjectParser::at(&self.data, *offset);
        parser.parse_indirect_header().ok()?;
        parser.parse_object().ok()?.as_int().ok()
    }

    fn parse_object_from_stream(
        &self,
        objnum: u32,
        stream_objnum: u32,
        index: usize,
        crypto: Option<&CryptoHandler>,
    ) -> Result<PDFObject> {
        let XRefEntry::InUse { offset, genno } = self
            .entries
            .get(&stream_objnum)
            .copied()
            .ok_or(PdfError::ObjectNotFound(stream_objnum))?
        else {
            return Err(PdfError::SyntaxError(format!(
                "object stream {stream_objnum} is not a plain object"
            )));
        };
        let container = self.parse_object_at(offset)?.object;
        let stream = container.as_stream()?;

        let raw = match crypto {
            Some(handler) => handler.decrypt(stream_objnum, genno, stream.get_rawdata()),
            None => stream.get_rawdata().to_vec(),
        };
        let data = decode_stream_data(&stream.attrs, &raw)?;

        let get_usize = |key: &str| {
            stream
                .get(key)
                .and_then(|v| v.as_int().ok())
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    PdfError::SyntaxError(format!("missing {key} in object stream {stream_objnum}"))
                })
        };
        let n = get_usize("N")?;
        let first = get_usize("First")?;
        if first > data.len() {
            return Err(PdfError::SyntaxError(format!(
                "First {first} beyond object stream {stream_objnum}"
            )));
        }

        let mut header = ObjectParser::new(&data[..first]);
        let mut pairs = Vec::with_capacity(n);
        for _ in 0..n {
            let (Ok(PDFObject::Int(num)), Ok(PDFObject::Int(off))) =
                (header.parse_object(), header.parse_object())
            else {
                break;
            };
            pairs.push((num, off));
        }

        // Prefer the slot the xref names; fall back to a search by number.
        let slot = pairs
            .get(index)
            .filter(|(num, _)| *num == i64::from(objnum))
            .or_else(|| pairs.iter().find(|(num, _)| *num == i64::from(objnum)))
            .ok_or(PdfError::ObjectNotFound(objnum))?;
        let start = usize::try_from(slot.1)
            .ok()
            .and_then(|off| first.checked_add(off))
            .filter(|&pos| pos <= data.len())
            .ok_or_else(|| PdfError::SyntaxError(format!("bad offset for object {objnum}")))?;

        ObjectParser::at(&data, start).parse_object()
    }

    /// Follow `Prev`/`XRefStm` from `pos`, newest section first.
    fn load_xrefs(&mut self, mut pos: usize) -> Result<()> {
        let mut visited = HashSet::new();
        let mut first = true;

        while visited.insert(pos) {
            let section = self.load_xref_at(pos)?;
            if first {
                self.xref_stream = section.is_stream;
                first = false;
            }

            // Hybrid files: the xref stream supplements the table it rides with.
            if let Some(stm_pos) = int_key(&section.trailer, "XRefStm")
                && visited.insert(stm_pos)
            {
                match self.load_xref_stream(stm_pos) {
                    Ok(stm) => self.merge_section(stm),
                    Err(err) => tracing::warn!(offset = stm_pos, error = %err, "skipping XRefStm"),
                }
            }

            let prev = int_key(&section.trailer, "Prev");
            self.merge_section(section);
            match prev {
                Some(prev) => pos = prev,
                None => break,
            }
        }
        Ok(())
    }

    /// Entries and trailer keys already present come from a newer section.
    fn merge_section(&mut self, section: XRefSection) {
        for (objnum, entry) in section.entries {
            self.entries.entry(objnum).or_insert(entry);
        }
        for (key, value) in section.trailer {
            if SECTION_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.trailer.entry(key).or_insert(value);
        }
        if let Some(objnum) = section.stream_objnum {
            self.structural.insert(objnum);
        }
    }

    fn load_xref_at(&self, pos: usize) -> Result<XRefSection> {
        let data = self.data.get(pos..).ok_or(PdfError::NoValidXRef)?;
        if data.starts_with(b"xref") {
            self.load_traditional_xref(pos)
        } else {
            self.load_xref_stream(pos)
        }
    }

    fn load_traditional_xref(&self, pos: usize) -> Result<XRefSection> {
        let mut section = XRefSection::default();
        let mut lexer = Lexer::at(&self.data, pos);
        match lexer.next_token() {
            Some(Ok((_, Token::Keyword(Keyword::Xref)))) => {}
            _ => return Err(PdfError::SyntaxError(format!("expected xref at {pos}"))),
        }

        loop {
            let start = match lexer.next_token() {
                Some(Ok((_, Token::Int(n)))) => n,
                Some(Ok((_, Token::Keyword(Keyword::Trailer)))) => break,
                Some(Ok((at, _))) => {
                    return Err(PdfError::SyntaxError(format!(
                        "unexpected token in xref section at {at}"
                    )));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(PdfError::UnexpectedEof),
            };
            let Some(Ok((_, Token::Int(count)))) = lexer.next_token() else {
                return Err(PdfError::SyntaxError("expected xref subsection count".into()));
            };

            let mut base = start;
            for i in 0..count {
                let (offset, genno, marker) = read_xref_line(&mut lexer)?;

                // Some writers start a subsection at 1 yet still include the
                // free head of the list.
                if i == 0 && base > 0 && marker == b'f' && offset == 0 && genno == 65535 {
                    base -= 1;
                }
                let Ok(objnum) = u32::try_from(base + i) else {
                    continue;
                };

                let entry = if marker == b'n' && offset > 0 {
                    XRefEntry::InUse {
                        offset: offset as usize,
                        genno: genno.clamp(0, 65535) as u32,
                    }
                } else {
                    XRefEntry::Free
                };
                section.entries.entry(objnum).or_insert(entry);
            }
        }

        let mut parser = ObjectParser::at(&self.data, lexer.tell());
        section.trailer = parser.parse_object()?.as_dict()?.clone();
        Ok(section)
    }

    fn load_xref_stream(&self, pos: usize) -> Result<XRefSection> {
        let ind = self.parse_object_at(pos)?;
        let stream = ind.object.as_stream()?;

        let widths = stream
            .get("W")
            .ok_or_else(|| PdfError::SyntaxError("missing W in xref stream".into()))?
            .as_array()?
            .iter()
            .map(|w| w.as_int().map(|n| n.clamp(0, 8) as usize))
            .collect::<Result<Vec<_>>>()?;
        let [w0, w1, w2] = widths[..] else {
            return Err(PdfError::SyntaxError("W must have 3 elements".into()));
        };
        let entry_size = w0 + w1 + w2;
        if entry_size == 0 {
            return Err(PdfError::SyntaxError("empty xref stream entries".into()));
        }

        let size = int_key(&stream.attrs, "Size").unwrap_or(0);
        let index = match stream.get("Index") {
            Some(idx) => idx
                .as_array()?
                .chunks_exact(2)
                .map(|pair| Ok((pair[0].as_int()?, pair[1].as_int()?)))
                .collect::<Result<Vec<_>>>()?,
            None => vec![(0, size as i64)],
        };

        let data = decode_stream_data(&stream.attrs, stream.get_rawdata())?;
        let mut section = XRefSection {
            is_stream: true,
            stream_objnum: Some(ind.objid),
            trailer: stream.attrs.clone(),
            ..XRefSection::default()
        };

        let mut records = data.chunks_exact(entry_size);
        'subsections: for (start, count) in index {
            for i in 0..count.max(0) {
                let Some(record) = records.next() else {
                    break 'subsections;
                };
                let Ok(objnum) = u32::try_from(start + i) else {
                    continue;
                };
                let (kind, rest) = record.split_at(w0);
                let (field1, field2) = rest.split_at(w1);
                // A zero-width type field means type 1.
                let kind = if w0 == 0 { 1 } else { read_be(kind) };
                let (field1, field2) = (read_be(field1), read_be(field2));

                let entry = match kind {
                    0 => XRefEntry::Free,
                    1 => XRefEntry::InUse {
                        offset: field1 as usize,
                        genno: field2.min(65535) as u32,
                    },
                    2 => XRefEntry::Compressed {
                        stream_objnum: field1 as u32,
                        index: field2 as usize,
                    },
                    _ => continue,
                };
                section.entries.entry(objnum).or_insert(entry);
            }
        }
        Ok(section)
    }

    /// Index the file by its `N G obj` headers and the last `trailer`.
    fn load_xref_fallback(&mut self) -> Result<()> {
        let re = Regex::new(r"(\d+)\s+(\d+)\s+obj\b")
            .map_err(|e| PdfError::SyntaxError(e.to_string()))?;
        let parse_num = |bytes: &[u8]| {
            std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
        };

        for cap in re.captures_iter(&self.data) {
            let (Some(whole), Some(objnum), Some(genno)) = (
                cap.get(0),
                parse_num(&cap[1]),
                parse_num(&cap[2]),
            ) else {
                continue;
            };
            // Later definitions of the same number win, as in an update.
            self.entries.insert(
                objnum,
                XRefEntry::InUse {
                    offset: whole.start(),
                    genno,
                },
            );
        }
        if self.entries.is_empty() {
            return Err(PdfError::NoValidXRef);
        }

        let structural: Vec<u32> = self
            .entries
            .iter()
            .filter_map(|(&objnum, entry)| match entry {
                XRefEntry::InUse { offset, .. } => Some((objnum, *offset)),
                _ => None,
            })
            .filter(|&(_, offset)| self.is_structural_at(offset))
            .map(|(objnum, _)| objnum)
            .collect();
        self.structural.extend(structural);

        if let Some(pos) = rfind(&self.data, b"trailer") {
            let mut parser = ObjectParser::at(&self.data, pos + b"trailer".len());
            if let Ok(PDFObject::Dict(dict)) = parser.parse_object() {
                self.trailer = dict;
            }
        }
        if self.trailer.is_empty() {
            tracing::warn!("no trailer found while rebuilding cross-reference data");
        }
        self.trailer.retain(|key, _| !SECTION_KEYS.contains(&key.as_str()));
        Ok(())
    }

    fn is_structural_at(&self, offset: usize) -> bool {
        let mut parser = ObjectParser::at(&self.data, offset);
        if parser.parse_indirect_header().is_err() {
            return false;
        }
        matches!(
            parser.parse_object(),
            Ok(PDFObject::Dict(d)) if matches!(
                d.get("Type"),
                Some(PDFObject::Name(t)) if t == "XRef" || t == "ObjStm"
            )
        )
    }
}

/// One cross-reference table or stream with its trailer.
#[derive(Debug, Default)]
struct XRefSection {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dictionary,
    is_stream: bool,
    stream_objnum: Option<u32>,
}

fn read_xref_line(lexer: &mut Lexer<'_>) -> Result<(i64, i64, u8)> {
    let mut next_int = || match lexer.next_token() {
        Some(Ok((_, Token::Int(n)))) => Ok(n),
        Some(Err(e)) => Err(e),
        None => Err(PdfError::UnexpectedEof),
        Some(Ok((at, _))) => Err(PdfError::SyntaxError(format!(
            "malformed xref entry at {at}"
        ))),
    };
    let offset = next_int()?;
    let genno = next_int()?;
    match lexer.next_token() {
        Some(Ok((_, Token::Keyword(Keyword::Other(m))))) if m == b"n" || m == b"f" => {
            Ok((offset, genno, m[0]))
        }
        _ => Err(PdfError::SyntaxError("xref entry must end in n or f".into())),
    }
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

fn int_key(dict: &Dictionary, key: &str) -> Option<usize> {
    dict.get(key)
        .and_then(|v| v.as_int().ok())
        .and_then(|n| usize::try_from(n).ok())
}

fn rfind(hay: &[u8], needle: &[u8]) -> Option<usize> {
    hay.windows(needle.len()).rposition(|w| w == needle)
}

/// Offset named by the last `startxref` within the final KiB.
fn find_startxref(data: &[u8]) -> Result<usize> {
    let tail_start = data.len().saturating_sub(1024);
    let at = rfind(&data[tail_start..], b"startxref").ok_or(PdfError::NoValidXRef)?;
    let mut lexer = Lexer::at(data, tail_start + at + b"startxref".len());
    match lexer.next_token() {
        Some(Ok((_, Token::Int(n)))) if n >= 0 && (n as usize) < data.len() => Ok(n as usize),
        _ => Err(PdfError::NoValidXRef),
    }
}

/// `%PDF-1.x` within the first KiB, as `1x`.
fn read_file_version(data: &[u8]) -> u8 {
    let head = &data[..data.len().min(1024)];
    head.windows(7)
        .position(|w| w.starts_with(b"%PDF-"))
        .and_then(|at| {
            let major = head[at + 5];
            let minor = *head.get(at + 7)?;
            (major.is_ascii_digit() && head[at + 6] == b'.' && minor.is_ascii_digit())
                .then(|| (major - b'0') * 10 + (minor - b'0'))
        })
        .unwrap_or(DEFAULT_FILE_VERSION)
}
