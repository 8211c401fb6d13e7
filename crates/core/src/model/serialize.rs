//! Writing objects as PDF syntax.
//!
//! Every variant writes itself through an [`Archive`]. When an [`Encryptor`]
//! is supplied, string and stream payloads pass through it; the `Contents` of
//! a signature dictionary is always written as-is.

use super::objects::{Dictionary, PDFObject, PDFStream, PDFString, is_signature_dict};
use crate::error::Result;
use crate::security::encryptor::Encryptor;
use crate::writer::archive::Archive;

impl PDFObject {
    /// Serialize this object, encrypting strings and streams with `encryptor`.
    pub fn write_to<A: Archive + ?Sized>(
        &self,
        archive: &mut A,
        encryptor: Option<&Encryptor<'_>>,
    ) -> Result<()> {
        match self {
            Self::Null => archive.write_string(" null"),
            Self::Bool(b) => archive.write_string(if *b { " true" } else { " false" }),
            Self::Int(n) => archive.write_string(&format!(" {n}")),
            Self::Real(r) => {
                archive.write_byte(b' ')?;
                archive.write_string(&format_real(*r))
            }
            Self::Name(name) => {
                archive.write_byte(b'/')?;
                archive.write_block(&encode_name(name))
            }
            Self::String(s) => write_string(archive, s, encryptor),
            Self::Array(items) => {
                archive.write_byte(b'[')?;
                for item in items {
                    item.write_to(archive, encryptor)?;
                }
                archive.write_byte(b']')
            }
            Self::Dict(dict) => write_dict(archive, dict, encryptor),
            Self::Stream(stream) => write_stream(archive, stream, encryptor),
            Self::Ref(r) => {
                archive.write_byte(b' ')?;
                archive.write_dword(r.objid)?;
                archive.write_string(" 0 R ")
            }
        }
    }
}

pub(crate) fn write_dict<A: Archive + ?Sized>(
    archive: &mut A,
    dict: &Dictionary,
    encryptor: Option<&Encryptor<'_>>,
) -> Result<()> {
    archive.write_string("<<")?;
    let is_signature = is_signature_dict(dict);
    for (key, value) in dict {
        archive.write_byte(b'/')?;
        archive.write_block(&encode_name(key))?;
        let value_encryptor = if is_signature && key == "Contents" {
            None
        } else {
            encryptor
        };
        value.write_to(archive, value_encryptor)?;
    }
    archive.write_string(">>")
}

fn write_string<A: Archive + ?Sized>(
    archive: &mut A,
    s: &PDFString,
    encryptor: Option<&Encryptor<'_>>,
) -> Result<()> {
    let data = match encryptor {
        Some(enc) => enc.encrypt(s.as_bytes()),
        None => s.as_bytes().into(),
    };
    if s.is_hex() {
        archive.write_block(&encode_hex_string(&data))
    } else {
        archive.write_block(&encode_literal_string(&data))
    }
}

fn write_stream<A: Archive + ?Sized>(
    archive: &mut A,
    stream: &PDFStream,
    encryptor: Option<&Encryptor<'_>>,
) -> Result<()> {
    let raw = stream.get_rawdata();
    let data = match encryptor {
        Some(enc) if !(stream.is_metadata() && !enc.encrypts_metadata()) => enc.encrypt(raw),
        _ => raw.into(),
    };

    let mut attrs = stream.attrs.clone();
    attrs.insert("Length".into(), PDFObject::Int(data.len() as i64));
    write_dict(archive, &attrs, encryptor)?;
    archive.write_string("stream\r\n")?;
    archive.write_block(&data)?;
    archive.write_string("\r\nendstream")
}

/// `(...)` form: escapes parentheses, backslash, CR and LF.
pub fn encode_literal_string(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 2);
    out.push(b'(');
    for &b in data {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out.push(b')');
    out
}

/// `<...>` form with upper-case digits.
pub fn encode_hex_string(data: &[u8]) -> Vec<u8> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = Vec::with_capacity(data.len() * 2 + 2);
    out.push(b'<');
    for &b in data {
        out.push(HEX[(b >> 4) as usize]);
        out.push(HEX[(b & 0x0f) as usize]);
    }
    out.push(b'>');
    out
}

/// Name body with `#xx` escapes for delimiters, whitespace, `#` and any byte
/// outside the printable ASCII range.
pub fn encode_name(name: &str) -> Vec<u8> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = Vec::with_capacity(name.len());
    for ch in name.chars() {
        // Names are stored one char per byte; anything wider goes out as UTF-8.
        let mut buf = [0u8; 4];
        let bytes: &[u8] = match u8::try_from(u32::from(ch)) {
            Ok(b) => {
                buf[0] = b;
                &buf[..1]
            }
            Err(_) => ch.encode_utf8(&mut buf).as_bytes(),
        };
        for &b in bytes {
            let needs_escape = !(0x21..=0x7e).contains(&b)
                || matches!(
                    b,
                    b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
                );
            if needs_escape {
                out.push(b'#');
                out.push(HEX[(b >> 4) as usize]);
                out.push(HEX[(b & 0x0f) as usize]);
            } else {
                out.push(b);
            }
        }
    }
    out
}

fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".into();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let s = format!("{value:.6}");
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" || trimmed == "-0" {
        "0".into()
    } else {
        trimmed.to_string()
    }
}
