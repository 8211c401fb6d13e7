//! PDF object types.

use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;

/// Dictionary with stable key order, so re-saved files are deterministic.
pub type Dictionary = IndexMap<String, PDFObject>;

/// PDF Object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Name object (e.g., /Type, /Font)
    Name(String),
    /// String (byte array plus its written form)
    String(PDFString),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dict(Dictionary),
    /// Stream (dictionary + binary data)
    Stream(Box<PDFStream>),
    /// Indirect object reference
    Ref(PDFObjRef),
}

impl PDFObject {
    /// Literal string object.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::String(PDFString::literal(bytes))
    }

    /// Hex string object.
    pub fn hex_string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::String(PDFString::hex(bytes))
    }

    /// Name object.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Reference to generation 0 of `objid`.
    pub const fn reference(objid: u32) -> Self {
        Self::Ref(PDFObjRef::new(objid, 0))
    }

    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as boolean
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(PdfError::TypeError {
                expected: "bool",
                got: self.type_name(),
            }),
        }
    }

    /// Get as integer
    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    /// Get numeric value (int or real coerced to f64)
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "number",
                got: self.type_name(),
            }),
        }
    }

    /// Get as name string
    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "name",
                got: self.type_name(),
            }),
        }
    }

    /// Get as byte string
    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) => Ok(s.as_bytes()),
            _ => Err(PdfError::TypeError {
                expected: "string",
                got: self.type_name(),
            }),
        }
    }

    /// Get as array
    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(PdfError::TypeError {
                expected: "array",
                got: self.type_name(),
            }),
        }
    }

    /// Get as dictionary
    pub const fn as_dict(&self) -> Result<&Dictionary> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    /// Get as mutable dictionary
    pub fn as_dict_mut(&mut self) -> Result<&mut Dictionary> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Result<&PDFStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "stream",
                got: self.type_name(),
            }),
        }
    }

    /// Get as object reference
    pub const fn as_ref(&self) -> Result<&PDFObjRef> {
        match self {
            Self::Ref(r) => Ok(r),
            _ => Err(PdfError::TypeError {
                expected: "ref",
                got: self.type_name(),
            }),
        }
    }

    /// Dictionary of a plain dictionary or of a stream.
    pub fn dict(&self) -> Option<&Dictionary> {
        match self {
            Self::Dict(d) => Some(d),
            Self::Stream(s) => Some(&s.attrs),
            _ => None,
        }
    }

    /// Name or string contents, compared the same way by the format when
    /// testing `Type`/`FT` values.
    pub fn text_value(&self) -> Option<&[u8]> {
        match self {
            Self::Name(n) => Some(n.as_bytes()),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Get type name for error messages
    pub(crate) const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }
}

/// String bytes plus whether the string is written in `<hex>` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PDFString {
    bytes: Vec<u8>,
    hex: bool,
}

impl PDFString {
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: false,
        }
    }

    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: true,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub const fn is_hex(&self) -> bool {
        self.hex
    }

    /// Replace the contents, keeping the written form.
    pub fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.bytes = bytes;
    }
}

/// PDF indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PDFObjRef {
    /// Object ID
    pub objid: u32,
    /// Generation number
    pub genno: u32,
}

impl PDFObjRef {
    /// Create a new object reference.
    pub const fn new(objid: u32, genno: u32) -> Self {
        Self { objid, genno }
    }
}

/// PDF Stream - dictionary attributes + raw (still filtered) data.
#[derive(Debug, Clone, PartialEq)]
pub struct PDFStream {
    /// Stream dictionary attributes
    pub attrs: Dictionary,
    rawdata: Bytes,
}

impl PDFStream {
    /// Create a new stream.
    pub fn new(attrs: Dictionary, rawdata: impl Into<Bytes>) -> Self {
        Self {
            attrs,
            rawdata: rawdata.into(),
        }
    }

    /// Get raw (undecoded) data.
    pub fn get_rawdata(&self) -> &[u8] {
        self.rawdata.as_ref()
    }

    /// Get raw data as shared bytes.
    pub fn rawdata_bytes(&self) -> Bytes {
        self.rawdata.clone()
    }

    /// Replace the raw data.
    pub fn set_rawdata(&mut self, data: impl Into<Bytes>) {
        self.rawdata = data.into();
    }

    /// Get attribute by name.
    pub fn get(&self, name: &str) -> Option<&PDFObject> {
        self.attrs.get(name)
    }

    /// XMP metadata stream (`/Type/Metadata/Subtype/XML`).
    pub fn is_metadata(&self) -> bool {
        is_metadata_dict(&self.attrs)
    }
}

/// An object stored under an object number in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub objid: u32,
    pub genno: u32,
    pub object: PDFObject,
}

impl IndirectObject {
    pub const fn new(objid: u32, genno: u32, object: PDFObject) -> Self {
        Self {
            objid,
            genno,
            object,
        }
    }
}

/// Digital signature dictionary: `Type` (or, when absent, `FT`) is `Sig`.
///
/// The `Contents` of such a dictionary is never encrypted or decrypted.
pub fn is_signature_dict(dict: &Dictionary) -> bool {
    dict.get("Type")
        .or_else(|| dict.get("FT"))
        .and_then(PDFObject::text_value)
        == Some(b"Sig".as_slice())
}

/// `/Type/Metadata/Subtype/XML` stream dictionary.
pub fn is_metadata_dict(dict: &Dictionary) -> bool {
    let name_is = |key: &str, want: &str| {
        matches!(dict.get(key), Some(PDFObject::Name(n)) if n == want)
    };
    name_is("Type", "Metadata") && name_is("Subtype", "XML")
}
