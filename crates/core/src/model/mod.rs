//! PDF object model.
//!
//! - `objects` - object types (PDFObject, PDFStream, PDFObjRef)
//! - `serialize` - writing objects to an archive

pub mod objects;
pub mod serialize;

pub use objects::{
    Dictionary, IndirectObject, PDFObjRef, PDFObject, PDFStream, PDFString, is_metadata_dict,
    is_signature_dict,
};
