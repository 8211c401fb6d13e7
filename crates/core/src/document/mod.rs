//! Document structure.
//!
//! This module contains:
//! - `source` - header, cross-reference chain and trailer of an existing file
//! - `store` - the in-memory object store and authentication on load

pub mod source;
pub mod store;

pub use source::{DEFAULT_FILE_VERSION, SourceFile, XRefEntry};
pub use store::Document;
