//! PDF object parsing.
//!
//! - `lexer`: byte-level tokenizer
//! - `object_parser`: objects, references and indirect objects

pub mod lexer;
pub mod object_parser;

pub use lexer::{Keyword, Lexer, Token};
pub use object_parser::ObjectParser;
