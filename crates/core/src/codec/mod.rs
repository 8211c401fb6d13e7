//! Cipher and generator primitives.
//!
//! This module contains:
//! - `aes`: AES-128/256 CBC block chaining and key wrapping
//! - `arcfour`: RC4 keystream
//! - `mt19937`: Mersenne-Twister generator for file identifiers
//! - `predictor`: Flate and PNG predictor decoding for xref/object streams

pub mod aes;
pub mod arcfour;
pub mod mt19937;
pub mod predictor;

// Re-export main types for convenience
pub use aes::{AES_BLOCK_SIZE, AesKey, CbcDecryptor, CbcEncryptor};
pub use arcfour::Arcfour;
pub use mt19937::{MersenneTwister, generate_file_id};
pub use predictor::{decode_stream_data, flate_decode};
