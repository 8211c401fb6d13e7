//! Flate and PNG predictor decoding.
//!
//! Only the cross-reference and object streams of a source file are ever
//! decoded; content streams are carried through the writer untouched.

use crate::error::{PdfError, Result};
use crate::model::{Dictionary, PDFObject};
use flate2::{Decompress, FlushDecompress, Status};
use std::io::Read;

/// Inflate zlib data, salvaging the decoded prefix of a damaged stream.
pub fn flate_decode(data: &[u8]) -> Vec<u8> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    if decoder.read_to_end(&mut out).is_ok() {
        return out;
    }
    tracing::debug!(len = data.len(), "zlib stream damaged, salvaging prefix");
    decompress_corrupted(data)
}

fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

/// Decode stream data according to its `Filter` and `DecodeParms`.
///
/// Supports no filter and `FlateDecode` (with PNG predictors), which covers
/// what writers put into xref and object streams.
pub fn decode_stream_data(dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>> {
    let filter = match dict.get("Filter") {
        None => None,
        Some(PDFObject::Name(name)) => Some(name.as_str()),
        Some(PDFObject::Array(arr)) if arr.is_empty() => None,
        Some(PDFObject::Array(arr)) if arr.len() == 1 => Some(arr[0].as_name()?),
        Some(other) => {
            return Err(PdfError::DecodeError(format!(
                "unsupported filter chain: {other:?}"
            )));
        }
    };

    let mut output = match filter {
        None => return Ok(data.to_vec()),
        Some("FlateDecode") | Some("Fl") => flate_decode(data),
        Some(name) => {
            return Err(PdfError::DecodeError(format!("unsupported filter: {name}")));
        }
    };

    let parms = match dict.get("DecodeParms") {
        Some(PDFObject::Dict(d)) => Some(d),
        Some(PDFObject::Array(arr)) => arr.first().and_then(|p| p.as_dict().ok()),
        _ => None,
    };
    if let Some(parms) = parms {
        let get = |key: &str, default: i64| {
            parms
                .get(key)
                .and_then(|v| v.as_int().ok())
                .unwrap_or(default)
        };
        let predictor = get("Predictor", 1);
        if predictor >= 10 {
            output = apply_png_predictor(
                &output,
                get("Columns", 1).max(1) as usize,
                get("Colors", 1).max(1) as usize,
                get("BitsPerComponent", 8).max(1) as usize,
            );
        } else if predictor != 1 {
            return Err(PdfError::DecodeError(format!(
                "unsupported predictor: {predictor}"
            )));
        }
    }

    Ok(output)
}

/// Reverse PNG row filtering (each row prefixed with its filter type byte).
fn apply_png_predictor(data: &[u8], columns: usize, colors: usize, bits: usize) -> Vec<u8> {
    let row_bytes = (colors * columns * bits).div_ceil(8);
    let bpp = std::cmp::max(1, colors * bits / 8);
    let row_size = row_bytes + 1;

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];
    let mut current_row = vec![0u8; row_bytes];

    for row in data.chunks_exact(row_size) {
        let filter_type = row[0];
        let row_data = &row[1..];

        for i in 0..row_bytes {
            let left = if i >= bpp { current_row[i - bpp] } else { 0 };
            let above = prev_row[i];
            let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
            let predicted = match filter_type {
                1 => left,
                2 => above,
                3 => ((left as u16 + above as u16) / 2) as u8,
                4 => paeth_predictor(left, above, upper_left),
                _ => 0,
            };
            current_row[i] = row_data[i].wrapping_add(predicted);
        }

        result.extend_from_slice(&current_row);
        std::mem::swap(&mut prev_row, &mut current_row);
    }

    result
}

const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn up_predictor_accumulates_rows() {
        // Two rows of 3 columns with the Up filter.
        let data = [2, 1, 2, 3, 2, 1, 1, 1];
        assert_eq!(apply_png_predictor(&data, 3, 1, 8), vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn flate_with_predictor_params() {
        let raw = [0u8, 0, 0, 0, 10, 1, 2, 0, 0, 0, 5, 0];
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(&raw).unwrap();
        let compressed = enc.finish().unwrap();

        let mut parms = Dictionary::new();
        parms.insert("Predictor".into(), PDFObject::Int(12));
        parms.insert("Columns".into(), PDFObject::Int(5));
        let mut dict = Dictionary::new();
        dict.insert("Filter".into(), PDFObject::Name("FlateDecode".into()));
        dict.insert("DecodeParms".into(), PDFObject::Dict(parms));

        let decoded = decode_stream_data(&dict, &compressed).unwrap();
        assert_eq!(decoded, vec![0, 0, 0, 10, 1, 0, 0, 0, 15, 1]);
    }

    #[test]
    fn unknown_filter_is_an_error() {
        let mut dict = Dictionary::new();
        dict.insert("Filter".into(), PDFObject::Name("LZWDecode".into()));
        assert!(decode_stream_data(&dict, b"x").is_err());
    }
}
