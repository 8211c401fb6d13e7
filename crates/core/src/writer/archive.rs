//! Append-only output sink for the writer.
//!
//! Offsets recorded in the cross-reference section come from
//! [`Archive::current_offset`] before an object is written; nothing already
//! emitted is ever revisited.

use crate::error::Result;
use std::io::Write;

/// Append-only byte sink that knows how many bytes it has accepted.
pub trait Archive {
    /// Append raw bytes.
    fn write_block(&mut self, data: &[u8]) -> Result<()>;

    /// Total bytes appended so far.
    fn current_offset(&self) -> u64;

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_block(&[byte])
    }

    /// Append an unsigned number in decimal.
    fn write_dword(&mut self, value: u32) -> Result<()> {
        self.write_string(&value.to_string())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_block(s.as_bytes())
    }
}

/// [`Archive`] over any [`Write`] (a file, a `Vec<u8>`, a socket).
pub struct FileArchive<W: Write> {
    writer: W,
    offset: u64,
}

impl<W: Write> FileArchive<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, offset: 0 }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Archive for FileArchive<W> {
    fn write_block(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.offset += data.len() as u64;
        Ok(())
    }

    fn current_offset(&self) -> u64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_tracks_bytes_written() {
        let mut archive = FileArchive::new(Vec::new());
        assert_eq!(archive.current_offset(), 0);

        archive.write_string("Hello").unwrap();
        assert_eq!(archive.current_offset(), 5);

        archive.write_byte(b' ').unwrap();
        archive.write_dword(4_294_967_295).unwrap();
        assert_eq!(archive.current_offset(), 16);
        assert_eq!(archive.into_inner(), b"Hello 4294967295");
    }
}
