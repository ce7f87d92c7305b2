//! Fixed-layout little-endian field codec
//!
//! Bodies are flat records: integers are little-endian, strings occupy a
//! declared number of bytes (NUL-padded, truncated if too long) and are
//! never length-prefixed.

use byteorder::{ByteOrder, LittleEndian};

use super::ProtocolError;

/// Builder for request bodies
#[derive(Debug, Default)]
pub struct BodyWriter {
    bytes: Vec<u8>,
}

impl BodyWriter {
    /// Create an empty body
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single byte
    pub fn u8(mut self, value: u8) -> Self {
        self.bytes.push(value);
        self
    }

    /// Add a flag as one byte (0 or 1)
    pub fn flag(self, value: bool) -> Self {
        self.u8(u8::from(value))
    }

    /// Add a 16-bit value (little-endian)
    pub fn u16(mut self, value: u16) -> Self {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
        self
    }

    /// Add a 32-bit value (little-endian)
    pub fn u32(mut self, value: u32) -> Self {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
        self
    }

    /// Add a 64-bit value (little-endian)
    pub fn u64(mut self, value: u64) -> Self {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
        self
    }

    /// Add a string padded or truncated to exactly `len` bytes
    pub fn fixed_str(mut self, value: &str, len: usize) -> Self {
        let raw = value.as_bytes();
        let take = raw.len().min(len);
        self.bytes.extend_from_slice(&raw[..take]);
        self.bytes.resize(self.bytes.len() + (len - take), 0);
        self
    }

    /// Finish the body
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Cursor over a response body
///
/// Reading past the end is a [`ProtocolError::MalformedFrame`]; bytes left
/// over once the layout is consumed are ignored.
pub struct BodyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    /// Reader positioned at the start of `bytes`
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(ProtocolError::MalformedFrame(format!(
                "body too short: need {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.bytes.len()
            )));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Next byte
    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    /// Next little-endian `u16`
    pub fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    /// Next little-endian `u32`
    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Next little-endian `u64`
    pub fn u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Read a `len`-byte string field, stopping at the first NUL
    pub fn fixed_str(&mut self, len: usize) -> Result<String, ProtocolError> {
        let raw = self.take(len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }
}
