//! Frame encoding/decoding
//!
//! Frame format:
//! - 2 bytes: start word (0xAA 0xAA)
//! - 14 bytes: header (seven little-endian u16 fields)
//! - N bytes: body, N = header.len
//! - 2 bytes: Fletcher-16 of header + body (little-endian)

use byteorder::{ByteOrder, LittleEndian};

use super::checksum::{fletcher16, verify_checksum};
use super::{Opcode, ProtocolError, MAX_BODY_SIZE, START_WORD};

/// Encoded header size in bytes
pub const HEADER_SIZE: usize = 14;

/// Size of the trailing checksum in bytes
pub const CHECKSUM_SIZE: usize = 2;

/// Header shared by commands and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Api version the body layout follows
    pub api_version: u16,
    /// Opcode; responses echo the request's
    pub command: u16,
    /// Always 0 in requests
    pub status: u16,
    /// Must be 0
    pub reserved1: u16,
    /// Must be 0
    pub reserved2: u16,
    /// Must be 0
    pub reserved3: u16,
    /// Body length in bytes
    pub len: u16,
}

impl Header {
    /// Header for a request carrying `len` body bytes
    pub fn request(api_version: u16, opcode: Opcode, len: u16) -> Self {
        Self {
            api_version,
            command: opcode.code(),
            status: 0,
            reserved1: 0,
            reserved2: 0,
            reserved3: 0,
            len,
        }
    }

    /// Little-endian encoding, without the start word
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let fields = [
            self.api_version,
            self.command,
            self.status,
            self.reserved1,
            self.reserved2,
            self.reserved3,
            self.len,
        ];
        LittleEndian::write_u16_into(&fields, &mut buf);
        buf
    }

    /// Decode a header; the reserved fields must be zero and the declared
    /// body length must not exceed [`MAX_BODY_SIZE`]
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::MalformedFrame(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                data.len()
            )));
        }

        let mut fields = [0u16; 7];
        LittleEndian::read_u16_into(&data[..HEADER_SIZE], &mut fields);
        let header = Self {
            api_version: fields[0],
            command: fields[1],
            status: fields[2],
            reserved1: fields[3],
            reserved2: fields[4],
            reserved3: fields[5],
            len: fields[6],
        };

        if header.reserved1 != 0 || header.reserved2 != 0 || header.reserved3 != 0 {
            return Err(ProtocolError::MalformedFrame(
                "reserved header fields are not zero".to_string(),
            ));
        }
        if header.len as usize > MAX_BODY_SIZE {
            return Err(ProtocolError::MalformedFrame(format!(
                "declared body length {} exceeds {}",
                header.len, MAX_BODY_SIZE
            )));
        }

        Ok(header)
    }
}

/// One complete wire message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header; `len` matches `body`
    pub header: Header,
    /// Opcode-specific payload
    pub body: Vec<u8>,
}

impl Frame {
    /// Create a request frame; the header length is taken from the body
    pub fn request(api_version: u16, opcode: Opcode, body: Vec<u8>) -> Self {
        let header = Header::request(api_version, opcode, body.len() as u16);
        Self { header, body }
    }

    /// Checksum over header + body
    pub fn checksum(&self) -> u16 {
        fletcher16(&self.checksummed_bytes())
    }

    fn checksummed_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.body.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Encode the frame to raw bytes, start word included
    pub fn to_bytes(&self) -> Vec<u8> {
        let covered = self.checksummed_bytes();
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.extend_from_slice(&START_WORD);
        bytes.extend_from_slice(&covered);

        let mut sum = [0u8; CHECKSUM_SIZE];
        LittleEndian::write_u16(&mut sum, fletcher16(&covered));
        bytes.extend_from_slice(&sum);

        bytes
    }

    /// Reassemble a frame read after the start word and verify its checksum
    pub fn from_parts(header_bytes: &[u8], body: Vec<u8>, checksum: u16) -> Result<Self, ProtocolError> {
        let header = Header::from_bytes(header_bytes)?;
        if body.len() != header.len as usize {
            return Err(ProtocolError::MalformedFrame(format!(
                "header declares {} body bytes, got {}",
                header.len,
                body.len()
            )));
        }
        let frame = Self { header, body };
        verify_checksum(&frame.checksummed_bytes(), checksum)?;
        Ok(frame)
    }

    /// Decode a whole frame from raw bytes, start word included
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < START_WORD.len() + HEADER_SIZE + CHECKSUM_SIZE {
            return Err(ProtocolError::MalformedFrame(format!(
                "frame too short: {} bytes",
                data.len()
            )));
        }
        if data[..2] != START_WORD {
            return Err(ProtocolError::MalformedFrame(
                "frame does not begin with the start word".to_string(),
            ));
        }

        let header_bytes = &data[2..2 + HEADER_SIZE];
        let header = Header::from_bytes(header_bytes)?;
        let body_start = 2 + HEADER_SIZE;
        let body_end = body_start + header.len as usize;
        if data.len() < body_end + CHECKSUM_SIZE {
            return Err(ProtocolError::MalformedFrame(format!(
                "frame truncated: need {} bytes, got {}",
                body_end + CHECKSUM_SIZE,
                data.len()
            )));
        }

        let checksum = LittleEndian::read_u16(&data[body_end..body_end + CHECKSUM_SIZE]);
        Self::from_parts(header_bytes, data[body_start..body_end].to_vec(), checksum)
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        START_WORD.len() + HEADER_SIZE + self.body.len() + CHECKSUM_SIZE
    }
}
