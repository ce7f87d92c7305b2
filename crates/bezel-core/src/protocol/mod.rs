//! Bezel Serial Protocol
//!
//! Implements the fixed binary protocol spoken by the bezel over USB serial.
//!
//! Every frame is a two-byte start word, a 14-byte little-endian header, a
//! body whose length the header declares, and a Fletcher-16 checksum over
//! header and body.

pub mod checksum;
pub mod codec;
pub mod commands;
mod error;
mod packet;
pub mod retry;
pub mod serial;
pub mod session;
pub mod stream;
pub mod sync;

pub use checksum::{fletcher16, verify_checksum};
pub use commands::{CodecPair, Opcode, Status};
pub use error::ProtocolError;
pub use packet::{Frame, Header, HEADER_SIZE};
pub use retry::RetryPolicy;
pub use serial::{configure_port, open_port, SerialOpener};
pub use session::Session;
pub use stream::{ChannelOpener, CommunicationChannel, SerialChannel};
pub use sync::{StartWordScanner, SyncState};

/// Default baud rate for the bezel link
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Per-read timeout on the serial device in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 3000;

/// Overall budget for finding the start word of a response in milliseconds
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 5000;

/// Sentinel byte; two in a row mark the start of a frame
pub const START_BYTE: u8 = 0xAA;

/// The start word as it appears on the wire
pub const START_WORD: [u8; 2] = [START_BYTE, START_BYTE];

/// Largest body the host accepts from the device
pub const MAX_BODY_SIZE: usize = 512;
