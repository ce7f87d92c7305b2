//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to a bezel
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// No start word was found within the sync budget, or the link failed
    /// while scanning for it
    #[error("Start word sync failed: {0}")]
    StartWordSync(String),

    /// The trailing checksum does not match the header and body
    #[error("Checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch {
        /// Computed over the received bytes
        expected: u16,
        /// Carried by the frame
        actual: u16,
    },

    /// The device answered with a non-OK status
    #[error("Command failed with status {code} ({label})")]
    CommandFailed {
        /// Raw status code
        code: u16,
        /// Description of `code`
        label: &'static str,
    },

    /// A firmware upgrade phase failed after its retries
    #[error("Firmware upgrade failed: {0}")]
    FirmwareUpgrade(String),

    /// No codec pair is known for this opcode at this api version
    #[error("No codec for opcode {opcode:#06x} at api version {api_version}")]
    Configuration {
        /// Requested opcode
        opcode: u16,
        /// Api version the device reported
        api_version: u16,
    },

    /// Bytes that do not form a valid frame or body layout
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The response opcode does not echo the request
    #[error("Unexpected response: expected opcode {expected:#06x}, got {actual:#06x}")]
    UnexpectedResponse {
        /// Request opcode
        expected: u16,
        /// Response opcode
        actual: u16,
    },

    /// An external DFU tool step exited unsuccessfully
    #[error("{step} exited with code {code:?}")]
    ToolFailed {
        /// Step name
        step: &'static str,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
    },

    /// The serial device could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// A caller-supplied value cannot be expressed on the wire
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Read, write or process spawn failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Numeric device status carried by a rejection, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProtocolError::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}
