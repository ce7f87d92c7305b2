//! Protocol commands
//!
//! Opcodes, status codes and the static table that maps an
//! (opcode, api version) pair to the request/response layouts it uses.
//! Layouts are append-only: a newer api version may add trailing fields to
//! a body but never removes or reorders existing ones.

use serde::{Deserialize, Serialize};

use super::ProtocolError;

/// Operation selector carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// `0x0000`
    Identify,
    /// `0x0001`
    VersionInfo,
    /// `0x0002`
    DisplayPatternAtTime,
    /// `0x0003`
    DisplayPatternWithDelay,
    /// `0x0004`
    GetTime,
    /// `0x0005`
    SetTime,
    /// `0x0006`
    ReadManufacturingInfo,
    /// `0x0007`
    GetCurrentPattern,
    /// `0x0020`, reboot into the DFU bootloader
    EnterDfuBootloader,
}

impl Opcode {
    /// Wire value of the opcode
    pub fn code(&self) -> u16 {
        match self {
            Opcode::Identify => 0x0000,
            Opcode::VersionInfo => 0x0001,
            Opcode::DisplayPatternAtTime => 0x0002,
            Opcode::DisplayPatternWithDelay => 0x0003,
            Opcode::GetTime => 0x0004,
            Opcode::SetTime => 0x0005,
            Opcode::ReadManufacturingInfo => 0x0006,
            Opcode::GetCurrentPattern => 0x0007,
            Opcode::EnterDfuBootloader => 0x0020,
        }
    }

    /// Identify and VersionInfo are pinned to api version 0; everything else
    /// follows the version the device reports
    pub fn is_version_sensitive(&self) -> bool {
        !matches!(self, Opcode::Identify | Opcode::VersionInfo)
    }
}

/// Response status reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// 0, success
    Ok,
    /// 1
    UnknownCommand,
    /// 2
    NotImplemented,
    /// 3
    WrongArgumentCount,
    /// 4
    WrongArgumentValue,
    /// 5
    DeviceBusy,
    /// 6
    ExecutionFailure,
    /// 7
    MalformedCommand,
    /// 8, the device rejected the request checksum
    BadChecksum,
}

impl Status {
    /// Known status for a wire code
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => Status::Ok,
            1 => Status::UnknownCommand,
            2 => Status::NotImplemented,
            3 => Status::WrongArgumentCount,
            4 => Status::WrongArgumentValue,
            5 => Status::DeviceBusy,
            6 => Status::ExecutionFailure,
            7 => Status::MalformedCommand,
            8 => Status::BadChecksum,
            _ => return None,
        })
    }

    /// Wire code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Human-readable description carried in [`ProtocolError::CommandFailed`]
    pub fn label(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::UnknownCommand => "unknown command",
            Status::NotImplemented => "not implemented",
            Status::WrongArgumentCount => "wrong argument count",
            Status::WrongArgumentValue => "wrong argument value",
            Status::DeviceBusy => "device busy",
            Status::ExecutionFailure => "execution failure",
            Status::MalformedCommand => "malformed command",
            Status::BadChecksum => "bad checksum",
        }
    }

    /// Label for a raw status code, including codes this host doesn't know
    pub fn label_for(code: u16) -> &'static str {
        Status::from_code(code)
            .map(|s| s.label())
            .unwrap_or("unrecognized status")
    }

    /// Map a response status to `Ok(())` or a command failure
    pub fn check(code: u16) -> Result<(), ProtocolError> {
        if code == Status::Ok.code() {
            Ok(())
        } else {
            Err(ProtocolError::CommandFailed {
                code,
                label: Status::label_for(code),
            })
        }
    }
}

/// Request and response body layouts for one (opcode, api version) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecPair {
    /// Operation this pair encodes
    pub opcode: Opcode,
    /// Api version the layouts belong to
    pub api_version: u16,
    /// Exact request body length
    pub request_len: usize,
    /// Minimum response body length; longer bodies are accepted
    pub response_len: usize,
}

const fn pair(opcode: Opcode, api_version: u16, request_len: usize, response_len: usize) -> CodecPair {
    CodecPair {
        opcode,
        api_version,
        request_len,
        response_len,
    }
}

/// Every pair the host knows how to speak
static CODEC_TABLE: &[CodecPair] = &[
    pair(Opcode::Identify, 0, 0, 18),
    pair(Opcode::VersionInfo, 0, 0, 10),
    pair(Opcode::DisplayPatternAtTime, 0, 11, 0),
    pair(Opcode::DisplayPatternAtTime, 1, 15, 0),
    pair(Opcode::DisplayPatternWithDelay, 0, 6, 0),
    pair(Opcode::DisplayPatternWithDelay, 1, 6, 0),
    pair(Opcode::GetTime, 0, 0, 8),
    pair(Opcode::GetTime, 1, 0, 8),
    pair(Opcode::SetTime, 0, 8, 0),
    pair(Opcode::SetTime, 1, 8, 0),
    pair(Opcode::ReadManufacturingInfo, 0, 0, 24),
    pair(Opcode::ReadManufacturingInfo, 1, 0, 28),
    pair(Opcode::GetCurrentPattern, 0, 0, 2),
    pair(Opcode::GetCurrentPattern, 1, 0, 10),
    pair(Opcode::EnterDfuBootloader, 0, 0, 0),
    pair(Opcode::EnterDfuBootloader, 1, 0, 0),
];

impl CodecPair {
    /// Look up the layouts for `opcode` at `api_version`
    pub fn resolve(opcode: Opcode, api_version: u16) -> Result<CodecPair, ProtocolError> {
        CODEC_TABLE
            .iter()
            .find(|p| p.opcode == opcode && p.api_version == api_version)
            .copied()
            .ok_or(ProtocolError::Configuration {
                opcode: opcode.code(),
                api_version,
            })
    }

    /// Highest api version with a layout for every opcode
    pub fn latest_api_version() -> u16 {
        CODEC_TABLE
            .iter()
            .filter(|p| p.opcode == Opcode::DisplayPatternAtTime)
            .map(|p| p.api_version)
            .max()
            .unwrap_or(0)
    }

    /// Every registered pair
    pub fn table() -> &'static [CodecPair] {
        CODEC_TABLE
    }
}
