//! Typed values exchanged with the bezel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Light patterns the firmware can display
///
/// The numbering is append-only; firmware newer than this host may report
/// codes missing here, see [`CurrentPattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pattern {
    /// `0x0000`, LEDs off
    NoLight,
    /// `0x0001`
    PurpleScroll,
    /// `0x0002`
    YellowScroll,
    /// `0x0003`
    RedScroll,
    /// `0x0004`
    OrangeScroll,
    /// `0x0005`
    RainbowScroll,
    /// `0x0006`
    FlashingBlue,
    /// `0x0007`
    PulsingRed,
    /// `0x0100`
    RgbCycle,
}

impl Pattern {
    /// Every known pattern in code order
    pub fn all() -> &'static [Pattern] {
        &[
            Pattern::NoLight,
            Pattern::PurpleScroll,
            Pattern::YellowScroll,
            Pattern::RedScroll,
            Pattern::OrangeScroll,
            Pattern::RainbowScroll,
            Pattern::FlashingBlue,
            Pattern::PulsingRed,
            Pattern::RgbCycle,
        ]
    }

    /// Wire code
    pub fn code(&self) -> u16 {
        match self {
            Pattern::NoLight => 0x0000,
            Pattern::PurpleScroll => 0x0001,
            Pattern::YellowScroll => 0x0002,
            Pattern::RedScroll => 0x0003,
            Pattern::OrangeScroll => 0x0004,
            Pattern::RainbowScroll => 0x0005,
            Pattern::FlashingBlue => 0x0006,
            Pattern::PulsingRed => 0x0007,
            Pattern::RgbCycle => 0x0100,
        }
    }

    /// Known pattern for a wire code
    pub fn from_code(code: u16) -> Option<Self> {
        Pattern::all().iter().copied().find(|p| p.code() == code)
    }

    /// Human-readable name
    pub fn label(&self) -> &'static str {
        match self {
            Pattern::NoLight => "No light",
            Pattern::PurpleScroll => "Purple scroll",
            Pattern::YellowScroll => "Yellow scroll",
            Pattern::RedScroll => "Red scroll",
            Pattern::OrangeScroll => "Orange scroll",
            Pattern::RainbowScroll => "Rainbow scroll",
            Pattern::FlashingBlue => "Flashing blue",
            Pattern::PulsingRed => "Pulsing red",
            Pattern::RgbCycle => "RGB cycle",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Render a packed firmware version; byte 0 is the major number
///
/// `0x04030201` renders as `"1.2.3.4"`.
pub fn convert_version_to_string(version: u32) -> String {
    let [major, minor, patch, build] = version.to_le_bytes();
    format!("{major}.{minor}.{patch}.{build}")
}

/// Device serial number, three words rendered as uppercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialNumber(pub [u16; 3]);

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a:04X}{b:04X}{c:04X}")
    }
}

/// Result of IDENTIFY
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyInfo {
    /// Protocol revision the device speaks for version-sensitive opcodes
    pub api_version: u16,
    /// Name burned into the firmware, NUL padding removed
    pub device_name: String,
}

/// Result of VERSION_INFO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Packed application firmware version
    pub firmware: u32,
    /// Packed bootloader version
    pub bootloader: u32,
    /// Board revision
    pub hardware_revision: u16,
}

impl VersionInfo {
    /// Firmware version as `major.minor.patch.build`
    pub fn firmware_string(&self) -> String {
        convert_version_to_string(self.firmware)
    }

    /// Bootloader version as `major.minor.patch.build`
    pub fn bootloader_string(&self) -> String {
        convert_version_to_string(self.bootloader)
    }
}

/// Result of READ_MANUFACTURING_INFO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturingInfo {
    /// Addresses the device in DFU mode
    pub serial_number: SerialNumber,
    /// Board revision
    pub hardware_revision: u16,
    /// Model name, NUL padding removed
    pub model: String,
    /// Present from api version 1
    pub manufactured_at: Option<DateTime<Utc>>,
}

/// Result of GET_CURRENT_PATTERN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPattern {
    /// Raw pattern code as reported
    pub code: u16,
    /// Present from api version 1
    pub started_at: Option<DateTime<Utc>>,
}

impl CurrentPattern {
    /// Known pattern for the reported code
    pub fn pattern(&self) -> Option<Pattern> {
        Pattern::from_code(self.code)
    }

    /// Pattern name, or `unknown pattern 0x....` for codes this host lacks
    pub fn label(&self) -> String {
        match self.pattern() {
            Some(p) => p.label().to_string(),
            None => format!("unknown pattern {:#06x}", self.code),
        }
    }
}
