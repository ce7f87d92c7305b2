//! Runtime configuration
//!
//! Every field has a default matching the bezel's fixed link parameters,
//! so a config file only needs to name the device.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::protocol::{
    ProtocolError, RetryPolicy, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS, DEFAULT_SYNC_TIMEOUT_MS,
};

/// Identify probes averaged by the clock offset estimator
pub const DEFAULT_CALIBRATION_ITERATIONS: u32 = 60;

/// Pause after entering the DFU bootloader before flashing
pub const DEFAULT_BOOTLOADER_SETTLE_MS: u64 = 3000;

/// External flashing utility
pub const DEFAULT_DFU_PROGRAM: &str = "dfu-util";

/// Settings for one bezel; missing fields take their defaults when loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BezelConfig {
    /// Serial device path (e.g. "/dev/ttyACM0")
    pub device_path: String,
    /// Line speed; the device only speaks 115200
    pub baud_rate: u32,
    /// Timeout of each individual read in milliseconds
    pub read_timeout_ms: u64,
    /// Overall budget for finding a response's start word in milliseconds
    pub sync_timeout_ms: u64,
    /// Attempt budget for every exchange and DFU tool step
    pub retry: RetryPolicy,
    /// Identify probes per clock offset estimate
    pub calibration_iterations: u32,
    /// Wait after ENTER_DFU_BOOTLOADER before flashing, in milliseconds
    pub bootloader_settle_ms: u64,
    /// Flashing utility to run, looked up on `PATH` unless absolute
    pub dfu_program: String,
}

impl Default for BezelConfig {
    fn default() -> Self {
        Self {
            device_path: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            sync_timeout_ms: DEFAULT_SYNC_TIMEOUT_MS,
            retry: RetryPolicy::default(),
            calibration_iterations: DEFAULT_CALIBRATION_ITERATIONS,
            bootloader_settle_ms: DEFAULT_BOOTLOADER_SETTLE_MS,
            dfu_program: DEFAULT_DFU_PROGRAM.to_string(),
        }
    }
}

impl BezelConfig {
    /// Default configuration for the device at `path`
    pub fn for_device(path: impl Into<String>) -> Self {
        Self {
            device_path: path.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::ConfigError(e.to_string()))
    }

    /// Load a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self, ProtocolError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Per-read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Start word search budget
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Settle delay after entering the bootloader
    pub fn bootloader_settle(&self) -> Duration {
        Duration::from_millis(self.bootloader_settle_ms)
    }
}
