//! # Bezel Core Library
//!
//! Host-side protocol engine for the bezel status-indicator device.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Framing, Fletcher-16 checksums and start word recovery for the bezel's
//!   binary serial protocol
//! - Versioned command dispatch with retry supervision
//! - Link latency calibration for setting the device clock
//! - Firmware upgrades through the DFU bootloader
//!
//! Every operation opens the device, performs one exchange and closes it
//! again. Driving several bezels at once means one thread per device; one
//! device must never see two exchanges at the same time.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bezel_core::{Bezel, BezelConfig, Pattern};
//!
//! let mut bezel = Bezel::new(BezelConfig::for_device("/dev/ttyACM0"));
//! let info = bezel.identify()?;
//! println!("{} speaks api v{}", info.device_name, info.api_version);
//!
//! bezel.set_time(None)?;
//! bezel.display_pattern_with_delay(Pattern::RainbowScroll, std::time::Duration::from_secs(2))?;
//! # Ok::<(), bezel_core::ProtocolError>(())
//! ```

pub mod clock;
pub mod config;
pub mod device;
pub mod firmware;
pub mod protocol;

pub use clock::{Clock, SystemClock};
pub use config::BezelConfig;
pub use device::{
    convert_version_to_string, Bezel, ClockOffset, CurrentPattern, IdentifyInfo,
    ManufacturingInfo, Pattern, SerialNumber, VersionInfo,
};
pub use firmware::{FirmwareUpgrader, PACKAGED_FIRMWARE_VERSION};
pub use protocol::ProtocolError;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::BezelConfig;
    pub use crate::device::{Bezel, ClockOffset, Pattern};
    pub use crate::firmware::{DfuTool, DfuUtil, FirmwareUpgrader};
    pub use crate::protocol::{ProtocolError, RetryPolicy, Status};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
