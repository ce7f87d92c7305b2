//! Firmware upgrade
//!
//! An upgrade runs in three phases:
//! 1. ENTER_DFU_BOOTLOADER over the serial protocol, then a settle delay
//!    while the device re-enumerates as a DFU target,
//! 2. flash the image with an external DFU tool, addressed by the device's
//!    serial number,
//! 3. tell the bootloader to jump back to the application.
//!
//! Phase 3 runs whatever happened in phases 1 and 2. A device left in the
//! bootloader no longer answers the serial protocol.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{info, warn};

use crate::device::Bezel;
use crate::protocol::ProtocolError;

/// Version of the firmware image shipped with this crate
pub const PACKAGED_FIRMWARE_VERSION: &str = "1.4.0.0";

/// Start of the application in flash; leaving the bootloader jumps here
pub const FLASH_ORIGIN: &str = "0x08000000";

/// DFU interface the bootloader exposes the flash on
pub const DFU_INTERFACE: u8 = 0;

/// Exit codes of the leave step that mean the device left the bootloader.
/// The tool reports 74 when the device resets before acknowledging.
pub const LEAVE_SUCCESS_CODES: [i32; 2] = [0, 74];

/// Path of the packaged firmware image
pub fn packaged_firmware_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("firmware")
        .join(format!("bezel-{PACKAGED_FIRMWARE_VERSION}.bin"))
}

/// One invocation of the DFU tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DfuStep {
    /// Download `image` to the application flash
    Flash {
        /// Firmware image file
        image: PathBuf,
    },
    /// Jump from the bootloader to the application
    Leave,
}

impl DfuStep {
    /// Step name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            DfuStep::Flash { .. } => "flash",
            DfuStep::Leave => "leave bootloader",
        }
    }

    /// Command line arguments for the device with `serial`
    pub fn args(&self, serial: &str) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            DFU_INTERFACE.to_string(),
            "-S".to_string(),
            serial.to_string(),
        ];
        match self {
            DfuStep::Flash { image } => {
                args.push("-D".to_string());
                args.push(image.display().to_string());
            }
            DfuStep::Leave => {
                args.push("-s".to_string());
                args.push(format!("{FLASH_ORIGIN}:leave"));
            }
        }
        args
    }

    fn succeeded(&self, code: Option<i32>) -> bool {
        match (self, code) {
            (DfuStep::Flash { .. }, Some(0)) => true,
            (DfuStep::Leave, Some(code)) => LEAVE_SUCCESS_CODES.contains(&code),
            _ => false,
        }
    }
}

/// Runs the external flashing utility
pub trait DfuTool: Send + Sync {
    /// Run with `args` and return the exit code (`None` if killed by a signal)
    fn run(&self, args: &[String]) -> Result<Option<i32>, ProtocolError>;
}

/// `dfu-util` (or a compatible program) on the host
#[derive(Debug, Clone)]
pub struct DfuUtil {
    program: PathBuf,
}

impl DfuUtil {
    /// Run `program`, looked up on `PATH` unless absolute
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DfuTool for DfuUtil {
    fn run(&self, args: &[String]) -> Result<Option<i32>, ProtocolError> {
        info!(program = %self.program.display(), ?args, "running DFU tool");
        let status = Command::new(&self.program).args(args).status()?;
        Ok(status.code())
    }
}

/// Drives the three upgrade phases against one bezel
pub struct FirmwareUpgrader<'a> {
    bezel: &'a Bezel,
    tool: Box<dyn DfuTool>,
    settle: Duration,
}

impl<'a> FirmwareUpgrader<'a> {
    /// Upgrader flashing through `tool`, with the settle delay from the bezel's
    /// config
    pub fn new(bezel: &'a Bezel, tool: Box<dyn DfuTool>) -> Self {
        Self {
            bezel,
            tool,
            settle: bezel.config().bootloader_settle(),
        }
    }

    /// Upgrade with the DFU program named in the bezel's config
    pub fn with_configured_tool(bezel: &'a Bezel) -> Self {
        Self::new(bezel, Box::new(DfuUtil::new(&bezel.config().dfu_program)))
    }

    /// Flash `image`, or the packaged image when `None`
    pub fn upgrade(&self, image: Option<&Path>) -> Result<(), ProtocolError> {
        let _guard = self.bezel.span().enter();
        let image = image.map(Path::to_path_buf).unwrap_or_else(packaged_firmware_path);

        // The serial number addresses the device once it is a DFU target
        let serial = self
            .bezel
            .read_manufacturing_info()
            .map_err(|e| ProtocolError::FirmwareUpgrade(format!("reading serial number: {e}")))?
            .serial_number
            .to_string();
        info!(%serial, image = %image.display(), "starting firmware upgrade");

        self.in_bootloader(&serial, || {
            self.bezel.enter_dfu_bootloader()?;
            self.bezel.clock().sleep(self.settle);
            self.run_step(&serial, &DfuStep::Flash { image: image.clone() })
        })?;

        info!(%serial, "firmware upgrade complete");
        Ok(())
    }

    /// Run `body`, then always leave the bootloader
    ///
    /// The first failure wins; a failure to leave after a failed body is
    /// appended to the message. If `body` panics, the leave step still runs
    /// while unwinding.
    fn in_bootloader<F>(&self, serial: &str, body: F) -> Result<(), ProtocolError>
    where
        F: FnOnce() -> Result<(), ProtocolError>,
    {
        let guard = LeaveOnDrop::new(self, serial);
        let outcome = body();
        if let Err(e) = &outcome {
            warn!(error = %e, "upgrade failed, leaving bootloader");
        }
        let left = guard.leave();

        match (outcome, left) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(e)) => Err(upgrade_error(e)),
            (Err(e), Ok(())) => Err(upgrade_error(e)),
            (Err(e), Err(leave)) => Err(ProtocolError::FirmwareUpgrade(format!(
                "{e}; leaving bootloader also failed: {leave}"
            ))),
        }
    }

    fn run_step(&self, serial: &str, step: &DfuStep) -> Result<(), ProtocolError> {
        if let DfuStep::Flash { image } = step {
            if !image.is_file() {
                return Err(ProtocolError::FirmwareUpgrade(format!(
                    "firmware image {} not found",
                    image.display()
                )));
            }
        }

        let args = step.args(serial);
        self.bezel
            .config()
            .retry
            .run(self.bezel.clock(), step.name(), |_| {
                let code = self.tool.run(&args)?;
                if step.succeeded(code) {
                    Ok(())
                } else {
                    Err(ProtocolError::ToolFailed {
                        step: step.name(),
                        code,
                    })
                }
            })
            .map_err(upgrade_error)
    }
}

/// Runs the leave step exactly once: through [`LeaveOnDrop::leave`], or on
/// drop when the upgrade unwinds past it
struct LeaveOnDrop<'u, 'a> {
    upgrader: &'u FirmwareUpgrader<'a>,
    serial: &'u str,
    armed: bool,
}

impl<'u, 'a> LeaveOnDrop<'u, 'a> {
    fn new(upgrader: &'u FirmwareUpgrader<'a>, serial: &'u str) -> Self {
        Self {
            upgrader,
            serial,
            armed: true,
        }
    }

    fn leave(mut self) -> Result<(), ProtocolError> {
        self.armed = false;
        self.upgrader.run_step(self.serial, &DfuStep::Leave)
    }
}

impl Drop for LeaveOnDrop<'_, '_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.upgrader.run_step(self.serial, &DfuStep::Leave) {
            Ok(()) => warn!(serial = self.serial, "upgrade aborted, left bootloader"),
            Err(e) => warn!(
                serial = self.serial,
                error = %e,
                "upgrade aborted, device may still be in the bootloader"
            ),
        }
    }
}

fn upgrade_error(error: ProtocolError) -> ProtocolError {
    match error {
        ProtocolError::FirmwareUpgrade(_) => error,
        other => ProtocolError::FirmwareUpgrade(other.to_string()),
    }
}
