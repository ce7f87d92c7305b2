//! Serial port handling
//!
//! Opens the bezel's USB-serial device with the fixed line settings:
//! 115200 baud, 8 data bits, no parity, 1 stop bit, no flow control.

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;
use tracing::debug;

use super::stream::{ChannelOpener, CommunicationChannel, SerialChannel};
use super::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};

/// Open a serial port; `read_timeout` bounds every individual read
pub fn open_port(
    name: &str,
    baud_rate: Option<u32>,
    read_timeout: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    serialport::new(name, baud)
        .timeout(read_timeout)
        .open()
        .map_err(|e| ProtocolError::SerialError(format!("{name}: {e}")))
}

/// Apply the bezel's line settings on an open port
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    let line_error = |e: serialport::Error| ProtocolError::SerialError(format!("line settings: {e}"));

    port.set_data_bits(DataBits::Eight).map_err(line_error)?;
    port.set_parity(Parity::None).map_err(line_error)?;
    port.set_stop_bits(StopBits::One).map_err(line_error)?;
    port.set_flow_control(FlowControl::None).map_err(line_error)
}

/// Opens the configured serial device afresh for each exchange
#[derive(Debug, Clone)]
pub struct SerialOpener {
    path: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialOpener {
    /// Opener for `path` with explicit line speed and read timeout
    pub fn new(path: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            read_timeout,
        }
    }

    /// Opener with the default line settings
    pub fn with_defaults(path: impl Into<String>) -> Self {
        Self::new(
            path,
            DEFAULT_BAUD_RATE,
            Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        )
    }

    /// Device path
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ChannelOpener for SerialOpener {
    fn open(&self) -> Result<Box<dyn CommunicationChannel>, ProtocolError> {
        let mut port = open_port(&self.path, Some(self.baud_rate), self.read_timeout)?;
        configure_port(port.as_mut())?;
        debug!(path = %self.path, baud = self.baud_rate, "serial port opened");
        Ok(Box::new(SerialChannel::new(port)))
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}
