//! Byte link abstraction
//!
//! The session only needs to read, write and drop pending bytes, so the
//! serial port sits behind [`CommunicationChannel`] and a fresh channel is
//! produced for every exchange by a [`ChannelOpener`].

use serialport::SerialPort;
use std::io::{self, Read, Write};

use super::ProtocolError;

/// A bidirectional byte link to one device
pub trait CommunicationChannel: Read + Write + Send {
    /// Drop bytes received but not yet read
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Drop bytes written but not yet transmitted
    fn clear_output_buffer(&mut self) -> io::Result<()>;
}

/// Opens the device for a single exchange
///
/// The returned channel is closed when dropped; nothing holds the device
/// between exchanges.
pub trait ChannelOpener: Send + Sync {
    /// Open a fresh channel to the device
    fn open(&self) -> Result<Box<dyn CommunicationChannel>, ProtocolError>;

    /// Name of the underlying device for logs
    fn describe(&self) -> String;
}

/// Serial port wrapper implementing CommunicationChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened and configured port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Output)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
