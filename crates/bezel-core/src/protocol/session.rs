//! Transport session
//!
//! One session is one exchange: open the device, flush both directions,
//! write the request frame, synchronize on the response start word, read
//! header, body and checksum, verify, close. The device is closed when the
//! session is dropped, so every exit path (errors included) releases it
//! and a retry always starts from a freshly opened device.

use std::io::{Read, Write};
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, trace};

use super::packet::CHECKSUM_SIZE;
use super::stream::{ChannelOpener, CommunicationChannel};
use super::sync::synchronize;
use super::{Frame, ProtocolError, HEADER_SIZE};
use crate::clock::Clock;

/// An open device good for one request/response exchange
pub struct Session<'a> {
    channel: Box<dyn CommunicationChannel>,
    clock: &'a dyn Clock,
    sync_budget: Duration,
    device: String,
}

impl<'a> Session<'a> {
    /// Open the device and drop anything left in its buffers
    pub fn open(
        opener: &dyn ChannelOpener,
        clock: &'a dyn Clock,
        sync_budget: Duration,
    ) -> Result<Self, ProtocolError> {
        let mut channel = opener.open()?;
        channel.clear_input_buffer()?;
        channel.clear_output_buffer()?;

        let device = opener.describe();
        trace!(device = %device, "session opened");
        Ok(Self {
            channel,
            clock,
            sync_budget,
            device,
        })
    }

    /// Write one frame
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let bytes = frame.to_bytes();
        trace!(len = bytes.len(), bytes = ?bytes, "writing frame");
        self.channel.write_all(&bytes)?;
        self.channel.flush()?;
        Ok(())
    }

    /// Read one frame, resynchronizing on the start word first
    pub fn read_frame(&mut self) -> Result<Frame, ProtocolError> {
        synchronize(&mut self.channel, self.clock, self.sync_budget)?;

        let mut header = [0u8; HEADER_SIZE];
        self.channel.read_exact(&mut header)?;
        let len = LittleEndian::read_u16(&header[HEADER_SIZE - 2..]) as usize;
        if len > super::MAX_BODY_SIZE {
            return Err(ProtocolError::MalformedFrame(format!(
                "declared body length {} exceeds {}",
                len,
                super::MAX_BODY_SIZE
            )));
        }

        let mut body = vec![0u8; len];
        self.channel.read_exact(&mut body)?;

        let mut checksum = [0u8; CHECKSUM_SIZE];
        self.channel.read_exact(&mut checksum)?;

        let frame = Frame::from_parts(&header, body, LittleEndian::read_u16(&checksum))?;
        trace!(header = ?frame.header, body = ?frame.body, "read frame");
        Ok(frame)
    }

    /// Write `request` and read its response
    ///
    /// The response must echo the request opcode. Status is left to the
    /// caller.
    pub fn exchange(&mut self, request: &Frame) -> Result<Frame, ProtocolError> {
        self.write_frame(request)?;
        let response = self.read_frame()?;
        if response.header.command != request.header.command {
            return Err(ProtocolError::UnexpectedResponse {
                expected: request.header.command,
                actual: response.header.command,
            });
        }
        debug!(
            device = %self.device,
            command = request.header.command,
            status = response.header.status,
            "exchange complete"
        );
        Ok(response)
    }

}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        trace!(device = %self.device, "session closed");
    }
}

/// Run a single open / exchange / close cycle
pub fn exchange_once(
    opener: &dyn ChannelOpener,
    clock: &dyn Clock,
    sync_budget: Duration,
    request: &Frame,
) -> Result<Frame, ProtocolError> {
    let mut session = Session::open(opener, clock, sync_budget)?;
    session.exchange(request)
}
