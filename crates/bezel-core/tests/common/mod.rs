//! Shared test doubles: a manually driven clock and an in-memory bezel
//! that decodes real request frames and answers with real response frames.

#![allow(dead_code)]

use bezel_core::clock::Clock;
use bezel_core::protocol::codec::{BodyReader, BodyWriter};
use bezel_core::protocol::{
    ChannelOpener, CommunicationChannel, Frame, Header, Opcode, ProtocolError, HEADER_SIZE,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Route library logs to the test harness; filter with RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Clock that only moves when told to (or when something sleeps on it)
pub struct FakeClock {
    base: Instant,
    wall_base: DateTime<Utc>,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::starting_at(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
    }

    pub fn starting_at(wall_base: DateTime<Utc>) -> Self {
        Self {
            base: Instant::now(),
            wall_base,
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock().unwrap() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.wall_base + chrono::Duration::from_std(self.elapsed()).unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

/// Misbehaviour applied to the next exchange
#[derive(Debug, Clone)]
pub enum Fault {
    /// Answer normally, so a later exchange gets the next fault
    Pass,
    /// Opening the device fails
    OpenFails,
    /// Bytes sent ahead of the response
    Garbage(Vec<u8>),
    /// Last checksum byte flipped
    CorruptChecksum,
    /// Respond with this status and an empty body
    Status(u16),
    /// No response at all
    Silent,
    /// Response carries a different opcode
    WrongOpcode,
}

/// What the simulated device knows and has seen
pub struct DeviceState {
    pub api_version: u16,
    pub device_name: String,
    pub firmware: u32,
    pub bootloader: u32,
    pub hardware_revision: u16,
    pub serial: [u16; 3],
    pub model: String,
    pub manufactured_at: u32,
    pub time_ms: u64,
    pub pattern: u16,
    pub pattern_started_ms: u64,
    pub in_bootloader: bool,

    pub write_latency: Duration,
    pub read_latency: Duration,

    /// Left in the input and output buffers of every newly opened channel
    pub stale_input: Vec<u8>,
    pub stale_output: Vec<u8>,

    pub faults: VecDeque<Fault>,
    /// Reject every request with this opcode using this status
    pub reject: Option<(u16, u16)>,
    pub requests: Vec<Frame>,
    pub opens: usize,
    pub closes: usize,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            api_version: 1,
            device_name: "bezel".to_string(),
            firmware: 0x0000_0301,
            bootloader: 0x0000_0001,
            hardware_revision: 2,
            serial: [0x0012, 0x3456, 0x789A],
            model: "BZ-100".to_string(),
            manufactured_at: 1_650_000_000,
            time_ms: 0,
            pattern: 0,
            pattern_started_ms: 0,
            in_bootloader: false,
            write_latency: Duration::ZERO,
            read_latency: Duration::ZERO,
            stale_input: Vec::new(),
            stale_output: Vec::new(),
            faults: VecDeque::new(),
            reject: None,
            requests: Vec::new(),
            opens: 0,
            closes: 0,
        }
    }
}

impl DeviceState {
    fn respond(&mut self, request: &Frame) -> Option<Vec<u8>> {
        self.requests.push(request.clone());
        let fault = self.faults.pop_front();

        let (status, body) = match &fault {
            Some(Fault::Silent) => return None,
            Some(Fault::Status(code)) => (*code, Vec::new()),
            _ => match self.reject {
                Some((opcode, status)) if opcode == request.header.command => (status, Vec::new()),
                _ => self.handle(request),
            },
        };

        let command = match fault {
            Some(Fault::WrongOpcode) => request.header.command.wrapping_add(1),
            _ => request.header.command,
        };
        let frame = Frame {
            header: Header {
                api_version: request.header.api_version,
                command,
                status,
                reserved1: 0,
                reserved2: 0,
                reserved3: 0,
                len: body.len() as u16,
            },
            body,
        };

        let mut bytes = frame.to_bytes();
        match fault {
            Some(Fault::Garbage(prefix)) => {
                let mut out = prefix;
                out.extend_from_slice(&bytes);
                bytes = out;
            }
            Some(Fault::CorruptChecksum) => {
                let last = bytes.len() - 1;
                bytes[last] ^= 0xFF;
            }
            _ => {}
        }
        Some(bytes)
    }

    fn handle(&mut self, request: &Frame) -> (u16, Vec<u8>) {
        let api = request.header.api_version;
        let mut r = BodyReader::new(&request.body);
        let code = request.header.command;

        if code == Opcode::Identify.code() {
            let body = BodyWriter::new()
                .u16(self.api_version)
                .fixed_str(&self.device_name, 16)
                .finish();
            (0, body)
        } else if code == Opcode::VersionInfo.code() {
            let body = BodyWriter::new()
                .u32(self.firmware)
                .u32(self.bootloader)
                .u16(self.hardware_revision)
                .finish();
            (0, body)
        } else if code == Opcode::DisplayPatternAtTime.code() {
            self.pattern = r.u16().unwrap();
            self.pattern_started_ms = r.u64().unwrap();
            (0, Vec::new())
        } else if code == Opcode::DisplayPatternWithDelay.code() {
            self.pattern = r.u16().unwrap();
            (0, Vec::new())
        } else if code == Opcode::GetTime.code() {
            (0, BodyWriter::new().u64(self.time_ms).finish())
        } else if code == Opcode::SetTime.code() {
            self.time_ms = r.u64().unwrap();
            (0, Vec::new())
        } else if code == Opcode::ReadManufacturingInfo.code() {
            let mut w = BodyWriter::new()
                .u16(self.serial[0])
                .u16(self.serial[1])
                .u16(self.serial[2])
                .u16(self.hardware_revision)
                .fixed_str(&self.model, 16);
            if api >= 1 {
                w = w.u32(self.manufactured_at);
            }
            (0, w.finish())
        } else if code == Opcode::GetCurrentPattern.code() {
            let mut w = BodyWriter::new().u16(self.pattern);
            if api >= 1 {
                w = w.u64(self.pattern_started_ms);
            }
            (0, w.finish())
        } else if code == Opcode::EnterDfuBootloader.code() {
            self.in_bootloader = true;
            (0, Vec::new())
        } else {
            (1, Vec::new())
        }
    }
}

/// In-memory bezel; clones share the same device
#[derive(Clone)]
pub struct MockBezel {
    pub state: Arc<Mutex<DeviceState>>,
    pub clock: Arc<FakeClock>,
}

impl MockBezel {
    pub fn new(clock: Arc<FakeClock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState::default())),
            clock,
        }
    }

    pub fn with_state(self, f: impl FnOnce(&mut DeviceState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn push_fault(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push_back(fault);
    }

    pub fn requests(&self) -> Vec<Frame> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn state<T>(&self, f: impl FnOnce(&DeviceState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }
}

impl ChannelOpener for MockBezel {
    fn open(&self) -> Result<Box<dyn CommunicationChannel>, ProtocolError> {
        let mut state = self.state.lock().unwrap();
        if matches!(state.faults.front(), Some(Fault::OpenFails)) {
            state.faults.pop_front();
            return Err(ProtocolError::SerialError("mock open failed".to_string()));
        }
        state.opens += 1;
        Ok(Box::new(MockChannel {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
            tx: state.stale_output.clone(),
            rx: state.stale_input.iter().copied().collect(),
            awaiting_response: false,
        }))
    }

    fn describe(&self) -> String {
        "mock-bezel".to_string()
    }
}

pub struct MockChannel {
    state: Arc<Mutex<DeviceState>>,
    clock: Arc<FakeClock>,
    tx: Vec<u8>,
    rx: VecDeque<u8>,
    awaiting_response: bool,
}

impl MockChannel {
    fn process_tx(&mut self) {
        loop {
            if self.tx.len() < 2 + HEADER_SIZE {
                return;
            }
            let len = u16::from_le_bytes([self.tx[14], self.tx[15]]) as usize;
            let total = 2 + HEADER_SIZE + len + 2;
            if self.tx.len() < total {
                return;
            }
            let raw: Vec<u8> = self.tx.drain(..total).collect();
            let request = Frame::from_bytes(&raw).expect("host sent a malformed frame");
            if let Some(response) = self.state.lock().unwrap().respond(&request) {
                self.rx.extend(response);
            }
            self.awaiting_response = true;
        }
    }
}

impl Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.awaiting_response {
            self.awaiting_response = false;
            let latency = self.state.lock().unwrap().read_latency;
            self.clock.advance(latency);
        }
        if self.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timed out"));
        }
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let latency = self.state.lock().unwrap().write_latency;
        self.clock.advance(latency);
        self.tx.extend_from_slice(buf);
        self.process_tx();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for MockChannel {
    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.rx.clear();
        Ok(())
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        self.tx.clear();
        Ok(())
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.state.lock().unwrap().closes += 1;
    }
}
