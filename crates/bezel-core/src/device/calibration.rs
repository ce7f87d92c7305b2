//! Clock offset estimation
//!
//! "Set the time to now" has to account for the time the frame spends in
//! flight, otherwise the device clock lands behind the host by the link
//! latency. The estimator times repeated IDENTIFY round trips, each on a
//! freshly opened device, and averages the write and read legs separately.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::protocol::{ChannelOpener, Frame, Opcode, ProtocolError, RetryPolicy, Session, Status};

/// Averaged link latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockOffset {
    /// Mean time to write a request frame
    pub write: Duration,
    /// Mean time from end of write until the response is read
    pub read: Duration,
}

impl ClockOffset {
    /// Write and read legs combined
    pub fn total(&self) -> Duration {
        self.write + self.read
    }
}

/// Times identify round trips to measure link latency
pub struct ClockOffsetEstimator<'a> {
    opener: &'a dyn ChannelOpener,
    clock: &'a dyn Clock,
    retry: &'a RetryPolicy,
    sync_budget: Duration,
    iterations: u32,
}

impl<'a> ClockOffsetEstimator<'a> {
    /// Estimator running `iterations` probes (at least one), each retried
    /// under `retry`
    pub fn new(
        opener: &'a dyn ChannelOpener,
        clock: &'a dyn Clock,
        retry: &'a RetryPolicy,
        sync_budget: Duration,
        iterations: u32,
    ) -> Self {
        Self {
            opener,
            clock,
            retry,
            sync_budget,
            iterations: iterations.max(1),
        }
    }

    /// Time one identify round trip, returning (write, read) durations
    fn probe(&self, request: &Frame) -> Result<(Duration, Duration), ProtocolError> {
        let mut session = Session::open(self.opener, self.clock, self.sync_budget)?;

        let t1 = self.clock.now();
        session.write_frame(request)?;
        let t2 = self.clock.now();
        let response = session.read_frame()?;
        let t3 = self.clock.now();
        drop(session);

        Status::check(response.header.status)?;
        Ok((t2.duration_since(t1), t3.duration_since(t2)))
    }

    /// Run every probe and average the write and read legs
    ///
    /// A probe that still fails after its retries fails the whole estimate.
    pub fn estimate(&self) -> Result<ClockOffset, ProtocolError> {
        let request = Frame::request(0, Opcode::Identify, Vec::new());
        let mut write_total = Duration::ZERO;
        let mut read_total = Duration::ZERO;

        for iteration in 0..self.iterations {
            let (write, read) = self
                .retry
                .run(self.clock, "clock offset probe", |_| self.probe(&request))?;
            debug!(iteration, ?write, ?read, "latency probe");
            write_total += write;
            read_total += read;
        }

        let offset = ClockOffset {
            write: write_total / self.iterations,
            read: read_total / self.iterations,
        };
        info!(
            iterations = self.iterations,
            write_ms = offset.write.as_secs_f64() * 1000.0,
            read_ms = offset.read.as_secs_f64() * 1000.0,
            total_ms = offset.total().as_secs_f64() * 1000.0,
            "clock offset estimated"
        );
        Ok(offset)
    }
}
