//! Command dispatcher
//!
//! [`Bezel`] exposes one method per device operation. Each call:
//! 1. asks the device for its api version (version-sensitive opcodes only),
//! 2. resolves the codec pair for (opcode, api version),
//! 3. builds the request body for that pair,
//! 4. runs open / exchange / close under the retry policy,
//! 5. maps a non-OK status to [`ProtocolError::CommandFailed`],
//! 6. decodes the typed result.
//!
//! No device handle is kept between calls.

pub mod calibration;
pub mod messages;
pub mod types;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, Span};

use crate::clock::{Clock, SystemClock};
use crate::config::BezelConfig;
use crate::firmware::PACKAGED_FIRMWARE_VERSION;
use crate::protocol::session::exchange_once;
use crate::protocol::{ChannelOpener, CodecPair, Frame, Opcode, ProtocolError, SerialOpener, Status};

pub use calibration::{ClockOffset, ClockOffsetEstimator};
pub use types::{
    convert_version_to_string, CurrentPattern, IdentifyInfo, ManufacturingInfo, Pattern,
    SerialNumber, VersionInfo,
};

/// Handle on one bezel
pub struct Bezel {
    config: BezelConfig,
    opener: Box<dyn ChannelOpener>,
    clock: Arc<dyn Clock>,
    span: Span,
    clock_offset: Option<ClockOffset>,
}

impl Bezel {
    /// Bezel on the serial device named in `config`; nothing is opened yet
    pub fn new(config: BezelConfig) -> Self {
        let opener = SerialOpener::new(
            config.device_path.clone(),
            config.baud_rate,
            config.read_timeout(),
        );
        Self::with_parts(config, Box::new(opener), Arc::new(SystemClock))
    }

    /// Bezel over an arbitrary link and clock
    pub fn with_parts(config: BezelConfig, opener: Box<dyn ChannelOpener>, clock: Arc<dyn Clock>) -> Self {
        let span = info_span!("bezel", device = %opener.describe());
        Self {
            config,
            opener,
            clock,
            span,
            clock_offset: None,
        }
    }

    /// Replace the span every operation is logged under
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Settings this bezel was created with
    pub fn config(&self) -> &BezelConfig {
        &self.config
    }

    /// Time source shared with every exchange
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Span every operation is logged under
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Last clock offset measured by [`Bezel::calibrate_clock_offset`]
    pub fn clock_offset(&self) -> Option<ClockOffset> {
        self.clock_offset
    }

    /// Use a previously measured offset instead of calibrating
    pub fn set_clock_offset(&mut self, offset: ClockOffset) {
        self.clock_offset = Some(offset);
    }

    /// Codec pair for `opcode` at the api version the device reports now
    fn resolve(&self, opcode: Opcode) -> Result<CodecPair, ProtocolError> {
        let api_version = if opcode.is_version_sensitive() {
            self.identify()?.api_version
        } else {
            0
        };
        CodecPair::resolve(opcode, api_version)
    }

    /// Send `body` under `pair` and return the response body
    fn execute(&self, pair: &CodecPair, body: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        self.execute_with(pair, || Ok(body.clone()))
    }

    /// Like [`Bezel::execute`], with the body rebuilt for every attempt
    fn execute_with<F>(&self, pair: &CodecPair, mut build: F) -> Result<Vec<u8>, ProtocolError>
    where
        F: FnMut() -> Result<Vec<u8>, ProtocolError>,
    {
        let what = format!("{:?}", pair.opcode);

        let response = self.config.retry.run(self.clock(), &what, |attempt| {
            let body = build()?;
            debug_assert_eq!(body.len(), pair.request_len, "{pair:?}");
            let request = Frame::request(pair.api_version, pair.opcode, body);

            debug!(opcode = ?pair.opcode, api_version = pair.api_version, attempt, "sending");
            let response = exchange_once(
                self.opener.as_ref(),
                self.clock(),
                self.config.sync_timeout(),
                &request,
            )?;
            Status::check(response.header.status)?;
            Ok(response)
        })?;
        Ok(response.body)
    }

    fn call(&self, opcode: Opcode) -> Result<(CodecPair, Vec<u8>), ProtocolError> {
        let pair = self.resolve(opcode)?;
        let body = self.execute(&pair, Vec::new())?;
        Ok((pair, body))
    }

    /// Ask the device who it is and which api version it speaks
    pub fn identify(&self) -> Result<IdentifyInfo, ProtocolError> {
        let _guard = self.span.enter();
        let (pair, body) = self.call(Opcode::Identify)?;
        messages::decode_identify(&pair, &body)
    }

    /// Firmware, bootloader and hardware revisions
    pub fn read_version_info(&self) -> Result<VersionInfo, ProtocolError> {
        let _guard = self.span.enter();
        let (pair, body) = self.call(Opcode::VersionInfo)?;
        messages::decode_version_info(&pair, &body)
    }

    /// Current device time
    pub fn get_time(&self) -> Result<DateTime<Utc>, ProtocolError> {
        let _guard = self.span.enter();
        let (pair, body) = self.call(Opcode::GetTime)?;
        messages::decode_time(&pair, &body)
    }

    /// Set the device clock and return the value sent
    ///
    /// With `None` the device is set to "now" plus the measured link latency,
    /// rounded to whole milliseconds; the latency is measured on first use.
    /// "Now" is taken right before each attempt is written.
    pub fn set_time(&mut self, time: Option<DateTime<Utc>>) -> Result<DateTime<Utc>, ProtocolError> {
        let offset = match (time, self.clock_offset) {
            (Some(_), _) => ClockOffset::default(),
            (None, Some(offset)) => offset,
            (None, None) => self.calibrate_clock_offset()?,
        };

        let _guard = self.span.enter();
        let pair = self.resolve(Opcode::SetTime)?;

        let mut sent = None;
        self.execute_with(&pair, || {
            let target = time.unwrap_or_else(|| compensated_now(self.clock(), offset));
            sent = Some(target);
            messages::encode_set_time(target)
        })?;

        let target = sent.unwrap_or_else(|| self.clock.utc_now());
        info!(time = %target, "device time set");
        Ok(target)
    }

    /// Measure link latency and keep it for [`Bezel::set_time`]
    pub fn calibrate_clock_offset(&mut self) -> Result<ClockOffset, ProtocolError> {
        let offset = {
            let _guard = self.span.enter();
            ClockOffsetEstimator::new(
                self.opener.as_ref(),
                self.clock.as_ref(),
                &self.config.retry,
                self.config.sync_timeout(),
                self.config.calibration_iterations,
            )
            .estimate()?
        };
        self.clock_offset = Some(offset);
        Ok(offset)
    }

    /// Serial number, model and hardware revision burned in at manufacture
    pub fn read_manufacturing_info(&self) -> Result<ManufacturingInfo, ProtocolError> {
        let _guard = self.span.enter();
        let (pair, body) = self.call(Opcode::ReadManufacturingInfo)?;
        messages::decode_manufacturing_info(&pair, &body)
    }

    /// Show `pattern` starting at `start`
    ///
    /// `beginning` restarts the pattern from its first frame instead of
    /// joining it mid-cycle. The pattern runs until replaced.
    pub fn display_pattern_at_time(
        &self,
        pattern: Pattern,
        start: DateTime<Utc>,
        beginning: bool,
    ) -> Result<(), ProtocolError> {
        self.display_pattern_for(pattern, start, beginning, None)
    }

    /// Like [`Bezel::display_pattern_at_time`] with a run time; devices on
    /// api version 0 have no run time field and ignore `duration`
    pub fn display_pattern_for(
        &self,
        pattern: Pattern,
        start: DateTime<Utc>,
        beginning: bool,
        duration: Option<Duration>,
    ) -> Result<(), ProtocolError> {
        let _guard = self.span.enter();
        let pair = self.resolve(Opcode::DisplayPatternAtTime)?;
        if duration.is_some() && pair.api_version == 0 {
            debug!("device api version 0 has no pattern duration, ignoring it");
        }
        let body = messages::encode_display_at_time(&pair, pattern, start, beginning, duration)?;
        self.execute(&pair, body)?;
        info!(%pattern, %start, beginning, "pattern scheduled");
        Ok(())
    }

    /// Show `pattern` once `delay` has passed on the device
    pub fn display_pattern_with_delay(&self, pattern: Pattern, delay: Duration) -> Result<(), ProtocolError> {
        let _guard = self.span.enter();
        let pair = self.resolve(Opcode::DisplayPatternWithDelay)?;
        self.execute(&pair, messages::encode_display_with_delay(pattern, delay)?)?;
        info!(%pattern, ?delay, "pattern scheduled");
        Ok(())
    }

    /// Pattern the device is showing now
    pub fn get_current_pattern(&self) -> Result<CurrentPattern, ProtocolError> {
        let _guard = self.span.enter();
        let (pair, body) = self.call(Opcode::GetCurrentPattern)?;
        messages::decode_current_pattern(&pair, &body)
    }

    /// Reboot into the DFU bootloader; the device drops off the serial bus
    pub fn enter_dfu_bootloader(&self) -> Result<(), ProtocolError> {
        let _guard = self.span.enter();
        self.call(Opcode::EnterDfuBootloader)?;
        info!("device entering DFU bootloader");
        Ok(())
    }

    /// Whether the running firmware differs from the packaged image
    pub fn firmware_upgrade_available(&self) -> Result<bool, ProtocolError> {
        let running = self.read_version_info()?.firmware_string();
        Ok(running != PACKAGED_FIRMWARE_VERSION)
    }
}

/// "Now" on `clock` pushed forward by the link latency, rounded to whole
/// milliseconds
pub fn compensated_now(clock: &dyn Clock, offset: ClockOffset) -> DateTime<Utc> {
    let total = offset.total();
    let shifted = clock.utc_now()
        + ChronoDuration::from_std(total).unwrap_or_else(|_| ChronoDuration::zero());
    let micros = shifted.timestamp_micros();
    let millis = (micros + 500).div_euclid(1000);
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(shifted)
}
