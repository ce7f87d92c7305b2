//! Request and response bodies per codec pair
//!
//! Encoders produce exactly `pair.request_len` bytes; decoders require at
//! least `pair.response_len` bytes and read the fields that exist at
//! `pair.api_version`.

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

use super::types::{
    CurrentPattern, IdentifyInfo, ManufacturingInfo, Pattern, SerialNumber, VersionInfo,
};
use crate::protocol::codec::{BodyReader, BodyWriter};
use crate::protocol::{CodecPair, ProtocolError};

/// Length of fixed string fields
pub const NAME_FIELD_LEN: usize = 16;

fn reader<'a>(pair: &CodecPair, body: &'a [u8]) -> Result<BodyReader<'a>, ProtocolError> {
    if body.len() < pair.response_len {
        return Err(ProtocolError::MalformedFrame(format!(
            "{:?} v{} response needs {} bytes, got {}",
            pair.opcode,
            pair.api_version,
            pair.response_len,
            body.len()
        )));
    }
    Ok(BodyReader::new(body))
}

/// Milliseconds since the Unix epoch as sent on the wire
pub fn to_wire_millis(time: DateTime<Utc>) -> Result<u64, ProtocolError> {
    u64::try_from(time.timestamp_millis())
        .map_err(|_| ProtocolError::InvalidArgument(format!("{time} is before the Unix epoch")))
}

/// Inverse of [`to_wire_millis`]
pub fn from_wire_millis(millis: u64) -> Result<DateTime<Utc>, ProtocolError> {
    i64::try_from(millis)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| ProtocolError::MalformedFrame(format!("timestamp {millis}ms out of range")))
}

fn duration_millis_u32(duration: Duration) -> Result<u32, ProtocolError> {
    u32::try_from(duration.as_millis())
        .map_err(|_| ProtocolError::InvalidArgument(format!("{duration:?} does not fit in 32-bit milliseconds")))
}

/// IDENTIFY response: api version and device name
pub fn decode_identify(pair: &CodecPair, body: &[u8]) -> Result<IdentifyInfo, ProtocolError> {
    let mut r = reader(pair, body)?;
    Ok(IdentifyInfo {
        api_version: r.u16()?,
        device_name: r.fixed_str(NAME_FIELD_LEN)?,
    })
}

/// VERSION_INFO response: firmware, bootloader and hardware revisions
pub fn decode_version_info(pair: &CodecPair, body: &[u8]) -> Result<VersionInfo, ProtocolError> {
    let mut r = reader(pair, body)?;
    Ok(VersionInfo {
        firmware: r.u32()?,
        bootloader: r.u32()?,
        hardware_revision: r.u16()?,
    })
}

/// GET_TIME response
pub fn decode_time(pair: &CodecPair, body: &[u8]) -> Result<DateTime<Utc>, ProtocolError> {
    let mut r = reader(pair, body)?;
    from_wire_millis(r.u64()?)
}

/// SET_TIME request; fails for times before the epoch
pub fn encode_set_time(time: DateTime<Utc>) -> Result<Vec<u8>, ProtocolError> {
    Ok(BodyWriter::new().u64(to_wire_millis(time)?).finish())
}

/// READ_MANUFACTURING_INFO response; the manufacture date arrives from
/// api version 1 on
pub fn decode_manufacturing_info(
    pair: &CodecPair,
    body: &[u8],
) -> Result<ManufacturingInfo, ProtocolError> {
    let mut r = reader(pair, body)?;
    let serial_number = SerialNumber([r.u16()?, r.u16()?, r.u16()?]);
    let hardware_revision = r.u16()?;
    let model = r.fixed_str(NAME_FIELD_LEN)?;
    let manufactured_at = if pair.api_version >= 1 {
        let secs = r.u32()?;
        Some(
            Utc.timestamp_opt(i64::from(secs), 0)
                .single()
                .ok_or_else(|| ProtocolError::MalformedFrame(format!("bad manufacture date {secs}")))?,
        )
    } else {
        None
    };
    Ok(ManufacturingInfo {
        serial_number,
        hardware_revision,
        model,
        manufactured_at,
    })
}

/// Body of DISPLAY_PATTERN_AT_TIME
///
/// `duration` is only carried from api version 1; `None` (or zero) means
/// the pattern runs until another one replaces it.
pub fn encode_display_at_time(
    pair: &CodecPair,
    pattern: Pattern,
    start: DateTime<Utc>,
    beginning: bool,
    duration: Option<Duration>,
) -> Result<Vec<u8>, ProtocolError> {
    let mut w = BodyWriter::new()
        .u16(pattern.code())
        .u64(to_wire_millis(start)?)
        .flag(beginning);
    if pair.api_version >= 1 {
        w = w.u32(duration.map(duration_millis_u32).transpose()?.unwrap_or(0));
    }
    Ok(w.finish())
}

/// Body of DISPLAY_PATTERN_WITH_DELAY
pub fn encode_display_with_delay(pattern: Pattern, delay: Duration) -> Result<Vec<u8>, ProtocolError> {
    Ok(BodyWriter::new()
        .u16(pattern.code())
        .u32(duration_millis_u32(delay)?)
        .finish())
}

/// GET_CURRENT_PATTERN response; the start time arrives from api version 1 on
pub fn decode_current_pattern(pair: &CodecPair, body: &[u8]) -> Result<CurrentPattern, ProtocolError> {
    let mut r = reader(pair, body)?;
    let code = r.u16()?;
    let started_at = if pair.api_version >= 1 {
        Some(from_wire_millis(r.u64()?)?)
    } else {
        None
    };
    Ok(CurrentPattern { code, started_at })
}
