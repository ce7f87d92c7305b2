//! Fletcher-16 checksum
//!
//! Both running sums start at 0xFF and are folded back below 0x1FF every 20
//! bytes, so they never overflow between reductions. The packed value is
//! `sum2 << 8 | sum1`.

use super::ProtocolError;

/// Bytes folded into the sums between reductions
const BLOCK_SIZE: usize = 20;

/// Compute the Fletcher-16 checksum of `data`
pub fn fletcher16(data: &[u8]) -> u16 {
    let mut sum1: u32 = 0xFF;
    let mut sum2: u32 = 0xFF;

    for block in data.chunks(BLOCK_SIZE) {
        for &byte in block {
            sum1 += u32::from(byte);
            sum2 += sum1;
        }
        sum1 = (sum1 & 0xFF) + (sum1 >> 8);
        sum2 = (sum2 & 0xFF) + (sum2 >> 8);
    }

    sum1 = (sum1 & 0xFF) + (sum1 >> 8);
    sum2 = (sum2 & 0xFF) + (sum2 >> 8);

    ((sum2 << 8) | sum1) as u16
}

/// Recompute the checksum over received bytes and compare it to the one
/// that came with them
pub fn verify_checksum(data: &[u8], received: u16) -> Result<(), ProtocolError> {
    let expected = fletcher16(data);
    if expected != received {
        return Err(ProtocolError::ChecksumMismatch {
            expected,
            actual: received,
        });
    }
    Ok(())
}
