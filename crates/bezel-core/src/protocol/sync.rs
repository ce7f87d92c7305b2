//! Start word synchronization
//!
//! A response is only parsed once two consecutive sentinel bytes have been
//! seen. Anything before them (leftovers from an earlier exchange that was
//! cut short, line noise) is discarded.

use std::io::{ErrorKind, Read};
use std::time::Duration;

use tracing::{debug, trace};

use super::{ProtocolError, START_BYTE};
use crate::clock::Clock;

/// Scanner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Waiting for the start word; `count` sentinel bytes seen in a row
    Scanning {
        /// Consecutive start bytes
        count: u8,
    },
    /// Both start bytes seen; the header follows
    Synced,
}

/// Byte-at-a-time start word detector
#[derive(Debug, Clone, Copy)]
pub struct StartWordScanner {
    state: SyncState,
}

impl StartWordScanner {
    /// Scanner with no start bytes seen
    pub fn new() -> Self {
        Self {
            state: SyncState::Scanning { count: 0 },
        }
    }

    /// Current state
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Feed one byte and return the new state
    pub fn feed(&mut self, byte: u8) -> SyncState {
        self.state = match self.state {
            SyncState::Synced => SyncState::Synced,
            SyncState::Scanning { count } if byte == START_BYTE => {
                if count + 1 >= 2 {
                    SyncState::Synced
                } else {
                    SyncState::Scanning { count: count + 1 }
                }
            }
            SyncState::Scanning { .. } => SyncState::Scanning { count: 0 },
        };
        self.state
    }
}

impl Default for StartWordScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Read from `reader` until the start word has been consumed
///
/// Returns the number of bytes discarded before the start word. Fails with
/// [`ProtocolError::StartWordSync`] once `budget` has elapsed on `clock` or
/// on any read failure, so a silent or babbling link never blocks forever.
pub fn synchronize<R: Read + ?Sized>(
    reader: &mut R,
    clock: &dyn Clock,
    budget: Duration,
) -> Result<usize, ProtocolError> {
    let start = clock.now();
    let mut scanner = StartWordScanner::new();
    let mut seen = 0usize;
    let mut byte = [0u8; 1];

    loop {
        if clock.now().duration_since(start) > budget {
            return Err(ProtocolError::StartWordSync(format!(
                "no start word within {}ms ({} bytes scanned)",
                budget.as_millis(),
                seen
            )));
        }

        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(ProtocolError::StartWordSync(
                    "link closed while scanning".to_string(),
                ))
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(ProtocolError::StartWordSync(format!(
                    "read failed while scanning: {e}"
                )))
            }
        }
        seen += 1;
        trace!(byte = byte[0], "sync byte");

        if scanner.feed(byte[0]) == SyncState::Synced {
            let discarded = seen - 2;
            if discarded > 0 {
                debug!(discarded, "discarded bytes before start word");
            }
            return Ok(discarded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::io::{self, Cursor};
    use std::sync::Mutex;
    use std::time::Instant;

    /// Clock that advances a fixed step on every `now()` call
    struct SteppingClock {
        base: Instant,
        elapsed: Mutex<Duration>,
        step: Duration,
    }

    impl SteppingClock {
        fn new(step: Duration) -> Self {
            Self {
                base: Instant::now(),
                elapsed: Mutex::new(Duration::ZERO),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> Instant {
            let mut elapsed = self.elapsed.lock().unwrap();
            *elapsed += self.step;
            self.base + *elapsed
        }

        fn utc_now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        fn sleep(&self, duration: Duration) {
            *self.elapsed.lock().unwrap() += duration;
        }
    }

    /// Endless stream of one repeated byte
    struct Repeat(u8);

    impl Read for Repeat {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            buf.fill(self.0);
            Ok(buf.len())
        }
    }

    #[test]
    fn test_scanner_discards_lone_sentinel() {
        let mut scanner = StartWordScanner::new();
        let input = [0x01, 0xAA, 0x02, 0xAA, 0xAA];
        let states: Vec<SyncState> = input.iter().map(|&b| scanner.feed(b)).collect();

        assert_eq!(
            states,
            vec![
                SyncState::Scanning { count: 0 },
                SyncState::Scanning { count: 1 },
                SyncState::Scanning { count: 0 },
                SyncState::Scanning { count: 1 },
                SyncState::Synced,
            ]
        );
    }

    #[test]
    fn test_synchronize_leaves_frame_bytes_unread() {
        let clock = SteppingClock::new(Duration::from_millis(1));
        let mut cursor = Cursor::new(vec![0x01, 0xAA, 0x02, 0xAA, 0xAA, 0x10, 0x20]);

        let discarded = synchronize(&mut cursor, &clock, Duration::from_secs(5)).unwrap();

        assert_eq!(discarded, 3);
        assert_eq!(cursor.position(), 5);
    }

    #[test]
    fn test_synchronize_times_out_on_garbage() {
        let clock = SteppingClock::new(Duration::from_millis(100));
        let mut garbage = Repeat(0x55);

        let result = synchronize(&mut garbage, &clock, Duration::from_secs(5));
        assert!(matches!(result, Err(ProtocolError::StartWordSync(_))));
    }

    #[test]
    fn test_alternating_sentinel_never_syncs() {
        let clock = SteppingClock::new(Duration::from_millis(50));
        let mut cursor = Cursor::new([0xAA, 0x00].repeat(10_000));

        let result = synchronize(&mut cursor, &clock, Duration::from_secs(5));
        assert!(matches!(result, Err(ProtocolError::StartWordSync(_))));
    }

    #[test]
    fn test_read_failure_is_sync_error() {
        let clock = SteppingClock::new(Duration::from_millis(1));
        let mut empty = Cursor::new(Vec::<u8>::new());

        let result = synchronize(&mut empty, &clock, Duration::from_secs(5));
        assert!(matches!(result, Err(ProtocolError::StartWordSync(_))));
    }
}
