//! Retry supervision
//!
//! Every exchange runs under a bounded number of attempts with a fixed
//! pause between them. After the last attempt the last error is returned
//! unchanged.
//!
//! By default device rejections are retried like transport faults. The
//! [`RetryPolicy::strict`] policy stops retrying rejections that can never
//! succeed on a resend (unknown opcode, bad arguments, malformed command).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ProtocolError, Status};
use crate::clock::Clock;

/// Default number of attempts per exchange
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default pause between attempts in milliseconds
pub const DEFAULT_BACKOFF_MS: u64 = 250;

/// Rejections that describe the request itself rather than device state
const NON_TRANSIENT_STATUSES: [Status; 5] = [
    Status::UnknownCommand,
    Status::NotImplemented,
    Status::WrongArgumentCount,
    Status::WrongArgumentValue,
    Status::MalformedCommand,
];

/// How often an exchange is attempted and how long to pause in between
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds
    pub backoff_ms: u64,
    /// Retry non-transient device rejections too
    pub retry_rejections: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
            retry_rejections: true,
        }
    }
}

impl RetryPolicy {
    /// Default budget, but non-transient rejections fail immediately
    pub fn strict() -> Self {
        Self {
            retry_rejections: false,
            ..Self::default()
        }
    }

    /// A single attempt with no retries
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Pause between attempts
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Whether another attempt could change the outcome of `error`
    pub fn is_retryable(&self, error: &ProtocolError) -> bool {
        match error {
            ProtocolError::Configuration { .. }
            | ProtocolError::ConfigError(_)
            | ProtocolError::InvalidArgument(_)
            | ProtocolError::FirmwareUpgrade(_) => false,
            ProtocolError::CommandFailed { code, .. } => {
                self.retry_rejections
                    || !Status::from_code(*code)
                        .map(|s| NON_TRANSIENT_STATUSES.contains(&s))
                        .unwrap_or(false)
            }
            _ => true,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, clock: &dyn Clock, what: &str, mut op: F) -> Result<T, ProtocolError>
    where
        F: FnMut(u32) -> Result<T, ProtocolError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(what, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < attempts && self.is_retryable(&e) => {
                    warn!(what, attempt, max_attempts = attempts, error = %e, "attempt failed, retrying");
                    clock.sleep(self.backoff());
                    attempt += 1;
                }
                Err(e) => {
                    warn!(what, attempt, error = %e, "giving up");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Clock for RecordingClock {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn utc_now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn busy() -> ProtocolError {
        ProtocolError::CommandFailed {
            code: Status::DeviceBusy.code(),
            label: Status::DeviceBusy.label(),
        }
    }

    #[test]
    fn test_succeeds_on_fifth_attempt() {
        let clock = RecordingClock::default();
        let policy = RetryPolicy::default();

        let result = policy.run(&clock, "test", |attempt| {
            if attempt < 5 {
                Err(ProtocolError::ChecksumMismatch {
                    expected: 1,
                    actual: 2,
                })
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result.unwrap(), 5);
        assert_eq!(
            *clock.sleeps.lock().unwrap(),
            vec![Duration::from_millis(250); 4]
        );
    }

    #[test]
    fn test_propagates_last_error() {
        let clock = RecordingClock::default();
        let policy = RetryPolicy::default();
        let mut calls = 0;

        let result: Result<(), _> = policy.run(&clock, "test", |attempt| {
            calls += 1;
            Err(ProtocolError::StartWordSync(format!("attempt {attempt}")))
        });

        assert_eq!(calls, 5);
        match result {
            Err(ProtocolError::StartWordSync(msg)) => assert_eq!(msg, "attempt 5"),
            other => panic!("expected sync error, got {other:?}"),
        }
    }

    #[test]
    fn test_configuration_error_not_retried() {
        let clock = RecordingClock::default();
        let mut calls = 0;

        let result: Result<(), _> = RetryPolicy::default().run(&clock, "test", |_| {
            calls += 1;
            Err(ProtocolError::Configuration {
                opcode: 2,
                api_version: 9,
            })
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
        assert!(clock.sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_default_policy_retries_rejections() {
        let policy = RetryPolicy::default();
        let rejected = ProtocolError::CommandFailed {
            code: Status::UnknownCommand.code(),
            label: Status::UnknownCommand.label(),
        };
        assert!(policy.is_retryable(&rejected));
        assert!(policy.is_retryable(&busy()));
    }

    #[test]
    fn test_strict_policy_stops_on_non_transient_rejection() {
        let policy = RetryPolicy::strict();
        let rejected = ProtocolError::CommandFailed {
            code: Status::WrongArgumentValue.code(),
            label: Status::WrongArgumentValue.label(),
        };
        assert!(!policy.is_retryable(&rejected));
        assert!(policy.is_retryable(&busy()));
        assert!(policy.is_retryable(&ProtocolError::StartWordSync(String::new())));
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let clock = RecordingClock::default();
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.run(&clock, "test", |_| Ok(7)).unwrap(), 7);
    }
}
