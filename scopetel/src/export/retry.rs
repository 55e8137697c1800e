//! Bounded retries with exponential backoff and jitter.
//!
//! A batch is attempted up to [`RetryPolicy::max_attempts`] times. Between
//! attempts the worker sleeps for the current backoff plus a random jitter,
//! capped at [`RetryPolicy::max_backoff`], and then doubles the backoff.
use crate::export::ExportResult;
use crate::tel_debug;
use rand::Rng;
use std::cmp::min;
use std::thread;
use std::time::Duration;

/// Configuration for retry policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts per batch, including the first one.
    pub max_attempts: usize,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any delay between attempts.
    pub max_backoff: Duration,
    /// Maximum random jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

fn generate_jitter(max_jitter: Duration) -> Duration {
    let max_ms = max_jitter.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

/// Runs `operation` until it succeeds or the policy's attempts are used up,
/// returning the last error in the latter case.
///
/// Blocks the calling thread while backing off; only export workers call it.
pub(crate) fn export_with_retry<F>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> ExportResult
where
    F: FnMut() -> ExportResult,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    let mut delay = policy.initial_backoff;

    loop {
        match operation() {
            Ok(()) => return Ok(()),
            Err(err) if attempt < max_attempts => {
                tel_debug!(
                    name: "Export.Retrying",
                    operation = operation_name,
                    attempt = attempt,
                    error = format!("{}", err)
                );
                let delay_with_jitter = min(delay + generate_jitter(policy.jitter), policy.max_backoff);
                thread::sleep(delay_with_jitter);
                delay = min(delay * 2, policy.max_backoff);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportError;
    use std::time::Instant;

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn succeeds_immediately() {
        let mut calls = 0;
        let result = export_with_retry(&fast_policy(3), "test", || {
            calls += 1;
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retries_until_success() {
        let mut calls = 0;
        let result = export_with_retry(&fast_policy(3), "test", || {
            calls += 1;
            if calls < 3 {
                Err(ExportError::Transport("connection refused".into()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let result = export_with_retry(&fast_policy(3), "test", || {
            calls += 1;
            Err(ExportError::HttpStatus(503))
        });
        assert_eq!(result, Err(ExportError::HttpStatus(503)));
        assert_eq!(calls, 3);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut calls = 0;
        let _ = export_with_retry(&fast_policy(0), "test", || {
            calls += 1;
            Err(ExportError::Other("nope".into()))
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(15),
            jitter: Duration::from_millis(100),
        };
        let start = Instant::now();
        let _ = export_with_retry(&policy, "test", || Err(ExportError::Other("x".into())));
        // three sleeps, each at most max_backoff
        assert!(start.elapsed() < Duration::from_millis(15 * 3 + 200));
    }

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..100 {
            assert!(generate_jitter(Duration::from_millis(5)) <= Duration::from_millis(5));
        }
        assert_eq!(generate_jitter(Duration::ZERO), Duration::ZERO);
    }
}
