//! Bounded retry with exponential backoff for remote calls.

use crate::error::RemoteError;
use log::info;
use rand::Rng;
use std::time::Duration;

/// How often and how patiently a transient failure is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomise each delay within `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with no sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Upper bound of the delay before retry number `attempt` (1-based).
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let millis = ceiling.as_millis() as u64;
        let low = millis / 2;
        Duration::from_millis(rand::thread_rng().gen_range(low..=millis))
    }

    /// Wait before retry number `attempt` after `error`: the backoff, or the
    /// server's `Retry-After` when that is longer.
    pub fn delay_after(&self, attempt: u32, error: &RemoteError) -> Duration {
        let backoff = self.backoff_delay(attempt);
        match error.retry_after() {
            Some(requested) => backoff.max(requested),
            None => backoff,
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. The last error is returned in the latter two cases.
    pub fn run<T, F>(&self, label: &str, mut operation: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Result<T, RemoteError>,
    {
        let mut attempt = 1u32;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    let backoff = self.delay_after(attempt, &error);
                    info!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        label, attempt, self.max_attempts, error, backoff
                    );
                    if !backoff.is_zero() {
                        std::thread::sleep(backoff);
                    }
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter: false,
        };
        assert_eq!(policy.backoff_ceiling(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_ceiling(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_ceiling(40), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
            jitter: true,
        };
        for _ in 0..50 {
            let delay = policy.backoff_delay(2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_retries_timeouts_until_success() {
        let mut calls = 0;
        let result = RetryPolicy::immediate(5).run("search", || {
            calls += 1;
            if calls < 3 {
                Err(RemoteError::Timeout("slow".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(4).run("search", || {
            calls += 1;
            Err(RemoteError::Timeout("slow".into()))
        });
        assert!(matches!(result, Err(RemoteError::Timeout(_))));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_rate_limit_waits_at_least_retry_after() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: false,
        };
        let limited = |secs| RemoteError::RateLimited {
            url: "https://api.test/search".into(),
            retry_after: Some(Duration::from_secs(secs)),
        };
        // longer than the backoff cap
        assert_eq!(policy.delay_after(1, &limited(30)), Duration::from_secs(30));
        // shorter than the backoff: backoff wins
        assert_eq!(policy.delay_after(4, &limited(1)), Duration::from_secs(4));

        let no_header = RemoteError::RateLimited {
            url: "https://api.test/search".into(),
            retry_after: None,
        };
        assert_eq!(policy.delay_after(2, &no_header), Duration::from_secs(1));
        assert_eq!(
            RetryPolicy::immediate(3).delay_after(1, &limited(2)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_rate_limited_call_is_retried() {
        let mut calls = 0;
        let result = RetryPolicy::immediate(3).run("search", || {
            calls += 1;
            if calls == 1 {
                Err(RemoteError::RateLimited {
                    url: "https://api.test/search".into(),
                    retry_after: Some(Duration::ZERO),
                })
            } else {
                Ok("payload")
            }
        });
        assert_eq!(result, Ok("payload"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(4).run("search", || {
            calls += 1;
            Err(RemoteError::Status(401, "unauthorized".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
