//! Exponential backoff for transient transfer failures.
//!
//! Errors flagged as permanent (missing files, denied access) fail right
//! away; anything else is retried until the attempts run out.
use std::future::Future;
use std::time::Duration;

use crate::types::UtilResult;

/// Simple exponential backoff policy with caps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Computes the delay to wait after the given (1-based) failed attempt.
    ///
    /// Returns `None` once all attempts have been used up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        // base * 2^(attempt-1), capped
        let exp = 1u32 << attempt.saturating_sub(1).min(8);
        Some(self.base_delay.saturating_mul(exp).min(self.max_delay))
    }

    /// Runs an operation until it succeeds or attempts are exhausted.
    ///
    /// The final error is passed back to the caller untouched, as is the
    /// first permanent error.
    pub async fn run<F, Fut, T>(&self, label: &str, mut op: F) -> UtilResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = UtilResult<T>>,
    {
        let mut attempt = 1;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_permanent() => return Err(err),
                Err(err) => err,
            };

            match self.delay(attempt) {
                None => return Err(err),
                Some(delay) => {
                    warn!(
                        "Attempt {} for {} failed: {}, retrying in {}",
                        attempt,
                        label,
                        err,
                        humantime::format_duration(delay)
                    );
                    tokio::time::delay_for(delay).await;
                }
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RetryPolicy;
    use crate::types::UtilResult;
    use std::cell::Cell;
    use std::io;
    use std::time::Duration;

    #[test]
    fn backing_off_exponentially() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay(4), Some(Duration::from_secs(8)));
        assert_eq!(policy.delay(5), None);
    }

    #[test]
    fn capping_backoff_delays() {
        let policy = RetryPolicy {
            max_attempts: 20,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        };

        assert_eq!(policy.delay(10), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn retrying_until_success() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };

        let calls = Cell::new(0);
        let result: UtilResult<u32> = policy
            .run("flaky", || {
                calls.set(calls.get() + 1);
                let current = calls.get();
                async move {
                    if current < 3 {
                        Err("not yet".into())
                    } else {
                        Ok(current)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn giving_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };

        let calls = Cell::new(0);
        let result: UtilResult<()> = policy
            .run("broken", || {
                calls.set(calls.get() + 1);
                async { Err("always".into()) }
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "always");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn failing_fast_on_permanent_errors() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        };

        let calls = Cell::new(0);
        let result: UtilResult<()> = policy
            .run("missing", || {
                calls.set(calls.get() + 1);
                async { Err(io::Error::new(io::ErrorKind::NotFound, "no such file").into()) }
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "no such file");
        assert_eq!(calls.get(), 1);
    }
}
