//! Backoff policy for throttled and transient Graph responses.
//!
//! Graph signals throttling with `429` and an optional `Retry-After` header
//! (seconds). Gateway failures (`502`/`503`/`504`) carry no hint, so they use
//! exponential backoff. Both are capped and jittered.

use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::GraphSettings;

/// Retry configuration shared by every request the client sends.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries per request, per failure class.
    pub max_retries: u32,
    /// Delay for the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single wait, including `Retry-After`.
    pub max_delay: Duration,
    /// Jitter as a fraction of the delay, in `[0.0, 1.0]`.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Builds the policy from client settings.
    #[must_use]
    pub fn from_settings(settings: &GraphSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.base_retry_delay,
            max_delay: settings.max_retry_delay,
            ..Self::default()
        }
    }

    /// Parses a `Retry-After` header value. Only the delta-seconds form is
    /// supported; Graph does not send HTTP-dates.
    #[must_use]
    pub fn parse_retry_after(header_value: &str) -> Option<u64> {
        header_value.trim().parse::<u64>().ok()
    }

    /// `base * 2^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Adds up to `jitter_factor * delay` of random extra wait.
    #[must_use]
    pub fn add_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let delay_ms = delay.as_millis() as f64;
        let jitter = rand::thread_rng().gen_range(0.0..=delay_ms * self.jitter_factor);
        Duration::from_millis((delay_ms + jitter) as u64)
    }

    /// The wait before retry number `attempt`, honouring `Retry-After`.
    #[must_use]
    pub fn delay_for(&self, retry_after_secs: Option<u64>, attempt: u32) -> Duration {
        let delay = match retry_after_secs {
            Some(secs) => {
                let requested = Duration::from_secs(secs);
                if requested > self.max_delay {
                    warn!(
                        requested_secs = secs,
                        cap = ?self.max_delay,
                        "Retry-After exceeds cap"
                    );
                }
                requested.min(self.max_delay)
            }
            None => self.backoff_delay(attempt),
        };
        self.add_jitter(delay)
    }

    /// Sleeps for the computed delay.
    pub async fn wait(&self, operation: &'static str, retry_after_secs: Option<u64>, attempt: u32) {
        let delay = self.delay_for(retry_after_secs, attempt);
        info!(operation, attempt, ?delay, "Backing off before retry");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(300_000),
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(RetryPolicy::parse_retry_after("60"), Some(60));
        assert_eq!(RetryPolicy::parse_retry_after("  120  "), Some(120));
        assert_eq!(RetryPolicy::parse_retry_after("invalid"), None);
        assert_eq!(RetryPolicy::parse_retry_after(""), None);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = no_jitter();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(8000));
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(5000),
            ..no_jitter()
        };
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(5000));
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn test_retry_after_preferred_and_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..no_jitter()
        };
        assert_eq!(policy.delay_for(Some(4), 7), Duration::from_secs(4));
        assert_eq!(policy.delay_for(Some(3600), 0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(None, 1), Duration::from_millis(2000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy {
            jitter_factor: 0.25,
            ..no_jitter()
        };
        let base = Duration::from_millis(1000);
        let mut seen = Vec::new();
        for _ in 0..100 {
            let ms = policy.add_jitter(base).as_millis() as u64;
            assert!((1000..=1250).contains(&ms), "delay {ms} out of range");
            seen.push(ms);
        }
        assert!(seen.iter().any(|&d| d != seen[0]), "jitter should vary");
    }

    #[tokio::test]
    async fn test_wait_with_zero_retry_after_is_fast() {
        let policy = no_jitter();
        let start = Instant::now();
        policy.wait("list_user_oauth_grants", Some(0), 0).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
