//! Rate-limit retry policy
//!
//! Decides how long to wait after an HTTP 429 and whether another attempt
//! at the same page is allowed.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default wait after a 429, in seconds.
pub const DEFAULT_RATE_LIMIT_DELAY_SECS: u64 = 60;

/// Default ceiling on a single backoff wait, in seconds (15 minutes).
pub const DEFAULT_RATE_LIMIT_MAX_DELAY_SECS: u64 = 900;

/// Default number of requests made for one page before giving up.
pub const DEFAULT_RATE_LIMIT_MAX_ATTEMPTS: u32 = 8;

/// How the wait grows between consecutive 429 responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay every time
    Fixed,
    /// Delay doubles per attempt, capped at `max_delay`
    Exponential,
}

/// Retry policy applied when the remote API answers HTTP 429
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Wait after the first 429
    pub base_delay: Duration,
    /// Upper bound for any single wait
    pub max_delay: Duration,
    /// Total requests allowed for one page; `None` retries forever
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
    /// Randomize each wait between half and the full computed delay
    pub jitter: bool,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::exponential(
            Duration::from_secs(DEFAULT_RATE_LIMIT_DELAY_SECS),
            Duration::from_secs(DEFAULT_RATE_LIMIT_MAX_DELAY_SECS),
            DEFAULT_RATE_LIMIT_MAX_ATTEMPTS,
        )
    }
}

impl RateLimitPolicy {
    /// Unbounded fixed-interval waiting.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            max_attempts: None,
            backoff: Backoff::Fixed,
            jitter: false,
        }
    }

    /// Bounded exponential backoff with jitter.
    pub fn exponential(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts: Some(max_attempts),
            backoff: Backoff::Exponential,
            jitter: true,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another request may follow after `attempts` rate-limited ones.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts < max,
            None => true,
        }
    }

    /// Delay before the request following the `attempt`-th 429 (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.computed_delay(attempt);

        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let half = millis / 2;
        let jittered = half + rand::thread_rng().gen_range(0..=millis - half);
        Duration::from_millis(jittered)
    }

    fn computed_delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let exponent = attempt.saturating_sub(1).min(31);
                self.base_delay
                    .checked_mul(1u32 << exponent)
                    .unwrap_or(self.max_delay)
                    .min(self.max_delay)
            },
        }
    }
}
