//! Retry logic with exponential backoff and jitter.

use std::time::Duration;

use serde::Deserialize;

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            factor: 3.0,
            max: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt as i32);
                let seconds = (base.as_secs_f64() * scale).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(seconds);
                if !jitter {
                    return delay;
                }

                let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                let offset = fastrand::u64(0..=(jitter_ms * 2));
                let total_ms = delay.as_millis() as i64 + (offset as i64 - jitter_ms as i64);
                Duration::from_millis(total_ms.max(0) as u64)
            }
        }
    }
}

/// Configuration for transport-level retries beneath every fetch attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// HTTP status codes that trigger a retry.
    pub retry_on_status: Vec<u16>,
    pub retry_on_transport: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 4,
            backoff: Backoff::default(),
            retry_on_status: vec![500, 502, 503, 504],
            retry_on_transport: true,
        }
    }
}

impl RetryConfig {
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.enabled && self.retry_on_status.contains(&status)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Attempts allowed in total, including the first.
    pub fn total_attempts(&self) -> u32 {
        if self.enabled {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }
}

/// Config-file form of [`RetryConfig`]; durations are in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub enabled: bool,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub retry_on_status: Vec<u16>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        let (base, factor, max, jitter) = match defaults.backoff {
            Backoff::Exponential {
                base,
                factor,
                max,
                jitter,
            } => (base, factor, max, jitter),
            Backoff::Fixed { delay } => (delay, 1.0, delay, false),
        };
        Self {
            enabled: defaults.enabled,
            max_retries: defaults.max_retries,
            base_delay_ms: base.as_millis() as u64,
            factor,
            max_delay_ms: max.as_millis() as u64,
            jitter,
            retry_on_status: defaults.retry_on_status,
        }
    }
}

impl From<RetrySettings> for RetryConfig {
    fn from(value: RetrySettings) -> Self {
        Self {
            enabled: value.enabled,
            max_retries: value.max_retries,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(value.base_delay_ms),
                factor: value.factor,
                max: Duration::from_millis(value.max_delay_ms),
                jitter: value.jitter,
            },
            retry_on_status: value.retry_on_status,
            retry_on_transport: true,
        }
    }
}
