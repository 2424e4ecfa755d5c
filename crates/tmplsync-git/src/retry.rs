//! Exponential backoff with a total elapsed-time limit.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Parameters of the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Delay before the first retry.
    #[serde(with = "millis")]
    pub initial_interval: Duration,
    /// Growth factor of the delay.
    pub multiplier: f64,
    /// Upper bound of a single delay.
    #[serde(with = "millis")]
    pub max_interval: Duration,
    /// Retries stop when the next delay would exceed this limit.
    #[serde(with = "millis")]
    pub max_elapsed_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(200),
            multiplier: 2.0,
            max_interval: Duration::from_millis(500),
            max_elapsed_time: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_elapsed_time: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Starts a new backoff sequence.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(*self)
    }
}

/// Stateful delay sequence: `initial`, `initial * m`, ... capped at `max_interval`.
///
/// Returns `None` once the elapsed time plus the next delay would exceed
/// the time limit.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tmplsync_git::RetryConfig;
///
/// let mut backoff = RetryConfig::default().backoff();
/// assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
/// assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(400)));
/// assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(500)));
/// ```
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
    current: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            current: config.initial_interval,
            started: Instant::now(),
            config,
        }
    }

    /// Restarts the sequence and the elapsed-time limit.
    pub fn reset(&mut self) {
        self.current = self.config.initial_interval;
        self.started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Returns the delay before the next attempt, `None` to stop retrying.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let next = self.current.min(self.config.max_interval);
        let grown = Duration::from_secs_f64(self.current.as_secs_f64() * self.config.multiplier);
        self.current = grown.min(self.config.max_interval);

        if self.elapsed() + next > self.config.max_elapsed_time {
            return None;
        }
        Some(next)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
