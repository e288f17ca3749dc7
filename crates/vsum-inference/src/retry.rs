//! Rate-limit backoff policy.
//!
//! Only rate-limited submissions are retried. The wait before retry `n`
//! (0-based index of the failed submission) is
//! `min(base * 2^n + jitter, max)` with jitter uniform in `[0, 1)` seconds.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Total submissions allowed per summarization call.
pub const MAX_ATTEMPTS: u32 = 5;

pub const BASE_DELAY: Duration = Duration::from_secs(1);

pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Backoff policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of submissions, including the first
    pub max_attempts: u32,
    /// Base delay, doubled per failed attempt
    pub base_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts: u32 = std::env::var("INFERENCE_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_attempts);

        let base_delay_ms: u64 = std::env::var("INFERENCE_RETRY_BASE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.base_delay.as_millis() as u64);

        let max_delay_ms: u64 = std::env::var("INFERENCE_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_delay.as_millis() as u64);

        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before retrying after failed attempt `attempt` (0-based).
    ///
    /// `jitter` is clamped into `[0, 1)` seconds.
    pub fn delay_for_attempt(&self, attempt: u32, jitter: f64) -> Duration {
        let jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0 - f64::EPSILON)
        } else {
            0.0
        };
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(62) as i32);
        let capped = (exp + jitter).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Uniform random jitter in `[0, 1)` seconds.
pub fn jitter() -> f64 {
    rand::rng().random::<f64>()
}

/// Performs the backoff wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
