//! Exponential backoff with multiplicative jitter.
//!
//! Shared by frame fetch retries, submit retries and the startup handshake.
//! Each logical operation restarts at `attempt = 1`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry and backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per operation (fetch, download, submit, startup)
    pub max_retries: u32,
    /// Delay before the second attempt, in seconds
    pub backoff_base_seconds: f64,
    /// Upper bound for any single delay, in seconds
    pub backoff_max_seconds: f64,
    /// Jitter ratio in `[0, 1]`; delays are scaled by `uniform(1-r, 1+r)`
    pub backoff_jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_seconds: 0.4,
            backoff_max_seconds: 5.0,
            backoff_jitter_ratio: 0.25,
        }
    }
}

impl RetryConfig {
    /// Backoff policy derived from this configuration.
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: self.backoff_base_seconds,
            max_delay: self.backoff_max_seconds,
            jitter_ratio: self.backoff_jitter_ratio,
        }
    }
}

/// Pure delay calculator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: f64,
    pub max_delay: f64,
    pub jitter_ratio: f64,
}

impl BackoffPolicy {
    /// A policy that never waits. Useful for tests and for local mocks.
    pub fn immediate() -> Self {
        Self {
            base: 0.0,
            max_delay: 0.0,
            jitter_ratio: 0.0,
        }
    }

    /// Delay in seconds before retry number `attempt` (1-based).
    pub fn delay_seconds(&self, attempt: u32) -> f64 {
        delay_seconds(attempt, self.base, self.max_delay, self.jitter_ratio)
    }

    /// Delay before retry number `attempt` as a `Duration`.
    pub fn delay(&self, attempt: u32) -> Duration {
        crate::coerce::saturating_secs(self.delay_seconds(attempt))
    }
}

/// `min(max_delay, base * 2^(attempt-1)) * uniform(1-jitter, 1+jitter)`,
/// clamped to `[0, max_delay]`.
pub fn delay_seconds(attempt: u32, base: f64, max_delay: f64, jitter_ratio: f64) -> f64 {
    let max_delay = max_delay.max(0.0);
    let base = base.max(0.0);
    let exponent = attempt.saturating_sub(1).min(62) as i32;
    let raw = (base * 2f64.powi(exponent)).min(max_delay);

    let jitter = jitter_ratio.clamp(0.0, 1.0);
    let factor = if jitter > 0.0 {
        rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter))
    } else {
        1.0
    };

    (raw * factor).clamp(0.0, max_delay)
}
