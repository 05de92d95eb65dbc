//! Circuit breaker configuration.

use crate::coerce::saturating_secs;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds for the breaker and the session-wide unhealthy budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Sliding window for transient events, in seconds
    pub transient_window_seconds: f64,
    /// Events within the window that open the breaker
    pub transient_max_events: usize,
    /// How long the breaker stays open before the half-open probe
    pub open_cooldown_seconds: f64,
    /// Cumulative non-normal time after which the session is abandoned
    pub session_max_transient_seconds: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            transient_window_seconds: 30.0,
            transient_max_events: 12,
            open_cooldown_seconds: 8.0,
            session_max_transient_seconds: 120.0,
        }
    }
}

impl BreakerConfig {
    pub fn window(&self) -> Duration {
        saturating_secs(self.transient_window_seconds)
    }

    pub fn cooldown(&self) -> Duration {
        saturating_secs(self.open_cooldown_seconds)
    }
}
