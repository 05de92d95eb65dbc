//! Session loop configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Frame budget, degrade behavior and session abort thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Stop fetching after this many frames; unset means until end of stream
    pub max_frames: Option<u64>,
    /// While degraded, skip image download and inference on most frames
    pub degrade_fetch_only: bool,
    /// While degraded, fully process every Nth frame
    pub degrade_send_interval_frames: u32,
    /// Submit attempts a skipped degraded result gets before it is dropped
    pub degraded_result_ttl: u32,
    /// Consecutive duplicate frames that abort the session
    pub max_consecutive_duplicates: u32,
    /// Consecutive permanent rejects that abort the session
    pub max_consecutive_permanent_rejects: u32,
    /// Consecutive fetch transients after which a warning is logged
    pub transient_soft_budget: u32,
    /// Floor for re-checks while waiting on the breaker
    pub idle_poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_frames: None,
            degrade_fetch_only: true,
            degrade_send_interval_frames: 3,
            degraded_result_ttl: 2,
            max_consecutive_duplicates: 5,
            max_consecutive_permanent_rejects: 5,
            transient_soft_budget: 10,
            idle_poll_ms: 20,
        }
    }
}

impl SessionConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }
}
