//! Breaker states and session statistics.

use serde::Serialize;
use std::fmt;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResilienceState {
    Normal,
    /// Degraded processing; also the half-open probe after `Open`.
    Degraded,
    /// Fetches refused until the cooldown elapses.
    Open,
}

impl fmt::Display for ResilienceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResilienceState::Normal => "normal",
            ResilienceState::Degraded => "degraded",
            ResilienceState::Open => "open",
        };
        f.write_str(name)
    }
}

/// Session-scoped breaker statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResilienceStats {
    pub breaker_open_count: u32,
    /// Entries into `Degraded`, from `Normal` or from `Open`
    pub degrade_entries: u32,
    /// Frames handled while degraded
    pub degrade_frames: u32,
    /// Returns to `Normal`
    pub recovered_count: u32,
    /// Cumulative wall-clock seconds spent outside `Normal`
    pub transient_wall_time_seconds: f64,
}
