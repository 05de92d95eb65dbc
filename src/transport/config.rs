//! Per-operation timeout configuration.

use crate::coerce::saturating_secs;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::Operation;

/// Connect and read timeouts, in seconds.
///
/// The connect timeout is shared; each operation class has its own read
/// budget so a slow image host cannot eat into the metadata or submit paths.
///
/// A `*_read_seconds` value is not a socket read timeout. Each request gets one
/// total deadline of `connect_seconds + <op>_read_seconds`, covering connect,
/// sending the request and reading the whole response body. Values are
/// capped at [`MAX_CONFIG_SECONDS`](crate::coerce::MAX_CONFIG_SECONDS).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_seconds: f64,
    /// `GET /next_frame` and the startup handshake
    pub frame_meta_read_seconds: f64,
    pub image_read_seconds: f64,
    pub submit_read_seconds: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_seconds: 1.5,
            frame_meta_read_seconds: 2.5,
            image_read_seconds: 4.0,
            submit_read_seconds: 3.5,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        saturating_secs(self.connect_seconds)
    }

    /// Total request budget for `op`: connect plus that operation's read timeout.
    pub fn request(&self, op: Operation) -> Duration {
        let read = match op {
            Operation::Handshake | Operation::FrameMeta => self.frame_meta_read_seconds,
            Operation::Image => self.image_read_seconds,
            Operation::Submit => self.submit_read_seconds,
        };
        saturating_secs(self.connect_seconds + read)
    }
}
