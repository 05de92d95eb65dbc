//! Session counters and the end-of-session report.

use crate::resilience::ResilienceStats;
use crate::transport::TimeoutCounts;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Counters owned by the session driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionKpi {
    pub frames_fetched: u64,
    /// Frames that went through image download and perception
    pub frames_processed: u64,
    /// Degraded frames that got a synthesized result instead
    pub frames_skipped_degraded: u64,
    pub duplicate_frames: u64,
    /// Results not posted because their frame was already acknowledged
    pub duplicate_submits_skipped: u64,
    pub fetch_transient_errors: u64,
    pub send_ok: u64,
    pub send_fail: u64,
    pub send_fallback_ok: u64,
    pub send_permanent_reject: u64,
    pub preflight_rejected: u64,
    pub payload_clipped: u64,
    /// Degraded results whose TTL ran out before an ack
    pub stale_results_dropped: u64,
    pub mode_gps: u64,
    pub mode_optical_flow: u64,
    pub timeouts: TimeoutCounts,
}

/// Why the session loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// The server answered 204.
    EndOfStream,
    /// `/next_frame` violated the contract.
    FetchFatal {
        reason: String,
        http_status: Option<u16>,
    },
    MaxFrames { frames: u64 },
    /// Shutdown signal.
    Cancelled,
    /// Cumulative non-normal time exceeded the session budget.
    TransientBudget { detail: String },
    ConsecutiveDuplicates { count: u32 },
    ConsecutivePermanentRejects { count: u32 },
}

impl StopReason {
    /// Session-fatal reasons stop immediately; the others drain the
    /// pending result first.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            StopReason::Cancelled
                | StopReason::TransientBudget { .. }
                | StopReason::ConsecutiveDuplicates { .. }
                | StopReason::ConsecutivePermanentRejects { .. }
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndOfStream => write!(f, "end of stream"),
            StopReason::FetchFatal {
                reason,
                http_status: Some(status),
            } => write!(f, "fatal fetch error: {} (HTTP {})", reason, status),
            StopReason::FetchFatal { reason, .. } => write!(f, "fatal fetch error: {}", reason),
            StopReason::MaxFrames { frames } => write!(f, "frame budget reached ({} frames)", frames),
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::TransientBudget { detail } => write!(f, "aborted: {}", detail),
            StopReason::ConsecutiveDuplicates { count } => {
                write!(f, "aborted: {} consecutive duplicate frames", count)
            }
            StopReason::ConsecutivePermanentRejects { count } => {
                write!(f, "aborted: {} consecutive permanent rejects", count)
            }
        }
    }
}

/// End-of-session summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub run_id: String,
    pub stop_reason: StopReason,
    pub kpi: SessionKpi,
    pub resilience: ResilienceStats,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl SessionReport {
    /// Emit the one-line structured summary.
    pub fn log(&self) {
        tracing::info!(
            run_id = %self.run_id,
            stop_reason = %self.stop_reason,
            elapsed_sec = %format!("{:.1}", self.elapsed.as_secs_f64()),
            frames_fetched = self.kpi.frames_fetched,
            send_ok = self.kpi.send_ok,
            send_fail = self.kpi.send_fail,
            send_fallback_ok = self.kpi.send_fallback_ok,
            send_permanent_reject = self.kpi.send_permanent_reject,
            timeouts_frame_meta = self.kpi.timeouts.frame_meta,
            timeouts_image = self.kpi.timeouts.image,
            timeouts_submit = self.kpi.timeouts.submit,
            breaker_open_count = self.resilience.breaker_open_count,
            degrade_frames = self.resilience.degrade_frames,
            recovered_count = self.resilience.recovered_count,
            mode_gps = self.kpi.mode_gps,
            mode_optical_flow = self.kpi.mode_optical_flow,
            "Session finished"
        );
    }
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}
