//! Tagged outcomes handed back by the transport lanes.

use super::parser::FrameMeta;
use serde::Serialize;
use crate::dedup::DedupStore;
use crate::payload::WirePayload;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of one fetch cycle (up to `max_retries` HTTP attempts).
#[derive(Debug, Clone, PartialEq)]
pub enum FrameFetchOutcome {
    Ok {
        meta: Box<FrameMeta>,
        is_duplicate: bool,
    },
    /// HTTP 204: the server has no more frames.
    EndOfStream,
    /// Timeouts, connection errors or 5xx on every attempt.
    TransientError { reason: String },
    /// Unexpected status or schema violation. Not retried.
    FatalError {
        reason: String,
        http_status: Option<u16>,
    },
}

impl FrameFetchOutcome {
    /// Flag the frame as duplicate if `dedup` has seen its id before.
    pub fn with_dedup(self, dedup: &mut DedupStore) -> Self {
        match self {
            FrameFetchOutcome::Ok { meta, .. } => {
                let is_duplicate = dedup.mark_seen(&meta.key());
                FrameFetchOutcome::Ok { meta, is_duplicate }
            }
            other => other,
        }
    }
}

/// Result of one submit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Acked,
    /// Accepted, but only as the safe fallback payload.
    FallbackAcked,
    /// 5xx, timeouts or connection errors until retries ran out.
    RetryableFailure,
    /// 4xx on the fallback payload too; the frame cannot be scored.
    PermanentRejected,
}

impl SendOutcome {
    pub fn is_ack(self) -> bool {
        matches!(self, SendOutcome::Acked | SendOutcome::FallbackAcked)
    }
}

/// Work order for the submit lane.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub frame_key: String,
    pub payload: WirePayload,
    /// Skip the rich payload and post the safe fallback directly.
    pub force_fallback: bool,
}

/// What the submit lane observed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReport {
    pub frame_key: String,
    pub outcome: SendOutcome,
    /// HTTP POSTs actually issued
    pub posts: u32,
    /// Any attempt in the cycle drew a 4xx
    pub saw_client_error: bool,
    pub last_status: Option<u16>,
}

impl SubmitReport {
    /// Record the cycle in the dedup store.
    pub fn record(&self, dedup: &mut DedupStore) {
        dedup.record_submit(
            &self.frame_key,
            self.outcome.is_ack(),
            self.saw_client_error,
        );
    }
}

/// Timeouts seen per operation class since the last drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeoutCounts {
    pub frame_meta: u64,
    pub image: u64,
    pub submit: u64,
}

impl TimeoutCounts {
    pub fn total(&self) -> u64 {
        self.frame_meta + self.image + self.submit
    }
}

impl std::ops::AddAssign for TimeoutCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.frame_meta += rhs.frame_meta;
        self.image += rhs.image;
        self.submit += rhs.submit;
    }
}

/// Lock-free counters shared by every clone of the client.
#[derive(Debug, Default)]
pub(crate) struct TimeoutCounters {
    frame_meta: AtomicU64,
    image: AtomicU64,
    submit: AtomicU64,
}

impl TimeoutCounters {
    pub(crate) fn bump(&self, op: super::Operation) {
        let counter = match op {
            super::Operation::Handshake | super::Operation::FrameMeta => &self.frame_meta,
            super::Operation::Image => &self.image,
            super::Operation::Submit => &self.submit,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn take(&self) -> TimeoutCounts {
        TimeoutCounts {
            frame_meta: self.frame_meta.swap(0, Ordering::Relaxed),
            image: self.image.swap(0, Ordering::Relaxed),
            submit: self.submit.swap(0, Ordering::Relaxed),
        }
    }
}
