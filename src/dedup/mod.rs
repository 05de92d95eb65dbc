//! Frame deduplication and submit idempotency.
//!
//! Three independent bounded sets, all keyed by the normalized frame id:
//!
//! - **seen**: frame ids returned by `/next_frame`, used to flag duplicates
//! - **submitted**: frame ids whose result was acknowledged
//! - **force-fallback**: frame ids whose rich payload drew a 4xx; later
//!   attempts for them go straight to the safe fallback payload
//!
//! The store is owned by the session driver. Worker lanes never touch it;
//! they hand back outcomes that the driver records here.

mod lru;

pub use lru::BoundedLruSet;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deduplication and idempotency configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Capacity of each LRU set
    pub capacity: usize,
    /// First segment of every `Idempotency-Key` header value
    pub idempotency_key_prefix: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            idempotency_key_prefix: "aia".to_string(),
        }
    }
}

/// What the driver should do with a result before posting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPlan {
    /// The frame was already acknowledged; do not post again.
    AlreadySubmitted,
    /// Post the result. `force_fallback` means skip the rich payload.
    Send { force_fallback: bool },
}

/// The three bounded sets.
#[derive(Debug, Clone)]
pub struct DedupStore {
    seen: BoundedLruSet,
    submitted: BoundedLruSet,
    force_fallback: BoundedLruSet,
}

impl DedupStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: BoundedLruSet::new(capacity),
            submitted: BoundedLruSet::new(capacity),
            force_fallback: BoundedLruSet::new(capacity),
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Record a frame id from the server. Returns true if it was already seen.
    pub fn mark_seen(&mut self, frame_id: &str) -> bool {
        self.seen.touch(frame_id)
    }

    pub fn mark_submitted(&mut self, frame_id: &str) {
        self.submitted.touch(frame_id);
    }

    pub fn was_submitted(&self, frame_id: &str) -> bool {
        self.submitted.contains(frame_id)
    }

    pub fn mark_force_fallback(&mut self, frame_id: &str) {
        self.force_fallback.touch(frame_id);
    }

    pub fn should_force_fallback(&self, frame_id: &str) -> bool {
        self.force_fallback.contains(frame_id)
    }

    pub fn clear_force_fallback(&mut self, frame_id: &str) {
        self.force_fallback.remove(frame_id);
    }

    /// Decide how a result for `frame_id` should be sent.
    pub fn plan_submit(&self, frame_id: &str) -> SubmitPlan {
        if self.was_submitted(frame_id) {
            SubmitPlan::AlreadySubmitted
        } else {
            SubmitPlan::Send {
                force_fallback: self.should_force_fallback(frame_id),
            }
        }
    }

    /// Record what a submit cycle observed.
    ///
    /// Any 4xx sighting pins the frame to the fallback payload; an
    /// acknowledgement marks it submitted and releases the pin.
    pub fn record_submit(&mut self, frame_id: &str, acked: bool, saw_client_error: bool) {
        if saw_client_error {
            self.mark_force_fallback(frame_id);
        }
        if acked {
            self.mark_submitted(frame_id);
            self.clear_force_fallback(frame_id);
        }
    }
}

/// `Idempotency-Key` header builder: `prefix:session:run:frame`.
///
/// The run id is unique per process so that two runs of the same session
/// never collapse into one server-side cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKey {
    prefix: String,
    session_id: String,
    run_id: String,
}

impl IdempotencyKey {
    pub fn new(
        prefix: impl Into<String>,
        session_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            session_id: session_id.into(),
            run_id: run_id.into(),
        }
    }

    /// Key builder with a fresh random run id.
    pub fn for_new_run(prefix: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::new(prefix, session_id, uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Header value for one frame.
    pub fn for_frame(&self, frame_id: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.prefix, self.session_id, self.run_id, frame_id
        )
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.prefix, self.session_id, self.run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_seen_flags_duplicates() {
        let mut store = DedupStore::new(8);
        assert!(!store.mark_seen("frame-1"));
        assert!(store.mark_seen("frame-1"));
        assert!(!store.mark_seen("frame-2"));
    }

    #[test]
    fn test_seen_lru_evicts_oldest() {
        let mut store = DedupStore::new(2);
        assert!(!store.mark_seen("A"));
        assert!(!store.mark_seen("B"));
        assert!(!store.mark_seen("C")); // A evicted
        assert!(!store.mark_seen("A"));
    }

    #[test]
    fn test_sets_are_independent() {
        let mut store = DedupStore::new(4);
        store.mark_seen("f");
        assert!(!store.was_submitted("f"));
        assert!(!store.should_force_fallback("f"));

        store.mark_force_fallback("f");
        assert!(store.should_force_fallback("f"));
        assert!(!store.was_submitted("f"));
    }

    #[test]
    fn test_plan_submit() {
        let mut store = DedupStore::new(4);
        assert_eq!(
            store.plan_submit("f"),
            SubmitPlan::Send {
                force_fallback: false
            }
        );

        store.record_submit("f", false, true);
        assert_eq!(
            store.plan_submit("f"),
            SubmitPlan::Send {
                force_fallback: true
            }
        );

        store.record_submit("f", true, false);
        assert_eq!(store.plan_submit("f"), SubmitPlan::AlreadySubmitted);
        assert!(!store.should_force_fallback("f"));
    }

    #[test]
    fn test_idempotency_key_format() {
        let key = IdempotencyKey::new("aia", "s1", "run42");
        assert_eq!(key.for_frame("frame-7"), "aia:s1:run42:frame-7");
        assert_eq!(key.to_string(), "aia:s1:run42");
    }

    #[test]
    fn test_new_runs_get_distinct_keys() {
        let a = IdempotencyKey::for_new_run("aia", "s1");
        let b = IdempotencyKey::for_new_run("aia", "s1");
        assert_ne!(a.for_frame("f"), b.for_frame("f"));
        assert!(a.for_frame("f").ends_with(":f"));
    }

    #[test]
    fn test_dedup_config_defaults() {
        let config = DedupConfig::default();
        assert_eq!(config.capacity, 512);
        assert_eq!(config.idempotency_key_prefix, "aia");
    }
}
