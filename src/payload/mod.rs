//! Payload shaping for `POST /submit_result`.
//!
//! Turns a loosely-typed [`RawResult`] into a [`WirePayload`] that respects
//! the contest schema, or into the safe fallback payload when the raw result
//! cannot be trusted.
//!
//! Validation order:
//! 1. required top-level fields present, else fallback
//! 2. exactly one translation record, else fallback
//! 3. per object: known class (drop otherwise), statuses coerced into
//!    `{-1, 0, 1}`, bbox coordinates parsed (0 on failure), clamped to the
//!    frame and reordered so that `x1 <= x2`, `y1 <= y2`
//!
//! Capping always runs, in two deterministic stages: per-class quota, then
//! the global cap. Both rank objects by `(-confidence, -area, x1, y1)`.

mod config;
mod types;


pub use config::*;
pub use types::*;

use crate::coerce;
use serde_json::Value;
use std::cmp::Ordering;

/// Objects dropped by capping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapStats {
    pub dropped_total: usize,
    pub dropped_by_class: [usize; 4],
}

/// Outcome of [`PayloadShaper::preflight`].
#[derive(Debug, Clone, PartialEq)]
pub struct Preflight {
    pub payload: WirePayload,
    /// The raw result failed structural validation; `payload` is the fallback.
    pub rejected_to_fallback: bool,
    /// Capping dropped at least one object.
    pub clipped: bool,
    pub stats: CapStats,
}

/// An object awaiting capping, with its ranking confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedObject {
    pub object: WireObject,
    pub confidence: f64,
}

impl RankedObject {
    /// Total order: `(-confidence, -area, x1, y1)`, then the remaining fields
    /// so that equal-rank inputs still sort identically regardless of order.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then_with(|| other.object.area().cmp(&self.object.area()))
            .then_with(|| self.object.top_left_x.cmp(&other.object.top_left_x))
            .then_with(|| self.object.top_left_y.cmp(&other.object.top_left_y))
            .then_with(|| self.object.bottom_right_x.cmp(&other.object.bottom_right_x))
            .then_with(|| self.object.bottom_right_y.cmp(&other.object.bottom_right_y))
            .then_with(|| self.object.cls.cmp(&other.object.cls))
            .then_with(|| self.object.landing_status.cmp(&other.object.landing_status))
            .then_with(|| self.object.motion_status.cmp(&other.object.motion_status))
    }
}

/// Validates, clamps and caps results into wire payloads.
#[derive(Debug, Clone)]
pub struct PayloadShaper {
    config: PayloadConfig,
    /// Used when a raw result carries no `user`
    default_user: String,
}

impl PayloadShaper {
    pub fn new(config: PayloadConfig, default_user: impl Into<String>) -> Self {
        Self {
            config,
            default_user: default_user.into(),
        }
    }

    pub fn config(&self) -> &PayloadConfig {
        &self.config
    }

    /// Validate and normalize `raw` into a payload ready to post.
    pub fn preflight(&self, raw: &RawResult, dims: Option<FrameDims>) -> Preflight {
        let (Some(_), Some(_), Some(_), Some(objects), Some(translations)) = (
            raw.id.as_ref(),
            raw.user.as_ref(),
            raw.frame.as_ref(),
            raw.detected_objects.as_ref(),
            raw.detected_translations.as_ref(),
        ) else {
            tracing::warn!("Preflight: required top-level field missing, using fallback payload");
            return self.rejected(raw);
        };

        let [translation] = translations.as_slice() else {
            tracing::warn!(
                translations = translations.len(),
                "Preflight: expected exactly one translation, using fallback payload"
            );
            return self.rejected(raw);
        };

        let ranked: Vec<RankedObject> = objects
            .iter()
            .filter_map(|o| normalize_object(o, dims))
            .collect();
        let (capped, stats) = self.apply_caps(ranked);

        let payload = WirePayload {
            detected_objects: capped.into_iter().map(|r| r.object).collect(),
            detected_translations: [normalize_translation(translation)],
            detected_undefined_objects: raw
                .detected_undefined_objects
                .iter()
                .filter_map(|u| normalize_undefined(u, dims))
                .collect(),
            ..self.identity(raw)
        };

        Preflight {
            payload,
            rejected_to_fallback: false,
            clipped: stats.dropped_total > 0,
            stats,
        }
    }

    /// Minimal always-valid payload: identity only, no objects, zero translation.
    pub fn safe_fallback(&self, raw: &RawResult) -> WirePayload {
        self.identity(raw)
    }

    /// Safe fallback derived from an already shaped payload.
    pub fn fallback_of(payload: &WirePayload) -> WirePayload {
        WirePayload {
            id: payload.id.clone(),
            user: payload.user.clone(),
            frame: payload.frame.clone(),
            detected_objects: Vec::new(),
            detected_translations: [WireTranslation::default()],
            detected_undefined_objects: Vec::new(),
        }
    }

    /// Apply the per-class quota and then the global cap.
    ///
    /// Deterministic and idempotent: the output is sorted by rank, and feeding
    /// it back in returns it unchanged.
    pub fn apply_caps(&self, objects: Vec<RankedObject>) -> (Vec<RankedObject>, CapStats) {
        let mut stats = CapStats::default();
        let mut buckets: [Vec<RankedObject>; 4] = Default::default();
        for obj in objects {
            buckets[obj.object.cls.index()].push(obj);
        }

        let mut survivors = Vec::new();
        for class in ObjectClass::ALL {
            let bucket = &mut buckets[class.index()];
            bucket.sort_by(RankedObject::rank_cmp);
            let quota = self.config.class_quota.for_class(class);
            if bucket.len() > quota {
                let dropped = bucket.len() - quota;
                stats.dropped_by_class[class.index()] += dropped;
                stats.dropped_total += dropped;
                bucket.truncate(quota);
            }
            survivors.append(bucket);
        }

        survivors.sort_by(RankedObject::rank_cmp);
        if survivors.len() > self.config.max_objects {
            for obj in &survivors[self.config.max_objects..] {
                stats.dropped_by_class[obj.object.cls.index()] += 1;
                stats.dropped_total += 1;
            }
            survivors.truncate(self.config.max_objects);
        }

        if stats.dropped_total > 0 {
            tracing::debug!(
                dropped_total = stats.dropped_total,
                dropped_by_class = ?stats.dropped_by_class,
                kept = survivors.len(),
                "Payload objects capped"
            );
        }

        (survivors, stats)
    }

    fn rejected(&self, raw: &RawResult) -> Preflight {
        Preflight {
            payload: self.safe_fallback(raw),
            rejected_to_fallback: true,
            clipped: false,
            stats: CapStats::default(),
        }
    }

    fn identity(&self, raw: &RawResult) -> WirePayload {
        let user = raw
            .user
            .as_ref()
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| self.default_user.clone());

        WirePayload {
            id: raw.id.as_ref().and_then(FrameIdent::from_value),
            user,
            frame: raw.frame.as_ref().and_then(FrameIdent::from_value),
            detected_objects: Vec::new(),
            detected_translations: [WireTranslation::default()],
            detected_undefined_objects: Vec::new(),
        }
    }
}

/// Clamp `(x1, y1, x2, y2)` into the frame and order the corners.
///
/// Without frame dimensions only the lower bound of 0 applies.
pub fn clamp_bbox(
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
    dims: Option<FrameDims>,
) -> (i64, i64, i64, i64) {
    let (max_x, max_y) = match dims {
        Some(d) => (
            (d.width as i64 - 1).max(0),
            (d.height as i64 - 1).max(0),
        ),
        None => (i64::MAX, i64::MAX),
    };
    let cx = |v: i64| v.clamp(0, max_x);
    let cy = |v: i64| v.clamp(0, max_y);
    let (x1, x2) = (cx(x1), cx(x2));
    let (y1, y2) = (cy(y1), cy(y2));
    (x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2))
}

fn normalize_object(raw: &RawObject, dims: Option<FrameDims>) -> Option<RankedObject> {
    let cls = ObjectClass::from_value(&raw.cls)?;
    let (x1, y1, x2, y2) = clamp_bbox(
        coerce::i64_or_zero(Some(&raw.top_left_x)),
        coerce::i64_or_zero(Some(&raw.top_left_y)),
        coerce::i64_or_zero(Some(&raw.bottom_right_x)),
        coerce::i64_or_zero(Some(&raw.bottom_right_y)),
        dims,
    );

    Some(RankedObject {
        object: WireObject {
            cls,
            landing_status: TriState::from_value(Some(&raw.landing_status)),
            motion_status: TriState::from_value(Some(&raw.motion_status)),
            top_left_x: x1,
            top_left_y: y1,
            bottom_right_x: x2,
            bottom_right_y: y2,
        },
        confidence: coerce::f64_or_zero(Some(&raw.confidence)),
    })
}

fn normalize_translation(raw: &RawTranslation) -> WireTranslation {
    WireTranslation {
        translation_x: coerce::f64_or_zero(Some(&raw.translation_x)),
        translation_y: coerce::f64_or_zero(Some(&raw.translation_y)),
        translation_z: coerce::f64_or_zero(Some(&raw.translation_z)),
    }
}

fn normalize_undefined(
    raw: &RawUndefinedObject,
    dims: Option<FrameDims>,
) -> Option<WireUndefinedObject> {
    let object_id = coerce::loose_i64(&raw.object_id)?;
    let (max_x, max_y) = match dims {
        Some(d) => (
            (d.width as f64 - 1.0).max(0.0),
            (d.height as f64 - 1.0).max(0.0),
        ),
        None => (f64::MAX, f64::MAX),
    };
    let x1 = coerce::f64_or_zero(Some(&raw.top_left_x)).clamp(0.0, max_x);
    let y1 = coerce::f64_or_zero(Some(&raw.top_left_y)).clamp(0.0, max_y);
    let x2 = coerce::f64_or_zero(Some(&raw.bottom_right_x)).clamp(0.0, max_x);
    let y2 = coerce::f64_or_zero(Some(&raw.bottom_right_y)).clamp(0.0, max_y);

    Some(WireUndefinedObject {
        object_id,
        top_left_x: x1.min(x2),
        top_left_y: y1.min(y2),
        bottom_right_x: x1.max(x2),
        bottom_right_y: y1.max(y2),
    })
}
