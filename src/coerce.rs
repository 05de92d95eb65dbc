//! Tolerant scalar parsing for loosely-typed JSON coming from the contest
//! server and from perception collaborators.
//!
//! The server schema drifts between rehearsals (numbers sent as strings,
//! `"NaN"` placeholders when GPS is lost), so every numeric field read off the
//! wire goes through these helpers instead of failing the whole frame.

use serde_json::Value;
use std::time::Duration;

/// String placeholders treated as "no value".
const NULL_LIKE: [&str; 5] = ["", "nan", "unknown", "none", "null"];

/// Parse a JSON scalar as a finite `f64`.
///
/// Returns `None` for null, null-like strings, non-numeric values and
/// non-finite numbers.
pub fn loose_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if NULL_LIKE.contains(&trimmed.to_ascii_lowercase().as_str()) {
                return None;
            }
            trimmed.parse::<f64>().ok()
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Parse a JSON scalar as an integer, truncating fractional values.
pub fn loose_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| loose_f64(value).map(|f| f as i64)),
        _ => loose_f64(value).map(|f| f as i64),
    }
}

/// `loose_f64` with `0.0` for anything unusable.
pub fn f64_or_zero(value: Option<&Value>) -> f64 {
    value.and_then(loose_f64).unwrap_or(0.0)
}

/// `loose_i64` with `0` for anything unusable.
pub fn i64_or_zero(value: Option<&Value>) -> i64 {
    value.and_then(loose_i64).unwrap_or(0)
}

/// Coerce a landing/motion status into `{-1, 0, 1}`; anything else is `-1`.
pub fn tri_state(value: Option<&Value>) -> i8 {
    match value.and_then(loose_i64) {
        Some(v @ -1..=1) => v as i8,
        _ => -1,
    }
}

/// Longest duration built from a configured number of seconds (about 31
/// years). Still far enough out to mean "never", and safe to add to an
/// `Instant`.
pub const MAX_CONFIG_SECONDS: f64 = 1.0e9;

/// Seconds to `Duration`, saturating instead of panicking.
///
/// NaN and non-positive values give zero; anything past
/// [`MAX_CONFIG_SECONDS`], infinity included, is capped there.
pub fn saturating_secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value.min(MAX_CONFIG_SECONDS)).unwrap_or(Duration::ZERO)
}
