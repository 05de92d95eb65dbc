//! `/next_frame` metadata normalization.
//!
//! The server schema drifts between rehearsals, so identity is taken from
//! the first of `frame_id`, `id`, `url`, `frame` that is present, the image
//! location from `frame_url` or `image_url`, and every numeric telemetry
//! field is coerced with `"NaN"`/empty/unknown mapped to zero.

use super::error::TransportError;
use crate::coerce;
use crate::payload::{FrameIdent, WireTranslation};
use serde_json::{Map, Value};

/// Normalized frame metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMeta {
    /// Identity used for dedup and idempotency keys
    pub ident: FrameIdent,
    /// `id` echoed back in the result payload
    pub wire_id: FrameIdent,
    /// `frame` echoed back in the result payload
    pub wire_frame: FrameIdent,
    pub user: Option<String>,
    /// Absolute image URL, when the server sent one
    pub image_url: Option<String>,
    /// `1` when the server's GPS fix is usable
    pub gps_health: i64,
    pub translation: WireTranslation,
    pub altitude: f64,
    /// Original body, for collaborators that need extra fields
    pub raw: Value,
}

impl FrameMeta {
    /// Normalized key for dedup and idempotency.
    pub fn key(&self) -> String {
        self.ident.key()
    }

    pub fn gps_healthy(&self) -> bool {
        self.gps_health == 1
    }
}

/// Parse and normalize a `/next_frame` body.
pub fn parse_frame_meta(body: &Value, base_url: &str) -> Result<FrameMeta, TransportError> {
    let obj = body
        .as_object()
        .ok_or_else(|| TransportError::InvalidSchema("frame metadata is not an object".into()))?;

    let ident = first_ident(obj, &["frame_id", "id", "url", "frame"]).ok_or_else(|| {
        TransportError::InvalidSchema("missing frame identifier (frame_id/id/url/frame)".into())
    })?;
    let wire_id = first_ident(obj, &["id"]).unwrap_or_else(|| ident.clone());
    let wire_frame = first_ident(obj, &["url", "frame"]).unwrap_or_else(|| ident.clone());

    let user = match obj.get("user") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    };

    let image_url = ["frame_url", "image_url"]
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(|s| resolve_url(base_url, s));

    let gps_health = obj
        .get("gps_health")
        .filter(|v| !v.is_null())
        .or_else(|| obj.get("gps_health_status"))
        .map(|v| coerce::i64_or_zero(Some(v)))
        .unwrap_or(0);

    Ok(FrameMeta {
        ident,
        wire_id,
        wire_frame,
        user,
        image_url,
        gps_health,
        translation: WireTranslation {
            translation_x: coerce::f64_or_zero(obj.get("translation_x")),
            translation_y: coerce::f64_or_zero(obj.get("translation_y")),
            translation_z: coerce::f64_or_zero(obj.get("translation_z")),
        },
        altitude: coerce::f64_or_zero(obj.get("altitude")),
        raw: body.clone(),
    })
}

/// Absolute URLs pass through; relative ones are joined onto `base_url`.
pub fn resolve_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if url.starts_with('/') {
        format!("{}{}", base, url)
    } else {
        format!("{}/{}", base, url)
    }
}

fn first_ident(obj: &Map<String, Value>, keys: &[&str]) -> Option<FrameIdent> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(FrameIdent::from_value)
}
