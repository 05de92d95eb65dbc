//! Wire payload types and their loosely-typed inputs.

use crate::coerce;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Frame identity as the server sent it: a JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameIdent {
    Number(i64),
    Text(String),
}

impl FrameIdent {
    /// Parse a JSON scalar. Null, empty strings and composite values are rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(FrameIdent::Number)
                .or_else(|| Some(FrameIdent::Text(n.to_string()))),
            Value::String(s) if !s.trim().is_empty() => Some(FrameIdent::Text(s.clone())),
            _ => None,
        }
    }

    /// Normalized string key used for dedup and idempotency.
    pub fn key(&self) -> String {
        match self {
            FrameIdent::Number(n) => n.to_string(),
            FrameIdent::Text(s) => s.trim().to_string(),
        }
    }
}

impl fmt::Display for FrameIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameIdent::Number(n) => write!(f, "{}", n),
            FrameIdent::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FrameIdent {
    fn from(s: &str) -> Self {
        FrameIdent::Text(s.to_string())
    }
}

impl From<i64> for FrameIdent {
    fn from(n: i64) -> Self {
        FrameIdent::Number(n)
    }
}

/// The four object classes scored by the contest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectClass {
    Vehicle = 0,
    Human = 1,
    /// Flying-car parking area
    ParkingArea = 2,
    /// Air-ambulance landing area
    AmbulanceArea = 3,
}

impl ObjectClass {
    pub const ALL: [ObjectClass; 4] = [
        ObjectClass::Vehicle,
        ObjectClass::Human,
        ObjectClass::ParkingArea,
        ObjectClass::AmbulanceArea,
    ];

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(ObjectClass::Vehicle),
            1 => Some(ObjectClass::Human),
            2 => Some(ObjectClass::ParkingArea),
            3 => Some(ObjectClass::AmbulanceArea),
            _ => None,
        }
    }

    /// Accepts `0` or `"0"`; fractional or unknown ids are rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        let f = coerce::loose_f64(value)?;
        if f.fract() != 0.0 {
            return None;
        }
        Self::from_id(f as i64)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl Serialize for ObjectClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.index())
    }
}

/// Landing/motion status: `-1` (not applicable / unknown), `0`, `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriState(i8);

impl TriState {
    pub const UNKNOWN: TriState = TriState(-1);

    /// Out-of-range values collapse to `-1`.
    pub fn new(value: i8) -> Self {
        if (-1..=1).contains(&value) {
            TriState(value)
        } else {
            TriState::UNKNOWN
        }
    }

    pub fn from_value(value: Option<&Value>) -> Self {
        TriState(coerce::tri_state(value))
    }

    pub fn get(self) -> i8 {
        self.0
    }
}

impl Serialize for TriState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Frame size used for bbox clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDims {
    pub width: u32,
    pub height: u32,
}

impl FrameDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// One detected object as sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireObject {
    pub cls: ObjectClass,
    pub landing_status: TriState,
    pub motion_status: TriState,
    pub top_left_x: i64,
    pub top_left_y: i64,
    pub bottom_right_x: i64,
    pub bottom_right_y: i64,
}

impl WireObject {
    /// Box area, widened so coordinates anywhere in `i64` cannot overflow.
    pub fn area(&self) -> i128 {
        let width = i128::from(self.bottom_right_x) - i128::from(self.top_left_x);
        let height = i128::from(self.bottom_right_y) - i128::from(self.top_left_y);
        width.saturating_mul(height)
    }
}

/// Position estimate in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WireTranslation {
    pub translation_x: f64,
    pub translation_y: f64,
    pub translation_z: f64,
}

/// A reference object matched in the frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireUndefinedObject {
    pub object_id: i64,
    pub top_left_x: f64,
    pub top_left_y: f64,
    pub bottom_right_x: f64,
    pub bottom_right_y: f64,
}

/// Result body for `POST /submit_result`.
///
/// Only constructed by [`super::PayloadShaper`], which guarantees valid classes,
/// clamped and ordered boxes, the per-class quotas, the global cap, and
/// exactly one translation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WirePayload {
    pub(crate) id: Option<FrameIdent>,
    pub(crate) user: String,
    pub(crate) frame: Option<FrameIdent>,
    pub(crate) detected_objects: Vec<WireObject>,
    pub(crate) detected_translations: [WireTranslation; 1],
    pub(crate) detected_undefined_objects: Vec<WireUndefinedObject>,
}

impl WirePayload {
    pub fn id(&self) -> Option<&FrameIdent> {
        self.id.as_ref()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn frame(&self) -> Option<&FrameIdent> {
        self.frame.as_ref()
    }

    pub fn objects(&self) -> &[WireObject] {
        &self.detected_objects
    }

    pub fn translation(&self) -> &WireTranslation {
        &self.detected_translations[0]
    }

    pub fn undefined_objects(&self) -> &[WireUndefinedObject] {
        &self.detected_undefined_objects
    }

    /// True when the payload carries no detections of any kind.
    pub fn is_minimal(&self) -> bool {
        self.detected_objects.is_empty() && self.detected_undefined_objects.is_empty()
    }
}

/// Detected object before validation. Every field is tolerated as any JSON scalar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawObject {
    pub cls: Value,
    pub landing_status: Value,
    #[serde(alias = "movement_status")]
    pub motion_status: Value,
    pub top_left_x: Value,
    pub top_left_y: Value,
    pub bottom_right_x: Value,
    pub bottom_right_y: Value,
    #[serde(alias = "_confidence")]
    pub confidence: Value,
}

/// Translation before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTranslation {
    pub translation_x: Value,
    pub translation_y: Value,
    pub translation_z: Value,
}

impl RawTranslation {
    pub fn from_xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            translation_x: Value::from(x),
            translation_y: Value::from(y),
            translation_z: Value::from(z),
        }
    }
}

/// Reference-object match before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawUndefinedObject {
    pub object_id: Value,
    pub top_left_x: Value,
    pub top_left_y: Value,
    pub bottom_right_x: Value,
    pub bottom_right_y: Value,
}

/// A result as assembled from collaborator output, before preflight.
///
/// Missing top-level fields are represented as `None` so that preflight can
/// tell "absent" apart from "empty".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawResult {
    pub id: Option<Value>,
    pub user: Option<Value>,
    pub frame: Option<Value>,
    pub detected_objects: Option<Vec<RawObject>>,
    pub detected_translations: Option<Vec<RawTranslation>>,
    pub detected_undefined_objects: Vec<RawUndefinedObject>,
}
