//! Perception collaborators.
//!
//! The runtime does not own any vision algorithm. It drives four pluggable
//! collaborators per processed frame and turns their output into a
//! [`RawResult`] for the payload shaper. The built-in implementations keep
//! the binary runnable without a model.

mod builtin;

pub use builtin::*;

use crate::payload::{FrameDims, RawObject, RawTranslation, RawUndefinedObject};
use crate::transport::FrameMeta;
use image::DynamicImage;
use serde_json::Value;

/// One detection as produced by a [`Detector`].
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Class id; anything outside `0..=3` is dropped at preflight
    pub cls: i64,
    pub top_left_x: f64,
    pub top_left_y: f64,
    pub bottom_right_x: f64,
    pub bottom_right_y: f64,
    pub confidence: f64,
    pub landing_status: i8,
    pub motion_status: i8,
}

impl Detection {
    pub fn to_raw(&self) -> RawObject {
        RawObject {
            cls: Value::from(self.cls),
            landing_status: Value::from(self.landing_status),
            motion_status: Value::from(self.motion_status),
            top_left_x: Value::from(self.top_left_x),
            top_left_y: Value::from(self.top_left_y),
            bottom_right_x: Value::from(self.bottom_right_x),
            bottom_right_y: Value::from(self.bottom_right_y),
            confidence: Value::from(self.confidence),
        }
    }
}

/// A reference object located in the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct UndefinedMatch {
    pub object_id: i64,
    pub top_left_x: f64,
    pub top_left_y: f64,
    pub bottom_right_x: f64,
    pub bottom_right_y: f64,
}

impl UndefinedMatch {
    pub fn to_raw(&self) -> RawUndefinedObject {
        RawUndefinedObject {
            object_id: Value::from(self.object_id),
            top_left_x: Value::from(self.top_left_x),
            top_left_y: Value::from(self.top_left_y),
            bottom_right_x: Value::from(self.bottom_right_x),
            bottom_right_y: Value::from(self.bottom_right_y),
        }
    }
}

/// Position estimate in metres.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn to_raw(self) -> RawTranslation {
        RawTranslation::from_xyz(self.x, self.y, self.z)
    }
}

/// Everything a collaborator may look at for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    /// Sequence number within the session, starting at 0
    pub index: u64,
    pub meta: &'a FrameMeta,
    pub image: Option<&'a DynamicImage>,
}

impl FrameContext<'_> {
    pub fn dims(&self) -> Option<FrameDims> {
        self.image.map(|img| FrameDims::new(img.width(), img.height()))
    }
}

pub trait Detector: Send {
    fn detect(&mut self, image: &DynamicImage) -> Vec<Detection>;
}

pub trait Localizer: Send {
    fn update(&mut self, ctx: &FrameContext<'_>) -> Position;
}

pub trait MotionAnnotator: Send {
    fn annotate(&mut self, detections: Vec<Detection>, ctx: &FrameContext<'_>) -> Vec<Detection>;
}

pub trait ReferenceMatcher: Send {
    fn match_frame(&mut self, image: &DynamicImage) -> Vec<UndefinedMatch>;
}

/// Output of one fully processed frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameAnalysis {
    pub detections: Vec<Detection>,
    pub position: Position,
    pub undefined: Vec<UndefinedMatch>,
}

/// The four collaborators wired together.
pub struct Perception {
    detector: Box<dyn Detector>,
    localizer: Box<dyn Localizer>,
    motion: Box<dyn MotionAnnotator>,
    matcher: Box<dyn ReferenceMatcher>,
}

impl Perception {
    pub fn new(
        detector: Box<dyn Detector>,
        localizer: Box<dyn Localizer>,
        motion: Box<dyn MotionAnnotator>,
        matcher: Box<dyn ReferenceMatcher>,
    ) -> Self {
        Self {
            detector,
            localizer,
            motion,
            matcher,
        }
    }

    /// No detections, telemetry-only localization.
    pub fn builtin() -> Self {
        Self::new(
            Box::new(NullDetector),
            Box::new(TelemetryLocalizer::default()),
            Box::new(PassthroughMotion),
            Box::new(NoReferenceMatcher),
        )
    }

    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_localizer(mut self, localizer: Box<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }

    /// Run the full pipeline. Without an image, detection and matching are
    /// skipped but the localizer still runs.
    pub fn process(&mut self, ctx: &FrameContext<'_>) -> FrameAnalysis {
        let position = self.localizer.update(ctx);
        let Some(image) = ctx.image else {
            return FrameAnalysis {
                position,
                ..Default::default()
            };
        };

        let detections = self.detector.detect(image);
        let detections = self.motion.annotate(detections, ctx);
        let undefined = self.matcher.match_frame(image);
        FrameAnalysis {
            detections,
            position,
            undefined,
        }
    }
}

impl std::fmt::Debug for Perception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Perception").finish_non_exhaustive()
    }
}
