//! Collaborators that need no model.

use super::{
    Detection, Detector, FrameContext, Localizer, MotionAnnotator, Position, ReferenceMatcher,
    UndefinedMatch,
};
use image::DynamicImage;

/// Never detects anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&mut self, _image: &DynamicImage) -> Vec<Detection> {
        Vec::new()
    }
}

/// Uses the server's translation while GPS is healthy and holds the last
/// estimate otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryLocalizer {
    last: Position,
}

impl Localizer for TelemetryLocalizer {
    fn update(&mut self, ctx: &FrameContext<'_>) -> Position {
        if ctx.meta.gps_healthy() {
            let t = ctx.meta.translation;
            self.last = Position {
                x: t.translation_x,
                y: t.translation_y,
                z: t.translation_z,
            };
        }
        self.last
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughMotion;

impl MotionAnnotator for PassthroughMotion {
    fn annotate(&mut self, detections: Vec<Detection>, _ctx: &FrameContext<'_>) -> Vec<Detection> {
        detections
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferenceMatcher;

impl ReferenceMatcher for NoReferenceMatcher {
    fn match_frame(&mut self, _image: &DynamicImage) -> Vec<UndefinedMatch> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::Perception;
    use crate::transport::parse_frame_meta;
    use serde_json::json;

    #[test]
    fn test_telemetry_localizer_holds_last_fix() {
        let healthy = parse_frame_meta(
            &json!({"id": 1, "gps_health": 1, "translation_x": 3.0, "translation_y": 4.0, "translation_z": 5.0}),
            "http://h",
        )
        .unwrap();
        let lost = parse_frame_meta(
            &json!({"id": 2, "gps_health": "NaN", "translation_x": "NaN"}),
            "http://h",
        )
        .unwrap();

        let mut loc = TelemetryLocalizer::default();
        let ctx = FrameContext { index: 0, meta: &healthy, image: None };
        assert_eq!(loc.update(&ctx), Position { x: 3.0, y: 4.0, z: 5.0 });

        let ctx = FrameContext { index: 1, meta: &lost, image: None };
        assert_eq!(loc.update(&ctx), Position { x: 3.0, y: 4.0, z: 5.0 });
    }

    #[test]
    fn test_process_without_image_skips_detection() {
        let meta = parse_frame_meta(&json!({"id": 1, "gps_health": 1, "translation_x": 2.0}), "http://h")
            .unwrap();
        let mut perception = Perception::builtin();
        let analysis = perception.process(&FrameContext { index: 0, meta: &meta, image: None });
        assert!(analysis.detections.is_empty());
        assert_eq!(analysis.position.x, 2.0);
    }

    #[test]
    fn test_detection_to_raw_keeps_fields() {
        let det = Detection {
            cls: 2,
            top_left_x: 1.0,
            top_left_y: 2.0,
            bottom_right_x: 3.0,
            bottom_right_y: 4.0,
            confidence: 0.5,
            landing_status: 1,
            motion_status: -1,
        };
        let raw = det.to_raw();
        assert_eq!(raw.cls, json!(2));
        assert_eq!(raw.landing_status, json!(1));
        assert_eq!(raw.confidence, json!(0.5));
    }
}
