//! Frame catalog and simulated telemetry for the mock server.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use super::MockError;

/// Longest stream the contest serves in one session.
pub const MAX_STREAM_FRAMES: usize = 2250;

/// Frames with healthy GPS before the outage cycles start.
const GPS_WARMUP_FRAMES: u64 = 450;
/// Outage cycle length after warm-up; the first `GPS_HEALTHY_PER_CYCLE` are healthy.
const GPS_CYCLE_FRAMES: u64 = 300;
const GPS_HEALTHY_PER_CYCLE: u64 = 100;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Where the served frames come from.
#[derive(Debug, Clone)]
pub enum FrameCatalog {
    /// Image files discovered on disk, in path order.
    Files(Vec<PathBuf>),
    /// One generated PNG served for every index.
    Synthetic { count: usize, png: Vec<u8> },
}

impl FrameCatalog {
    /// Recursively collect images under `dir`, capped at `limit`.
    pub fn discover(dir: &Path, limit: usize) -> Result<Self, MockError> {
        let mut files = Vec::new();
        collect_images(dir, &mut files)?;
        files.sort();
        files.truncate(limit);
        if files.is_empty() {
            return Err(MockError::NoFrames(dir.to_path_buf()));
        }
        Ok(FrameCatalog::Files(files))
    }

    pub fn synthetic(count: usize, width: u32, height: u32) -> Result<Self, MockError> {
        Ok(FrameCatalog::Synthetic {
            count,
            png: synthetic_png(width, height)?,
        })
    }

    pub fn len(&self) -> usize {
        match self {
            FrameCatalog::Files(files) => files.len(),
            FrameCatalog::Synthetic { count, .. } => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), MockError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if has_image_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn synthetic_png(width: u32, height: u32) -> Result<Vec<u8>, image::ImageError> {
    let img = image::RgbImage::from_fn(width.max(1), height.max(1), |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 96])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Simulated GPS for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    pub gps_health: i64,
    pub translation: [Value; 3],
}

/// Healthy for the warm-up, then 100 healthy / 200 lost per 300-frame cycle.
/// Lost frames carry `"NaN"` translations like the real feed.
pub fn telemetry_for(frame_id: u64) -> Telemetry {
    let healthy = frame_id < GPS_WARMUP_FRAMES
        || (frame_id - GPS_WARMUP_FRAMES) % GPS_CYCLE_FRAMES < GPS_HEALTHY_PER_CYCLE;

    if healthy {
        Telemetry {
            gps_health: 1,
            translation: [
                json!(frame_id as f64 * 0.5),
                json!(frame_id as f64 * 0.1),
                json!(50.0),
            ],
        }
    } else {
        Telemetry {
            gps_health: 0,
            translation: [json!("NaN"), json!("NaN"), json!("NaN")],
        }
    }
}

/// `GET /next_frame` body for `frame_id`.
pub fn frame_metadata(frame_id: u64) -> Value {
    let telemetry = telemetry_for(frame_id);
    let [tx, ty, tz] = telemetry.translation;
    let image = format!("/images/{}", frame_id);
    json!({
        "id": frame_id,
        "frame_id": frame_id,
        "url": format!("/frames/{}/", frame_id),
        "frame_url": image,
        "image_url": image,
        "video_name": "mock_video_01",
        "session": "/session/1/",
        "translation_x": tx,
        "translation_y": ty,
        "translation_z": tz,
        "gps_health_status": telemetry.gps_health,
        "gps_health": telemetry.gps_health,
    })
}
