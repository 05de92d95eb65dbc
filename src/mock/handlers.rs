//! Mock endpoint handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{frame_metadata, FrameCatalog, MockState};

pub(super) async fn status(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "server": "aerolink mock contest server",
        "total_frames": state.total_frames(),
        "frames_served": state.frames_served(),
        "results_received": state.results_received(),
    }))
}

pub(super) async fn next_frame(State(state): State<Arc<MockState>>) -> Response {
    match state.claim_frame() {
        Some(index) => Json(frame_metadata(index)).into_response(),
        None => {
            tracing::debug!("End of stream");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

pub(super) async fn image(
    State(state): State<Arc<MockState>>,
    Path(index): Path<usize>,
) -> Response {
    match &state.catalog {
        FrameCatalog::Synthetic { count, png } if index < *count => {
            ([(header::CONTENT_TYPE, "image/png")], png.clone()).into_response()
        }
        FrameCatalog::Files(files) if index < files.len() => {
            let path = &files[index];
            match tokio::fs::read(path).await {
                Ok(data) => {
                    let mime = mime_guess::from_path(path).first_or_octet_stream();
                    ([(header::CONTENT_TYPE, mime.to_string())], data).into_response()
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read frame");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        _ => (StatusCode::NOT_FOUND, format!("Image not found: {}", index)).into_response(),
    }
}

pub(super) async fn submit_result(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let result: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response(),
    };

    let received = state.record_result();
    let count = |key: &str| result.get(key).and_then(Value::as_array).map_or(0, Vec::len);
    tracing::info!(
        received,
        frame = %result.get("frame").unwrap_or(&serde_json::Value::Null),
        objects = count("detected_objects"),
        undefined = count("detected_undefined_objects"),
        "Result received"
    );

    Json(json!({ "status": "ok" })).into_response()
}
