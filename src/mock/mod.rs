//! Local contest server for rehearsals
//!
//! Serves the same four endpoints as the contest host:
//!
//! - `GET /` - session status
//! - `GET /next_frame` - frame metadata, `204 No Content` once the stream ends
//! - `GET /images/:index` - frame image
//! - `POST /submit_result` - accepts any JSON body, `400` otherwise
//!
//! # Example
//!
//! ```rust,no_run
//! use aerolink::mock::{MockConfig, MockServer};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockServer::bind(&MockConfig::default()).await?;
//! println!("listening on {}", server.local_addr()?);
//! server.serve(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

mod frames;
mod handlers;


pub use frames::{frame_metadata, telemetry_for, FrameCatalog, Telemetry, MAX_STREAM_FRAMES};

use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Maximum submit body size (1 MB).
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Mock server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub host: String,
    pub port: u16,
    /// Serve images found under this directory; synthetic frames when unset
    pub frames_dir: Option<PathBuf>,
    /// Stream length when no directory is given
    pub synthetic_frames: usize,
    pub synthetic_width: u32,
    pub synthetic_height: u32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            frames_dir: None,
            synthetic_frames: 100,
            synthetic_width: 64,
            synthetic_height: 48,
        }
    }
}

impl MockConfig {
    pub fn catalog(&self) -> Result<FrameCatalog, MockError> {
        match &self.frames_dir {
            Some(dir) => FrameCatalog::discover(dir, MAX_STREAM_FRAMES),
            None => FrameCatalog::synthetic(
                self.synthetic_frames.min(MAX_STREAM_FRAMES),
                self.synthetic_width,
                self.synthetic_height,
            ),
        }
    }
}

#[derive(Error, Debug)]
pub enum MockError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No images found under {0}")]
    NoFrames(PathBuf),

    #[error("Failed to render synthetic frame: {0}")]
    Image(#[from] image::ImageError),
}

/// Shared state behind every handler.
#[derive(Debug)]
pub struct MockState {
    catalog: FrameCatalog,
    next_index: AtomicU64,
    results_received: AtomicU64,
    started: Instant,
}

impl MockState {
    pub fn new(catalog: FrameCatalog) -> Self {
        Self {
            catalog,
            next_index: AtomicU64::new(0),
            results_received: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn total_frames(&self) -> usize {
        self.catalog.len()
    }

    /// Frames handed out so far.
    pub fn frames_served(&self) -> u64 {
        self.next_index
            .load(Ordering::SeqCst)
            .min(self.catalog.len() as u64)
    }

    pub fn results_received(&self) -> u64 {
        self.results_received.load(Ordering::SeqCst)
    }

    /// Claim the next frame index, or `None` once the stream is exhausted.
    fn claim_frame(&self) -> Option<u64> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        (index < self.catalog.len() as u64).then_some(index)
    }

    fn record_result(&self) -> u64 {
        self.results_received.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Create the mock router over `state`.
pub fn create_router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/", get(handlers::status))
        .route("/next_frame", get(handlers::next_frame))
        .route("/images/:index", get(handlers::image))
        .route("/submit_result", post(handlers::submit_result))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A bound, not yet serving, mock server.
pub struct MockServer {
    listener: TcpListener,
    state: Arc<MockState>,
}

impl MockServer {
    pub async fn bind(config: &MockConfig) -> Result<Self, MockError> {
        let catalog = config.catalog()?;
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        Ok(Self {
            listener,
            state: Arc::new(MockState::new(catalog)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> Arc<MockState> {
        Arc::clone(&self.state)
    }

    /// Serve until `cancel` fires, then log the session totals.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), MockError> {
        let state = Arc::clone(&self.state);
        tracing::info!(
            addr = %self.listener.local_addr()?,
            total_frames = state.total_frames(),
            "Mock contest server listening"
        );

        let app = create_router(Arc::clone(&state));
        axum::serve(self.listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await?;

        tracing::info!(
            elapsed_sec = %format!("{:.1}", state.started.elapsed().as_secs_f64()),
            frames_served = state.frames_served(),
            results_received = state.results_received(),
            "Mock contest server stopped"
        );
        Ok(())
    }
}
