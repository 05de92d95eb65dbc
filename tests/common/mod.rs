//! Shared helpers for aerolink integration tests.

#![allow(dead_code)]

use aerolink::config::AerolinkConfig;
use aerolink::mock::{MockConfig, MockServer, MockState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Configuration tuned for tests: millisecond backoff, short timeouts.
pub fn fast_config(base_url: &str) -> AerolinkConfig {
    let mut config = AerolinkConfig::default();
    config.server.base_url = base_url.to_string();
    config.server.team = "test-team".to_string();
    config.server.session_id = "it".to_string();
    config.retry.backoff_base_seconds = 0.01;
    config.retry.backoff_max_seconds = 0.05;
    config.retry.backoff_jitter_ratio = 0.0;
    config.timeouts.connect_seconds = 0.5;
    config.timeouts.frame_meta_read_seconds = 1.0;
    config.timeouts.image_read_seconds = 1.0;
    config.timeouts.submit_read_seconds = 1.0;
    config.session.idle_poll_ms = 5;
    config
}

/// A running in-process mock contest server, stopped on drop.
pub struct RunningMock {
    pub base_url: String,
    pub state: Arc<MockState>,
    cancel: CancellationToken,
}

impl Drop for RunningMock {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start the mock on an ephemeral port with `frames` synthetic frames.
pub async fn spawn_mock(frames: usize) -> RunningMock {
    let server = MockServer::bind(&MockConfig {
        port: 0,
        synthetic_frames: frames,
        ..Default::default()
    })
    .await
    .unwrap();
    let base_url = format!("http://{}", server.local_addr().unwrap());
    let state = server.state();
    let cancel = CancellationToken::new();
    tokio::spawn(server.serve(cancel.clone()));
    RunningMock {
        base_url,
        state,
        cancel,
    }
}
