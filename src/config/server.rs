//! Contest server connection settings

use serde::{Deserialize, Serialize};

/// Where the contest server lives and who we are to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub next_frame_endpoint: String,
    pub submit_endpoint: String,
    /// Sent as `user` when the server does not echo one
    pub team: String,
    /// Second segment of every idempotency key
    pub session_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            next_frame_endpoint: "/next_frame".to_string(),
            submit_endpoint: "/submit_result".to_string(),
            team: "aerolink".to_string(),
            session_id: "session".to_string(),
        }
    }
}
