//! Configuration module for aerolink
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`AEROLINK_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use aerolink::config::AerolinkConfig;
//!
//! let config = AerolinkConfig::default();
//! assert_eq!(config.retry.max_retries, 3);
//!
//! let toml = r#"
//! [server]
//! base_url = "http://10.0.0.2:5000"
//! "#;
//! let config: AerolinkConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.server.base_url, "http://10.0.0.2:5000");
//! assert_eq!(config.server.submit_endpoint, "/submit_result");
//! ```

pub mod error;
pub mod logging;
pub mod server;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use server::ServerConfig;

pub use crate::backoff::RetryConfig;
pub use crate::dedup::DedupConfig;
pub use crate::payload::{ClassQuotas, PayloadConfig};
pub use crate::resilience::BreakerConfig;
pub use crate::session::SessionConfig;
pub use crate::transport::TimeoutConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AerolinkConfig {
    /// Contest server location and identity
    pub server: ServerConfig,
    /// Connect and per-operation read timeouts
    pub timeouts: TimeoutConfig,
    /// Retry attempts and backoff curve
    pub retry: RetryConfig,
    /// Circuit breaker thresholds
    pub breaker: BreakerConfig,
    /// LRU capacity and idempotency key prefix
    pub dedup: DedupConfig,
    /// Object caps
    pub payload: PayloadConfig,
    /// Loop budgets and degrade behavior
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

impl AerolinkConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `AEROLINK_*` environment overrides.
    ///
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any `AEROLINK_*` lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("AEROLINK_BASE_URL") {
            self.server.base_url = url;
        }
        if let Some(team) = lookup("AEROLINK_TEAM") {
            self.server.team = team;
        }
        if let Some(session) = lookup("AEROLINK_SESSION_ID") {
            self.server.session_id = session;
        }
        if let Some(frames) = lookup("AEROLINK_MAX_FRAMES") {
            if let Ok(n) = frames.parse() {
                self.session.max_frames = Some(n);
            }
        }

        if let Some(level) = lookup("AEROLINK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("AEROLINK_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.base_url.trim().is_empty() {
            return Err(ConfigError::invalid(
                "server.base_url",
                "base URL cannot be empty",
            ));
        }

        let timeouts = [
            ("timeouts.connect_seconds", self.timeouts.connect_seconds),
            (
                "timeouts.frame_meta_read_seconds",
                self.timeouts.frame_meta_read_seconds,
            ),
            ("timeouts.image_read_seconds", self.timeouts.image_read_seconds),
            (
                "timeouts.submit_read_seconds",
                self.timeouts.submit_read_seconds,
            ),
        ];
        for (field, value) in timeouts {
            check_positive(field, value)?;
        }

        if self.retry.max_retries == 0 {
            return Err(ConfigError::invalid(
                "retry.max_retries",
                "at least one attempt is required",
            ));
        }
        check_positive("retry.backoff_base_seconds", self.retry.backoff_base_seconds)?;
        check_positive("retry.backoff_max_seconds", self.retry.backoff_max_seconds)?;
        let jitter = self.retry.backoff_jitter_ratio;
        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::invalid(
                "retry.backoff_jitter_ratio",
                format!("must be within [0, 1], got {}", jitter),
            ));
        }

        check_positive(
            "breaker.transient_window_seconds",
            self.breaker.transient_window_seconds,
        )?;
        if self.breaker.transient_max_events == 0 {
            return Err(ConfigError::invalid(
                "breaker.transient_max_events",
                "must be at least 1",
            ));
        }
        check_non_negative(
            "breaker.open_cooldown_seconds",
            self.breaker.open_cooldown_seconds,
        )?;
        check_positive(
            "breaker.session_max_transient_seconds",
            self.breaker.session_max_transient_seconds,
        )?;

        if self.dedup.capacity == 0 {
            return Err(ConfigError::invalid(
                "dedup.capacity",
                "capacity must be non-zero",
            ));
        }
        if self.session.degrade_send_interval_frames == 0 {
            return Err(ConfigError::invalid(
                "session.degrade_send_interval_frames",
                "interval must be non-zero",
            ));
        }

        Ok(())
    }
}

fn check_positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must be a positive number of seconds, got {}", value),
        ))
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("must not be negative, got {}", value),
        ))
    }
}
