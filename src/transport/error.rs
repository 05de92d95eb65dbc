//! Transport error classification.

use std::fmt;
use thiserror::Error;

/// Operation classes with independent timeout budgets and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Handshake,
    FrameMeta,
    Image,
    Submit,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Handshake => "handshake",
            Operation::FrameMeta => "frame_meta",
            Operation::Image => "image",
            Operation::Submit => "submit",
        };
        f.write_str(name)
    }
}

/// Failure of a single HTTP exchange.
///
/// Never escapes a fetch or submit cycle: the client folds these into
/// [`super::FrameFetchOutcome`] and [`super::SendOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connect or read budget exhausted
    #[error("{op} request timed out")]
    Timeout { op: Operation },

    /// Connection refused, reset, DNS failure and similar
    #[error("connection failed: {0}")]
    Connect(String),

    /// Unexpected HTTP status
    #[error("HTTP error: {0}")]
    Http(u16),

    /// Response body does not match the expected schema
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Body could not be read or decoded
    #[error("decode failed: {0}")]
    Decode(String),
}

impl TransportError {
    /// Timeouts, connection errors and 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout { .. } | TransportError::Connect(_) => true,
            TransportError::Http(status) => (500..600).contains(status),
            TransportError::InvalidSchema(_) | TransportError::Decode(_) => false,
        }
    }

    pub fn classify(e: reqwest::Error, op: Operation) -> Self {
        if e.is_timeout() {
            TransportError::Timeout { op }
        } else if e.is_decode() || e.is_body() {
            TransportError::Decode(e.to_string())
        } else {
            // Everything else is treated as a connection failure
            TransportError::Connect(e.to_string())
        }
    }
}
