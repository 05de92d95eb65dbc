//! Session startup errors.

use crate::transport::TransportError;
use thiserror::Error;

/// Failures that prevent the session loop from starting.
///
/// Once the loop runs, every failure is folded into a stop reason instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("contest server unreachable: {0}")]
    Unreachable(TransportError),
}
