//! aerolink - resilient contest-server client for drone-vision pipelines
//!
//! The crate owns everything between a perception stack and the contest
//! server: frame fetch with retries and per-operation timeouts, result
//! shaping under the server's object caps, idempotent submission with a
//! fallback payload, and a circuit breaker that trades perception work for
//! throughput when the link degrades. [`session::SessionDriver`] ties these
//! together into the fetch/submit loop.

pub mod backoff;
pub mod cli;
pub mod coerce;
pub mod config;
pub mod dedup;
pub mod logging;
pub mod mock;
pub mod payload;
pub mod perception;
pub mod resilience;
pub mod session;
pub mod transport;
