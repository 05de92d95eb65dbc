//! Circuit breaker and degrade controller.
//!
//! ```text
//! Normal --transient--> Degraded --burst--> Open --cooldown--> Degraded (half-open)
//!    ^                      |                                      |
//!    +-------success--------+------------------success------------+
//! ```
//!
//! Burst detection uses two short sliding windows (fetch failures and ack
//! failures) counted against `transient_max_events`. Independently, wall-clock
//! time spent outside `Normal` accumulates across the whole session; once it
//! exceeds `session_max_transient_seconds` the session should be abandoned.
//!
//! Time comes from `tokio::time::Instant`, so tests can drive the clock with
//! `tokio::time::pause` and `advance`.

mod config;
mod state;


pub use config::*;
pub use state::*;

use crate::coerce::saturating_secs;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Owned by the session driver; never shared with the worker lanes.
#[derive(Debug)]
pub struct ResilienceController {
    config: BreakerConfig,
    state: ResilienceState,
    stats: ResilienceStats,
    fetch_events: VecDeque<Instant>,
    ack_events: VecDeque<Instant>,
    /// Start of the current non-normal interval
    non_normal_since: Option<Instant>,
    open_until: Option<Instant>,
    /// Degraded frames since the last success cycle
    degrade_frame_counter: u32,
}

impl ResilienceController {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: ResilienceState::Normal,
            stats: ResilienceStats::default(),
            fetch_events: VecDeque::new(),
            ack_events: VecDeque::new(),
            non_normal_since: None,
            open_until: None,
            degrade_frame_counter: 0,
        }
    }

    pub fn state(&self) -> ResilienceState {
        self.state
    }

    pub fn stats(&self) -> &ResilienceStats {
        &self.stats
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// True in `Degraded` or `Open`.
    pub fn is_degraded(&self) -> bool {
        self.state != ResilienceState::Normal
    }

    /// A frame fetch ran out of retries.
    pub fn on_fetch_transient(&mut self) {
        let now = Instant::now();
        let window = self.config.window();
        let events = push_event(&mut self.fetch_events, now, window);
        self.on_transient(events, "fetch_transient_storm", "fetch_transient_detected", now);
    }

    /// A submit cycle ended in `RetryableFailure`.
    pub fn on_ack_failure(&mut self) {
        let now = Instant::now();
        let window = self.config.window();
        let events = push_event(&mut self.ack_events, now, window);
        self.on_transient(events, "ack_transient_storm", "ack_transient_detected", now);
    }

    /// A result was acknowledged. Clears both windows and recovers to `Normal`.
    pub fn on_success_cycle(&mut self) {
        let now = Instant::now();
        if self.state != ResilienceState::Normal {
            self.fetch_events.clear();
            self.ack_events.clear();
            self.open_until = None;
            self.transition(ResilienceState::Normal, "fetch_and_ack_success", now);
        } else {
            let window = self.config.window();
            prune(&mut self.fetch_events, now, window);
            prune(&mut self.ack_events, now, window);
        }
        self.degrade_frame_counter = 0;
    }

    /// May the driver fetch now? While `Open` this refuses until the cooldown
    /// elapses, then moves to half-open `Degraded` and allows the probe.
    pub fn before_fetch(&mut self) -> bool {
        if self.state != ResilienceState::Open {
            return true;
        }
        let now = Instant::now();
        if self.open_until.is_some_and(|until| now < until) {
            return false;
        }
        self.transition(ResilienceState::Degraded, "open_cooldown_elapsed_half_open", now);
        true
    }

    /// Time left before a refused fetch may be retried.
    pub fn open_cooldown_remaining(&self) -> Duration {
        match (self.state, self.open_until) {
            (ResilienceState::Open, Some(until)) => until.saturating_duration_since(Instant::now()),
            _ => Duration::ZERO,
        }
    }

    /// Count a frame handled in degrade mode. Returns the number of degraded
    /// frames since the last success cycle, starting at 1.
    pub fn record_degraded_frame(&mut self) -> u32 {
        self.degrade_frame_counter += 1;
        self.stats.degrade_frames += 1;
        self.degrade_frame_counter
    }

    /// Cumulative non-normal seconds, including the interval still open.
    pub fn transient_wall_time(&self) -> f64 {
        self.wall_time_at(Instant::now())
    }

    /// Abort reason once cumulative non-normal time exceeds the session
    /// budget. Always `None` while `Normal`.
    pub fn should_abort_session(&self) -> Option<String> {
        if self.state == ResilienceState::Normal {
            return None;
        }
        let wall_time = self.transient_wall_time();
        let limit = self.config.session_max_transient_seconds;
        if wall_time > limit {
            Some(format!(
                "transient wall time {:.1}s exceeds limit {:.1}s",
                wall_time, limit
            ))
        } else {
            None
        }
    }

    /// Time until the session budget runs out, while not `Normal`.
    pub fn abort_budget_remaining(&self) -> Option<Duration> {
        if self.state == ResilienceState::Normal {
            return None;
        }
        let left = self.config.session_max_transient_seconds - self.transient_wall_time();
        Some(saturating_secs(left))
    }

    /// Close the open interval, if any, and return the final statistics.
    pub fn finalize(&mut self) -> ResilienceStats {
        if let Some(since) = self.non_normal_since.take() {
            self.stats.transient_wall_time_seconds +=
                Instant::now().saturating_duration_since(since).as_secs_f64();
        }
        self.stats.clone()
    }

    fn on_transient(
        &mut self,
        window_events: usize,
        open_reason: &str,
        degrade_reason: &str,
        now: Instant,
    ) {
        if window_events >= self.config.transient_max_events {
            self.open_until = Some(now + self.config.cooldown());
            if self.state != ResilienceState::Open {
                self.stats.breaker_open_count += 1;
                metrics::counter!("aerolink_breaker_open_total").increment(1);
                self.transition(ResilienceState::Open, open_reason, now);
            }
        } else if self.state == ResilienceState::Normal {
            self.transition(ResilienceState::Degraded, degrade_reason, now);
        }
    }

    fn transition(&mut self, to: ResilienceState, reason: &str, now: Instant) {
        let from = self.state;
        if from == to {
            return;
        }

        match (from, to) {
            (ResilienceState::Normal, _) => {
                self.non_normal_since = Some(now);
            }
            (_, ResilienceState::Normal) => {
                if let Some(since) = self.non_normal_since.take() {
                    self.stats.transient_wall_time_seconds +=
                        now.saturating_duration_since(since).as_secs_f64();
                }
                self.stats.recovered_count += 1;
            }
            _ => {}
        }
        if to == ResilienceState::Degraded {
            self.stats.degrade_entries += 1;
        }

        self.state = to;
        tracing::info!(
            breaker_state = %to,
            previous_state = %from,
            reason,
            window_events_fetch = self.fetch_events.len(),
            window_events_ack = self.ack_events.len(),
            elapsed_transient_sec = %format!("{:.1}", self.wall_time_at(now)),
            "Resilience transition"
        );
    }

    fn wall_time_at(&self, now: Instant) -> f64 {
        let open = self
            .non_normal_since
            .map(|since| now.saturating_duration_since(since).as_secs_f64())
            .unwrap_or(0.0);
        self.stats.transient_wall_time_seconds + open
    }
}

/// Append `now`, drop events older than `window`, return the window size.
fn push_event(events: &mut VecDeque<Instant>, now: Instant, window: Duration) -> usize {
    events.push_back(now);
    prune(events, now, window);
    events.len()
}

fn prune(events: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = events.front() {
        if now.saturating_duration_since(oldest) > window {
            events.pop_front();
        } else {
            break;
        }
    }
}
