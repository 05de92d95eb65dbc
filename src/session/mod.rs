//! Session loop driver.
//!
//! Drives two pipeline lanes against the contest server:
//!
//! - **fetch**: `GET /next_frame` for frame N+1
//! - **submit**: `POST /submit_result` for the pending result of frame N
//!
//! Each lane is at most one spawned task. The lanes only run the stateless
//! HTTP sequence and hand back an outcome; dedup sets, the resilience
//! controller and the KPI counters are owned here and only touched between
//! `select!` wakeups. Image download and perception run inline once a fetch
//! completes, while the submit lane keeps going in the background.
//!
//! At most one result is outstanding at a time (the pending slot), and at
//! most one processed frame waits behind it (the staged slot). Fetching
//! pauses while the staged slot is full.

mod ack;
mod config;
mod error;
mod kpi;


pub use ack::{apply_send_outcome, AckDecision};
pub use config::*;
pub use error::*;
pub use kpi::*;

use crate::backoff::BackoffPolicy;
use crate::config::AerolinkConfig;
use crate::dedup::{DedupStore, IdempotencyKey, SubmitPlan};
use crate::payload::{PayloadShaper, RawResult, WirePayload};
use crate::perception::{FrameContext, Perception, Position};
use crate::resilience::ResilienceController;
use crate::transport::{
    FrameFetchOutcome, FrameMeta, SendOutcome, SubmitReport, SubmitRequest, TransportClient,
    TransportSettings,
};
use serde_json::Value;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A shaped result waiting for an acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResult {
    pub frame_key: String,
    pub payload: WirePayload,
    /// Preflight replaced the payload with the safe fallback
    pub preflight_rejected: bool,
    pub degraded: bool,
    /// Remaining submit attempts for a synthesized degraded result
    pub ttl: Option<u32>,
}

enum LoopEvent {
    Cancelled,
    Fetched(Result<FrameFetchOutcome, JoinError>),
    Submitted(Result<SubmitReport, JoinError>),
    Tick,
}

/// Owns every piece of mutable session state.
#[derive(Debug)]
pub struct SessionDriver {
    config: SessionConfig,
    transport: TransportClient,
    shaper: PayloadShaper,
    dedup: DedupStore,
    controller: ResilienceController,
    perception: Perception,
    backoff: BackoffPolicy,
    team: String,
    kpi: SessionKpi,

    pending: Option<PendingResult>,
    staged: Option<PendingResult>,
    stop_reason: Option<StopReason>,
    fetching_done: bool,
    frame_index: u64,
    last_position: Position,
    fetch_not_before: Option<Instant>,
    submit_not_before: Option<Instant>,
    fetch_transient_streak: u32,
    submit_retry_streak: u32,
    consecutive_duplicates: u32,
    consecutive_rejects: u32,
}

impl SessionDriver {
    pub fn new(
        config: SessionConfig,
        transport: TransportClient,
        shaper: PayloadShaper,
        dedup: DedupStore,
        controller: ResilienceController,
        perception: Perception,
        team: impl Into<String>,
    ) -> Self {
        let backoff = transport.backoff();
        Self {
            config,
            transport,
            shaper,
            dedup,
            controller,
            perception,
            backoff,
            team: team.into(),
            kpi: SessionKpi::default(),
            pending: None,
            staged: None,
            stop_reason: None,
            fetching_done: false,
            frame_index: 0,
            last_position: Position::default(),
            fetch_not_before: None,
            submit_not_before: None,
            fetch_transient_streak: 0,
            submit_retry_streak: 0,
            consecutive_duplicates: 0,
            consecutive_rejects: 0,
        }
    }

    /// Wire a driver from the full configuration with a fresh run id.
    pub fn from_config(
        config: &AerolinkConfig,
        perception: Perception,
    ) -> Result<Self, SessionError> {
        let keys = IdempotencyKey::for_new_run(
            config.dedup.idempotency_key_prefix.clone(),
            config.server.session_id.clone(),
        );
        let settings = TransportSettings {
            base_url: config.server.base_url.clone(),
            next_frame_endpoint: config.server.next_frame_endpoint.clone(),
            submit_endpoint: config.server.submit_endpoint.clone(),
            timeouts: config.timeouts.clone(),
            retry: config.retry.clone(),
            keys,
        };
        let transport = TransportClient::new(settings)?;

        Ok(Self::new(
            config.session.clone(),
            transport,
            PayloadShaper::new(config.payload.clone(), config.server.team.clone()),
            DedupStore::from_config(&config.dedup),
            ResilienceController::new(config.breaker.clone()),
            perception,
            config.server.team.clone(),
        ))
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    /// Handshake with the server, then run the loop.
    pub async fn start(self, cancel: CancellationToken) -> Result<SessionReport, SessionError> {
        self.transport
            .start_session()
            .await
            .map_err(SessionError::Unreachable)?;
        Ok(self.run(cancel).await)
    }

    /// Run until end of stream, the frame budget, cancellation or an abort
    /// threshold, and return the session report.
    pub async fn run(mut self, cancel: CancellationToken) -> SessionReport {
        let started = Instant::now();
        tracing::info!(
            base_url = %self.transport.base_url(),
            run_id = %self.transport.keys().run_id(),
            max_frames = ?self.config.max_frames,
            "Session started"
        );

        let mut fetch_lane: Option<JoinHandle<FrameFetchOutcome>> = None;
        let mut submit_lane: Option<JoinHandle<SubmitReport>> = None;

        loop {
            if cancel.is_cancelled() {
                self.stop(StopReason::Cancelled);
            }
            if let Some(detail) = self.controller.should_abort_session() {
                self.stop(StopReason::TransientBudget { detail });
            }
            if self.stop_reason.as_ref().is_some_and(StopReason::is_abort) {
                break;
            }
            self.kpi.timeouts += self.transport.take_timeout_counts();

            let now = Instant::now();
            if self.pending.is_none() {
                self.pending = self.staged.take();
            }
            if submit_lane.is_none() && self.submit_not_before.is_none_or(|t| now >= t) {
                submit_lane = self.dispatch_submit();
            }
            if fetch_lane.is_none() && self.may_fetch(now) {
                if self.controller.before_fetch() {
                    let transport = self.transport.clone();
                    fetch_lane = Some(tokio::spawn(async move { transport.next_frame().await }));
                } else {
                    let wait = self
                        .controller
                        .open_cooldown_remaining()
                        .max(self.config.idle_poll());
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "Breaker open, fetch deferred");
                    self.fetch_not_before = Some(now + wait);
                }
            }

            if fetch_lane.is_none()
                && submit_lane.is_none()
                && self.pending.is_none()
                && self.staged.is_none()
                && self.fetching_done
            {
                break;
            }

            let wake_at = self.next_wake(fetch_lane.is_none() && submit_lane.is_none());
            let event = tokio::select! {
                _ = cancel.cancelled() => LoopEvent::Cancelled,
                res = join_lane(&mut fetch_lane) => LoopEvent::Fetched(res),
                res = join_lane(&mut submit_lane) => LoopEvent::Submitted(res),
                _ = sleep_until(wake_at) => LoopEvent::Tick,
            };

            match event {
                LoopEvent::Cancelled => self.stop(StopReason::Cancelled),
                LoopEvent::Fetched(res) => {
                    fetch_lane = None;
                    let outcome = res.unwrap_or_else(|e| FrameFetchOutcome::TransientError {
                        reason: format!("fetch lane failed: {}", e),
                    });
                    self.on_fetch(outcome).await;
                }
                LoopEvent::Submitted(res) => {
                    submit_lane = None;
                    let report = res.unwrap_or_else(|e| self.lane_failure_report(e));
                    self.on_submit(report);
                }
                LoopEvent::Tick => {}
            }
        }

        // In-flight calls finish on their own timeouts; only the submit
        // outcome is still worth recording.
        if let Some(handle) = fetch_lane.take() {
            let _ = handle.await;
        }
        if let Some(handle) = submit_lane.take() {
            if let Ok(report) = handle.await {
                self.on_submit(report);
            }
        }
        self.kpi.timeouts += self.transport.take_timeout_counts();

        let report = SessionReport {
            run_id: self.transport.keys().run_id().to_string(),
            stop_reason: self.stop_reason.take().unwrap_or(StopReason::EndOfStream),
            kpi: self.kpi.clone(),
            resilience: self.controller.finalize(),
            elapsed: started.elapsed(),
        };
        report.log();
        report
    }

    fn may_fetch(&self, now: Instant) -> bool {
        !self.fetching_done
            && self.stop_reason.is_none()
            && self.staged.is_none()
            && self.fetch_not_before.is_none_or(|t| now >= t)
    }

    /// Earliest deadline worth waking for. With both lanes idle there is
    /// always one, so the select never parks forever.
    fn next_wake(&self, lanes_idle: bool) -> Option<Instant> {
        let now = Instant::now();
        let deadlines = [
            self.fetch_not_before.filter(|_| !self.fetching_done),
            self.submit_not_before.filter(|_| self.pending.is_some()),
            // wake in time to notice the transient budget running out
            self.controller
                .abort_budget_remaining()
                .map(|left| now + left.max(self.config.idle_poll())),
        ];
        let earliest = deadlines.into_iter().flatten().min();
        if earliest.is_none() && lanes_idle {
            Some(now + self.config.idle_poll())
        } else {
            earliest
        }
    }

    fn stop(&mut self, reason: StopReason) {
        if self.stop_reason.as_ref().is_some_and(StopReason::is_abort) {
            return;
        }
        if self.stop_reason.is_some() && !reason.is_abort() {
            return;
        }
        tracing::info!(reason = %reason, "Session stopping");
        self.fetching_done = true;
        self.stop_reason = Some(reason);
    }

    fn dispatch_submit(&mut self) -> Option<JoinHandle<SubmitReport>> {
        loop {
            let pending = self.pending.as_ref()?;
            let force_fallback = match self.dedup.plan_submit(&pending.frame_key) {
                SubmitPlan::AlreadySubmitted => {
                    tracing::debug!(
                        frame_id = %pending.frame_key,
                        "Frame already acknowledged, dropping duplicate result"
                    );
                    self.kpi.duplicate_submits_skipped += 1;
                    self.pending = self.staged.take();
                    continue;
                }
                SubmitPlan::Send { force_fallback } => force_fallback || pending.preflight_rejected,
            };

            let request = SubmitRequest {
                frame_key: pending.frame_key.clone(),
                payload: pending.payload.clone(),
                force_fallback,
            };
            let transport = self.transport.clone();
            return Some(tokio::spawn(async move {
                transport.submit_attempts(request).await
            }));
        }
    }

    async fn on_fetch(&mut self, outcome: FrameFetchOutcome) {
        match outcome.with_dedup(&mut self.dedup) {
            FrameFetchOutcome::Ok { meta, is_duplicate } => {
                self.fetch_transient_streak = 0;
                self.fetch_not_before = None;
                self.kpi.frames_fetched += 1;

                if is_duplicate {
                    self.kpi.duplicate_frames += 1;
                    self.consecutive_duplicates += 1;
                    tracing::warn!(
                        frame_id = %meta.ident,
                        consecutive = self.consecutive_duplicates,
                        "Duplicate frame from server"
                    );
                    if self.consecutive_duplicates >= self.config.max_consecutive_duplicates {
                        self.stop(StopReason::ConsecutiveDuplicates {
                            count: self.consecutive_duplicates,
                        });
                        return;
                    }
                } else {
                    self.consecutive_duplicates = 0;
                }

                let result = self.process_frame(&meta).await;
                self.staged = Some(result);

                if let Some(max) = self.config.max_frames {
                    if self.kpi.frames_fetched >= max {
                        self.stop(StopReason::MaxFrames {
                            frames: self.kpi.frames_fetched,
                        });
                    }
                }
            }
            FrameFetchOutcome::EndOfStream => self.stop(StopReason::EndOfStream),
            FrameFetchOutcome::FatalError {
                reason,
                http_status,
            } => {
                tracing::error!(reason = %reason, http_status = ?http_status, "Fatal frame fetch error");
                self.stop(StopReason::FetchFatal {
                    reason,
                    http_status,
                });
            }
            FrameFetchOutcome::TransientError { reason } => {
                self.kpi.fetch_transient_errors += 1;
                self.fetch_transient_streak += 1;
                self.controller.on_fetch_transient();
                if self.fetch_transient_streak == self.config.transient_soft_budget + 1 {
                    tracing::warn!(
                        streak = self.fetch_transient_streak,
                        elapsed_transient_sec = %format!("{:.1}", self.controller.transient_wall_time()),
                        "Fetch transient errors past soft budget, continuing"
                    );
                }
                let delay = self.backoff.delay(self.fetch_transient_streak);
                tracing::warn!(
                    reason = %reason,
                    streak = self.fetch_transient_streak,
                    delay_ms = delay.as_millis() as u64,
                    "Frame fetch failed, backing off"
                );
                self.fetch_not_before = Some(Instant::now() + delay);
            }
        }
    }

    /// Turn frame metadata into a shaped pending result.
    async fn process_frame(&mut self, meta: &FrameMeta) -> PendingResult {
        let index = self.frame_index;
        self.frame_index += 1;

        let degraded = self.controller.is_degraded();
        let full = if degraded {
            let n = self.controller.record_degraded_frame();
            !self.config.degrade_fetch_only
                || n % self.config.degrade_send_interval_frames.max(1) == 0
        } else {
            true
        };

        if meta.gps_healthy() {
            self.kpi.mode_gps += 1;
        } else {
            self.kpi.mode_optical_flow += 1;
        }

        let (raw, dims, ttl) = if full {
            self.kpi.frames_processed += 1;
            let image = self.transport.download_image(meta).await;
            let ctx = FrameContext {
                index,
                meta,
                image: image.as_ref(),
            };
            let analysis = self.perception.process(&ctx);
            self.last_position = analysis.position;
            let raw = self.raw_result(
                meta,
                analysis.detections.iter().map(|d| d.to_raw()).collect(),
                analysis.position,
                analysis.undefined.iter().map(|u| u.to_raw()).collect(),
            );
            (raw, ctx.dims(), None)
        } else {
            self.kpi.frames_skipped_degraded += 1;
            let position = if meta.gps_healthy() {
                let t = meta.translation;
                Position {
                    x: t.translation_x,
                    y: t.translation_y,
                    z: t.translation_z,
                }
            } else {
                self.last_position
            };
            self.last_position = position;
            tracing::debug!(frame_id = %meta.ident, "Degraded frame, skipping inference");
            let raw = self.raw_result(meta, Vec::new(), position, Vec::new());
            (raw, None, Some(self.config.degraded_result_ttl.max(1)))
        };

        let preflight = self.shaper.preflight(&raw, dims);
        if preflight.rejected_to_fallback {
            self.kpi.preflight_rejected += 1;
        }
        if preflight.clipped {
            self.kpi.payload_clipped += 1;
        }

        PendingResult {
            frame_key: meta.key(),
            payload: preflight.payload,
            preflight_rejected: preflight.rejected_to_fallback,
            degraded,
            ttl,
        }
    }

    fn raw_result(
        &self,
        meta: &FrameMeta,
        objects: Vec<crate::payload::RawObject>,
        position: Position,
        undefined: Vec<crate::payload::RawUndefinedObject>,
    ) -> RawResult {
        RawResult {
            id: serde_json::to_value(&meta.wire_id).ok(),
            user: Some(Value::from(meta.user.clone().unwrap_or_else(|| self.team.clone()))),
            frame: serde_json::to_value(&meta.wire_frame).ok(),
            detected_objects: Some(objects),
            detected_translations: Some(vec![position.to_raw()]),
            detected_undefined_objects: undefined,
        }
    }

    fn on_submit(&mut self, report: SubmitReport) {
        report.record(&mut self.dedup);
        let decision = apply_send_outcome(report.outcome, self.pending.take(), &mut self.kpi);

        if decision.success {
            self.controller.on_success_cycle();
            self.consecutive_rejects = 0;
            self.submit_retry_streak = 0;
            self.submit_not_before = None;
        } else if report.outcome == SendOutcome::PermanentRejected {
            self.consecutive_rejects += 1;
            self.submit_retry_streak = 0;
            self.submit_not_before = None;
            tracing::warn!(
                frame_id = %report.frame_key,
                consecutive = self.consecutive_rejects,
                "Result permanently rejected"
            );
            if self.consecutive_rejects >= self.config.max_consecutive_permanent_rejects {
                self.stop(StopReason::ConsecutivePermanentRejects {
                    count: self.consecutive_rejects,
                });
            }
        } else {
            self.controller.on_ack_failure();
            self.submit_retry_streak += 1;
            let delay = self.backoff.delay(self.submit_retry_streak);
            self.submit_not_before = Some(Instant::now() + delay);
            tracing::warn!(
                frame_id = %report.frame_key,
                streak = self.submit_retry_streak,
                delay_ms = delay.as_millis() as u64,
                "Submit failed, result kept for retry"
            );
        }

        self.pending = match decision.pending {
            Some(pending) => self.age_pending(pending),
            None => None,
        };
        // a dropped result's backoff must not delay the next one
        if self.pending.is_none() {
            self.submit_retry_streak = 0;
            self.submit_not_before = None;
        }
    }

    /// Spend one TTL unit of a degraded result; drop it when none is left.
    fn age_pending(&mut self, mut pending: PendingResult) -> Option<PendingResult> {
        if !pending.degraded {
            return Some(pending);
        }
        let Some(ttl) = pending.ttl else {
            return Some(pending);
        };
        let remaining = ttl.saturating_sub(1);
        if remaining == 0 {
            tracing::info!(frame_id = %pending.frame_key, "Stale degraded result dropped");
            self.kpi.stale_results_dropped += 1;
            return None;
        }
        pending.ttl = Some(remaining);
        Some(pending)
    }

    fn lane_failure_report(&self, e: JoinError) -> SubmitReport {
        tracing::error!(error = %e, "Submit lane failed");
        SubmitReport {
            frame_key: self
                .pending
                .as_ref()
                .map(|p| p.frame_key.clone())
                .unwrap_or_default(),
            outcome: SendOutcome::RetryableFailure,
            posts: 0,
            saw_client_error: false,
            last_status: None,
        }
    }
}

/// Resolve a lane; pends forever when the lane is idle.
async fn join_lane<T>(lane: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match lane.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
