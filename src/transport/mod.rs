//! Contest server transport.
//!
//! Three remote operations, each with its own read timeout and a bounded
//! retry loop:
//!
//! - `GET {base}/next_frame` → [`FrameFetchOutcome`]
//! - `GET {image_url}` → decoded image or `None`
//! - `POST {base}/submit_result` → [`SendOutcome`]
//!
//! The client is cheap to clone and holds no per-session state apart from
//! the timeout counters, so the session driver can hand clones to its fetch
//! and submit lanes. Dedup bookkeeping stays with the caller.

mod config;
mod error;
mod outcome;
mod parser;


pub use config::*;
pub use error::*;
pub use outcome::*;
pub use parser::{parse_frame_meta, resolve_url, FrameMeta};

use crate::backoff::{BackoffPolicy, RetryConfig};
use crate::dedup::{DedupStore, IdempotencyKey, SubmitPlan};
use crate::payload::{PayloadShaper, WirePayload};
use image::DynamicImage;
use reqwest::StatusCode;
use std::sync::Arc;

/// Header carrying `prefix:session:run:frame` on every submit.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Everything the transport needs to know about the server.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub base_url: String,
    pub next_frame_endpoint: String,
    pub submit_endpoint: String,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub keys: IdempotencyKey,
}

impl TransportSettings {
    /// Settings with default endpoints, timeouts and retry policy.
    pub fn new(base_url: impl Into<String>, keys: IdempotencyKey) -> Self {
        Self {
            base_url: base_url.into(),
            next_frame_endpoint: "/next_frame".to_string(),
            submit_endpoint: "/submit_result".to_string(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            keys,
        }
    }
}

/// HTTP client for the contest server.
#[derive(Debug, Clone)]
pub struct TransportClient {
    client: reqwest::Client,
    base_url: String,
    next_frame_url: String,
    submit_url: String,
    timeouts: TimeoutConfig,
    max_retries: u32,
    backoff: BackoffPolicy,
    keys: IdempotencyKey,
    timeouts_seen: Arc<TimeoutCounters>,
}

impl TransportClient {
    /// Build a client with a pooled connection and the shared connect timeout.
    pub fn new(settings: TransportSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.timeouts.connect())
            .build()?;
        Ok(Self::with_client(client, settings))
    }

    /// Create a client around an existing `reqwest::Client` (for testing).
    pub fn with_client(client: reqwest::Client, settings: TransportSettings) -> Self {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        Self {
            client,
            next_frame_url: resolve_url(&base_url, &settings.next_frame_endpoint),
            submit_url: resolve_url(&base_url, &settings.submit_endpoint),
            base_url,
            timeouts: settings.timeouts,
            max_retries: settings.retry.max_retries.max(1),
            backoff: settings.retry.policy(),
            keys: settings.keys,
            timeouts_seen: Arc::new(TimeoutCounters::default()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn keys(&self) -> &IdempotencyKey {
        &self.keys
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Drain the per-operation timeout counters.
    pub fn take_timeout_counts(&self) -> TimeoutCounts {
        self.timeouts_seen.take()
    }

    /// Probe `GET {base}/` until it answers 200 or retries run out.
    pub async fn start_session(&self) -> Result<(), TransportError> {
        let url = format!("{}/", self.base_url);
        let mut last_error = TransportError::Connect("no attempt made".to_string());

        for attempt in 1..=self.max_retries {
            let result = self
                .client
                .get(&url)
                .timeout(self.timeouts.request(Operation::Handshake))
                .send()
                .await;

            match result {
                Ok(resp) if resp.status() == StatusCode::OK => {
                    tracing::info!(base_url = %self.base_url, "Contest server reachable");
                    return Ok(());
                }
                Ok(resp) => {
                    tracing::warn!(
                        status = resp.status().as_u16(),
                        attempt,
                        max_retries = self.max_retries,
                        "Unexpected handshake response"
                    );
                    last_error = TransportError::Http(resp.status().as_u16());
                }
                Err(e) => {
                    let error = self.classify(e, Operation::Handshake);
                    tracing::warn!(
                        error = %error,
                        attempt,
                        max_retries = self.max_retries,
                        "Handshake failed"
                    );
                    last_error = error;
                }
            }

            self.pause(attempt).await;
        }

        Err(last_error)
    }

    /// Fetch the next frame's metadata. The duplicate flag is always false;
    /// see [`FrameFetchOutcome::with_dedup`].
    pub async fn next_frame(&self) -> FrameFetchOutcome {
        let mut last_reason = String::new();

        for attempt in 1..=self.max_retries {
            let result = self
                .client
                .get(&self.next_frame_url)
                .timeout(self.timeouts.request(Operation::FrameMeta))
                .send()
                .await;

            let error = match result {
                Ok(resp) => match resp.status() {
                    StatusCode::OK => return self.parse_frame_response(resp).await,
                    StatusCode::NO_CONTENT => {
                        tracing::info!("Frame stream finished (204 No Content)");
                        return FrameFetchOutcome::EndOfStream;
                    }
                    status if status.is_server_error() => TransportError::Http(status.as_u16()),
                    status => {
                        tracing::error!(status = status.as_u16(), "Unexpected frame response");
                        return FrameFetchOutcome::FatalError {
                            reason: "unexpected_http".to_string(),
                            http_status: Some(status.as_u16()),
                        };
                    }
                },
                Err(e) => self.classify(e, Operation::FrameMeta),
            };

            tracing::warn!(
                error = %error,
                attempt,
                max_retries = self.max_retries,
                "Frame fetch transient error"
            );
            last_reason = error.to_string();
            self.pause(attempt).await;
        }

        FrameFetchOutcome::TransientError {
            reason: format!("retries exhausted: {}", last_reason),
        }
    }

    /// Fetch the next frame and flag it against the seen set.
    pub async fn fetch_frame(&self, dedup: &mut DedupStore) -> FrameFetchOutcome {
        self.next_frame().await.with_dedup(dedup)
    }

    /// Download and decode a frame image. Never fails hard: `None` means
    /// the caller proceeds without an image.
    pub async fn download_image(&self, meta: &FrameMeta) -> Option<DynamicImage> {
        let Some(url) = meta.image_url.as_deref() else {
            tracing::warn!(frame_id = %meta.ident, "Frame has no image URL");
            return None;
        };

        for attempt in 1..=self.max_retries {
            let result = self
                .client
                .get(url)
                .timeout(self.timeouts.request(Operation::Image))
                .send()
                .await;

            let error = match result {
                Ok(resp) if resp.status() == StatusCode::OK => match resp.bytes().await {
                    Ok(bytes) => {
                        return match image::load_from_memory(&bytes) {
                            Ok(img) => {
                                tracing::debug!(
                                    frame_id = %meta.ident,
                                    width = img.width(),
                                    height = img.height(),
                                    "Image downloaded"
                                );
                                Some(img)
                            }
                            Err(e) => {
                                tracing::error!(frame_id = %meta.ident, error = %e, "Image decode failed");
                                None
                            }
                        };
                    }
                    Err(e) => self.classify(e, Operation::Image),
                },
                Ok(resp) => TransportError::Http(resp.status().as_u16()),
                Err(e) => self.classify(e, Operation::Image),
            };

            tracing::warn!(
                frame_id = %meta.ident,
                error = %error,
                attempt,
                max_retries = self.max_retries,
                "Image download failed"
            );
            self.pause(attempt).await;
        }

        None
    }

    /// Run one submit cycle without touching dedup state.
    ///
    /// A 4xx on the rich payload triggers exactly one extra POST of the safe
    /// fallback, outside the retry budget. 5xx and timeouts are retried with
    /// backoff; if the fallback path also hits a transient failure the
    /// remaining attempts keep sending the fallback.
    pub async fn submit_attempts(&self, request: SubmitRequest) -> SubmitReport {
        let SubmitRequest {
            frame_key,
            payload,
            force_fallback,
        } = request;
        let header = self.keys.for_frame(&frame_key);
        let fallback = PayloadShaper::fallback_of(&payload);

        let mut report = SubmitReport {
            frame_key,
            outcome: SendOutcome::RetryableFailure,
            posts: 0,
            saw_client_error: false,
            last_status: None,
        };
        let mut sending_fallback = force_fallback;

        for attempt in 1..=self.max_retries {
            let body = if sending_fallback { &fallback } else { &payload };
            let result = self.post(body, &header, &mut report).await;

            match result {
                Ok(status) if status.is_success() => {
                    report.outcome = ack_for(sending_fallback);
                    return self.finish(report);
                }
                Ok(status) if status.is_client_error() => {
                    report.saw_client_error = true;
                    if sending_fallback {
                        report.outcome = SendOutcome::PermanentRejected;
                        return self.finish(report);
                    }

                    tracing::warn!(
                        frame_id = %report.frame_key,
                        status = status.as_u16(),
                        "Submit rejected, retrying once with fallback payload"
                    );
                    sending_fallback = true;
                    match self.post(&fallback, &header, &mut report).await {
                        Ok(status) if status.is_success() => {
                            report.outcome = SendOutcome::FallbackAcked;
                            return self.finish(report);
                        }
                        Ok(status) if status.is_client_error() => {
                            report.outcome = SendOutcome::PermanentRejected;
                            return self.finish(report);
                        }
                        Ok(status) => tracing::warn!(
                            frame_id = %report.frame_key,
                            status = status.as_u16(),
                            "Fallback submit failed transiently"
                        ),
                        Err(error) => tracing::warn!(
                            frame_id = %report.frame_key,
                            error = %error,
                            "Fallback submit failed transiently"
                        ),
                    }
                }
                Ok(status) => tracing::warn!(
                    frame_id = %report.frame_key,
                    status = status.as_u16(),
                    attempt,
                    max_retries = self.max_retries,
                    "Submit failed"
                ),
                Err(error) => tracing::warn!(
                    frame_id = %report.frame_key,
                    error = %error,
                    attempt,
                    max_retries = self.max_retries,
                    "Submit failed"
                ),
            }

            self.pause(attempt).await;
        }

        report.outcome = SendOutcome::RetryableFailure;
        self.finish(report)
    }

    /// Submit a result with dedup bookkeeping: skip frames already acked,
    /// honor the force-fallback pin, and record what the cycle observed.
    pub async fn submit_result(
        &self,
        dedup: &mut DedupStore,
        frame_key: &str,
        payload: WirePayload,
    ) -> SendOutcome {
        let force_fallback = match dedup.plan_submit(frame_key) {
            SubmitPlan::AlreadySubmitted => {
                tracing::debug!(frame_id = %frame_key, "Frame already acknowledged, skipping submit");
                return SendOutcome::Acked;
            }
            SubmitPlan::Send { force_fallback } => force_fallback,
        };

        let report = self
            .submit_attempts(SubmitRequest {
                frame_key: frame_key.to_string(),
                payload,
                force_fallback,
            })
            .await;
        report.record(dedup);
        report.outcome
    }

    async fn parse_frame_response(&self, resp: reqwest::Response) -> FrameFetchOutcome {
        let body: serde_json::Value = match resp.json().await {
            Ok(body) => body,
            Err(e) => {
                let error = self.classify(e, Operation::FrameMeta);
                tracing::error!(error = %error, "Frame metadata is not valid JSON");
                return FrameFetchOutcome::FatalError {
                    reason: "json_parse".to_string(),
                    http_status: Some(200),
                };
            }
        };

        match parse_frame_meta(&body, &self.base_url) {
            Ok(meta) => FrameFetchOutcome::Ok {
                meta: Box::new(meta),
                is_duplicate: false,
            },
            Err(error) => {
                tracing::error!(error = %error, "Invalid frame schema from server");
                FrameFetchOutcome::FatalError {
                    reason: "invalid_frame_schema".to_string(),
                    http_status: Some(200),
                }
            }
        }
    }

    async fn post(
        &self,
        body: &WirePayload,
        idempotency_key: &str,
        report: &mut SubmitReport,
    ) -> Result<StatusCode, TransportError> {
        report.posts += 1;
        let result = self
            .client
            .post(&self.submit_url)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .timeout(self.timeouts.request(Operation::Submit))
            .json(body)
            .send()
            .await;

        match result {
            Ok(resp) => {
                let status = resp.status();
                report.last_status = Some(status.as_u16());
                Ok(status)
            }
            Err(e) => Err(self.classify(e, Operation::Submit)),
        }
    }

    fn finish(&self, report: SubmitReport) -> SubmitReport {
        tracing::debug!(
            frame_id = %report.frame_key,
            outcome = ?report.outcome,
            posts = report.posts,
            last_status = ?report.last_status,
            "Submit cycle finished"
        );
        metrics::counter!(
            "aerolink_submit_cycles_total",
            "outcome" => outcome_label(report.outcome)
        )
        .increment(1);
        report
    }

    fn classify(&self, e: reqwest::Error, op: Operation) -> TransportError {
        let error = TransportError::classify(e, op);
        if matches!(error, TransportError::Timeout { .. }) {
            self.timeouts_seen.bump(op);
        }
        error
    }

    /// Backoff before the next attempt; never after the last one.
    async fn pause(&self, attempt: u32) {
        if attempt < self.max_retries {
            tokio::time::sleep(self.backoff.delay(attempt)).await;
        }
    }
}

fn ack_for(sending_fallback: bool) -> SendOutcome {
    if sending_fallback {
        SendOutcome::FallbackAcked
    } else {
        SendOutcome::Acked
    }
}

fn outcome_label(outcome: SendOutcome) -> &'static str {
    match outcome {
        SendOutcome::Acked => "acked",
        SendOutcome::FallbackAcked => "fallback_acked",
        SendOutcome::RetryableFailure => "retryable_failure",
        SendOutcome::PermanentRejected => "permanent_rejected",
    }
}
