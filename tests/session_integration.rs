//! End-to-end sessions: the driver against the mock contest server and
//! scripted wiremock servers.

mod common;

use aerolink::perception::Perception;
use aerolink::session::{SessionDriver, SessionError, StopReason};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

#[tokio::test]
async fn test_session_runs_to_end_of_stream() {
    let mock = common::spawn_mock(5).await;
    let config = common::fast_config(&mock.base_url);

    let driver = SessionDriver::from_config(&config, Perception::builtin()).unwrap();
    let report = driver.start(CancellationToken::new()).await.unwrap();

    assert_eq!(report.stop_reason, StopReason::EndOfStream);
    assert_eq!(report.kpi.frames_fetched, 5);
    assert_eq!(report.kpi.send_ok, 5);
    assert_eq!(report.kpi.send_fail, 0);
    assert_eq!(report.kpi.mode_gps, 5);
    assert_eq!(report.resilience.breaker_open_count, 0);
    assert!(!report.run_id.is_empty());
    assert_eq!(mock.state.results_received(), 5);
}

#[tokio::test]
async fn test_session_honors_frame_budget() {
    let mock = common::spawn_mock(20).await;
    let mut config = common::fast_config(&mock.base_url);
    config.session.max_frames = Some(3);

    let driver = SessionDriver::from_config(&config, Perception::builtin()).unwrap();
    let report = driver.start(CancellationToken::new()).await.unwrap();

    assert_eq!(report.stop_reason, StopReason::MaxFrames { frames: 3 });
    assert_eq!(report.kpi.frames_fetched, 3);
    assert_eq!(report.kpi.send_ok, 3);
    assert_eq!(mock.state.results_received(), 3);
    assert_eq!(mock.state.frames_served(), 3);
}

#[tokio::test]
async fn test_session_cancelled_mid_stream() {
    let server = MockServer::start().await;
    let counter = Arc::new(AtomicU64::new(0));
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next_frame"))
        .respond_with(move |_req: &Request| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_body_json(json!({
                "id": n,
                "url": format!("/frames/{}", n),
                "gps_health": 1,
                "translation_x": 1.0,
                "translation_y": 2.0,
                "translation_z": 3.0
            }))
        })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/submit_result"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = common::fast_config(&server.uri());
    let driver = SessionDriver::from_config(&config, Perception::builtin()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), driver.start(cancel))
        .await
        .expect("session stops after cancellation")
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert!(report.kpi.frames_fetched > 0);
    assert!(report.kpi.send_ok > 0);
}

#[tokio::test]
async fn test_session_abandons_unhealthy_server() {
    let server = MockServer::start().await;
    let counter = Arc::new(AtomicU64::new(0));
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next_frame"))
        .respond_with(move |_req: &Request| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_body_json(json!({"id": n, "gps_health": 0}))
        })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/submit_result"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut config = common::fast_config(&server.uri());
    config.breaker.session_max_transient_seconds = 0.3;

    let driver = SessionDriver::from_config(&config, Perception::builtin()).unwrap();
    let report = tokio::time::timeout(
        Duration::from_secs(10),
        driver.start(CancellationToken::new()),
    )
    .await
    .expect("session aborts on its own")
    .unwrap();

    assert!(matches!(
        report.stop_reason,
        StopReason::TransientBudget { .. }
    ));
    assert_eq!(report.kpi.send_ok, 0);
    assert!(report.kpi.send_fail > 0);
    assert!(report.resilience.degrade_entries >= 1);
    assert!(report.resilience.transient_wall_time_seconds > 0.3);
    assert_eq!(report.kpi.mode_optical_flow, report.kpi.frames_fetched);
}

#[tokio::test]
async fn test_session_start_fails_when_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = common::fast_config(&format!("http://{}", addr));
    let driver = SessionDriver::from_config(&config, Perception::builtin()).unwrap();
    let result = driver.start(CancellationToken::new()).await;

    assert!(matches!(result, Err(SessionError::Unreachable(_))));
}
