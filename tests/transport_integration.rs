//! Transport client against the in-process mock contest server and
//! scripted wiremock servers.

mod common;

use aerolink::dedup::{DedupStore, IdempotencyKey};
use aerolink::payload::{PayloadConfig, PayloadShaper, RawObject, RawResult, RawTranslation};
use aerolink::transport::{
    FrameFetchOutcome, FrameMeta, SendOutcome, TransportClient, TransportSettings,
    IDEMPOTENCY_HEADER,
};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn client(base_url: &str) -> TransportClient {
    let config = common::fast_config(base_url);
    let mut settings = TransportSettings::new(base_url, IdempotencyKey::new("aia", "it", "run1"));
    settings.timeouts = config.timeouts;
    settings.retry = config.retry;
    TransportClient::new(settings).unwrap()
}

fn raw_for(meta: &FrameMeta, objects: Vec<RawObject>) -> RawResult {
    RawResult {
        id: serde_json::to_value(&meta.wire_id).ok(),
        user: Some(Value::from("test-team")),
        frame: serde_json::to_value(&meta.wire_frame).ok(),
        detected_objects: Some(objects),
        detected_translations: Some(vec![RawTranslation::from_xyz(
            meta.translation.translation_x,
            meta.translation.translation_y,
            meta.translation.translation_z,
        )]),
        detected_undefined_objects: vec![],
    }
}

fn vehicle(confidence: f64) -> RawObject {
    RawObject {
        cls: json!(0),
        landing_status: json!(-1),
        motion_status: json!(1),
        top_left_x: json!(1),
        top_left_y: json!(2),
        bottom_right_x: json!(10),
        bottom_right_y: json!(12),
        confidence: json!(confidence),
    }
}

// ============================================================================
// Against the mock contest server
// ============================================================================

#[tokio::test]
async fn test_full_frame_cycle_against_mock() {
    let mock = common::spawn_mock(3).await;
    let transport = client(&mock.base_url);
    let shaper = PayloadShaper::new(PayloadConfig::default(), "test-team");
    let mut dedup = DedupStore::new(16);

    transport.start_session().await.unwrap();

    let mut acked = 0;
    loop {
        match transport.fetch_frame(&mut dedup).await {
            FrameFetchOutcome::Ok { meta, is_duplicate } => {
                assert!(!is_duplicate);
                let image = transport.download_image(&meta).await.expect("image decodes");
                assert_eq!((image.width(), image.height()), (64, 48));

                let preflight = shaper.preflight(&raw_for(&meta, vec![vehicle(0.8)]), None);
                assert!(!preflight.rejected_to_fallback);
                let outcome = transport
                    .submit_result(&mut dedup, &meta.key(), preflight.payload)
                    .await;
                assert_eq!(outcome, SendOutcome::Acked);
                acked += 1;
            }
            FrameFetchOutcome::EndOfStream => break,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(acked, 3);
    assert_eq!(mock.state.results_received(), 3);
    assert_eq!(transport.take_timeout_counts().total(), 0);
}

#[tokio::test]
async fn test_resubmitting_acked_frame_skips_post() {
    let mock = common::spawn_mock(1).await;
    let transport = client(&mock.base_url);
    let shaper = PayloadShaper::new(PayloadConfig::default(), "test-team");
    let mut dedup = DedupStore::new(16);

    let meta = match transport.fetch_frame(&mut dedup).await {
        FrameFetchOutcome::Ok { meta, .. } => meta,
        other => panic!("unexpected outcome {:?}", other),
    };
    let payload = shaper.preflight(&raw_for(&meta, vec![]), None).payload;

    let first = transport
        .submit_result(&mut dedup, &meta.key(), payload.clone())
        .await;
    let second = transport.submit_result(&mut dedup, &meta.key(), payload).await;

    assert_eq!(first, SendOutcome::Acked);
    assert_eq!(second, SendOutcome::Acked);
    assert_eq!(mock.state.results_received(), 1);
}

#[tokio::test]
async fn test_unreachable_server_handshake_fails() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = client(&format!("http://{}", addr));
    assert!(transport.start_session().await.is_err());
}

// ============================================================================
// Against scripted servers
// ============================================================================

#[tokio::test]
async fn test_rejected_rich_payload_recovers_with_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/next_frame"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 12,
            "url": "/frames/12",
            "image_url": "/images/12.jpg",
            "gps_health": "NaN",
            "translation_x": "NaN",
            "translation_y": "unknown",
            "translation_z": ""
        })))
        .mount(&server)
        .await;
    // Only the fallback (no objects) is accepted
    Mock::given(method("POST"))
        .and(path("/submit_result"))
        .and(|req: &Request| {
            serde_json::from_slice::<Value>(&req.body)
                .ok()
                .and_then(|body| body["detected_objects"].as_array().map(Vec::is_empty))
                .unwrap_or(false)
        })
        .respond_with(ResponseTemplate::new(200))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/submit_result"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let transport = client(&server.uri());
    let shaper = PayloadShaper::new(PayloadConfig::default(), "test-team");
    let mut dedup = DedupStore::new(16);

    let meta = match transport.fetch_frame(&mut dedup).await {
        FrameFetchOutcome::Ok { meta, .. } => meta,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert!(!meta.gps_healthy());
    assert_eq!(meta.translation.translation_x, 0.0);

    let payload = shaper
        .preflight(&raw_for(&meta, vec![vehicle(0.9), vehicle(0.4)]), None)
        .payload;
    let outcome = transport.submit_result(&mut dedup, "12", payload).await;
    assert_eq!(outcome, SendOutcome::FallbackAcked);
    assert!(dedup.was_submitted("12"));

    let posts: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .collect();
    assert_eq!(posts.len(), 2);
    for post in &posts {
        let key = post.headers.get(IDEMPOTENCY_HEADER).unwrap();
        assert_eq!(key.to_str().unwrap(), "aia:it:run1:12");
    }
}
