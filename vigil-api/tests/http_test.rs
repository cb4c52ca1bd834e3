//! Endpoint behavior through the assembled router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vigil_api::{router, AppState};
use vigil_core::client::{IncidentClient, InferenceClient};
use vigil_core::models::{HlsCallback, StreamKey};
use vigil_core::store::{MemoryStore, STREAM_ACTIVE_HASH};
use vigil_pipeline::incident::IncidentAssembler;
use vigil_pipeline::registry::ProcessorRegistry;
use vigil_pipeline::CHANNEL_CAPACITY;

struct TestHarness {
    state: AppState,
    store: Arc<MemoryStore>,
    intake_rx: mpsc::Receiver<HlsCallback>,
    cancel: CancellationToken,
    _dir: tempfile::TempDir,
    workdir: std::path::PathBuf,
    accident_root: std::path::PathBuf,
}

async fn harness(inference_url: &str) -> TestHarness {
    let dir = tempfile::tempdir().expect("tempdir");
    let workdir = dir.path().join("work");
    let accident_root = dir.path().join("accident");
    tokio::fs::create_dir_all(&workdir).await.expect("mkdir");
    tokio::fs::create_dir_all(&accident_root).await.expect("mkdir");

    let store = Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();
    let assembler = IncidentAssembler::new(
        accident_root.clone(),
        IncidentClient::new("http://127.0.0.1:1"),
        store.clone(),
        cancel.child_token(),
    );
    let registry = ProcessorRegistry::new(
        workdir.clone(),
        InferenceClient::new(inference_url),
        assembler.submission_sender(),
        store.clone(),
        cancel.child_token(),
    );
    let (intake_tx, intake_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let state = AppState::new(
        registry,
        assembler,
        intake_tx,
        InferenceClient::new(inference_url),
        store.clone(),
    );

    TestHarness {
        state,
        store,
        intake_rx,
        cancel,
        _dir: dir,
        workdir,
        accident_root,
    }
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn body_value(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn hls_hook_accepts_and_feeds_intake() {
    let mut h = harness("http://127.0.0.1:1").await;
    let ts = h.workdir.join("seg.ts");
    tokio::fs::write(&ts, b"ts").await.expect("write");

    let response = router(h.state.clone())
        .oneshot(post_json(
            "/hooks/srs/hls",
            serde_json::json!({
                "action": "on_hls",
                "app": "live",
                "stream": "main",
                "duration": 4.0,
                "file": ts.to_string_lossy(),
                "url": "live/main-1.ts",
                "seq_no": 1
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_value(response).await;
    assert_eq!(body["code"], 0);

    let msg = h.intake_rx.recv().await.expect("intake message");
    assert_eq!(msg.seq_no, 1);
    assert_eq!(msg.stream_key().canonical(), "live/main");

    h.cancel.cancel();
}

#[tokio::test]
async fn hls_hook_rejects_bad_action_and_missing_file() {
    let h = harness("http://127.0.0.1:1").await;

    let response = router(h.state.clone())
        .oneshot(post_json(
            "/hooks/srs/hls",
            serde_json::json!({"action": "on_publish", "file": "/tmp/x.ts"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router(h.state.clone())
        .oneshot(post_json(
            "/hooks/srs/hls",
            serde_json::json!({"action": "on_hls", "file": "/nonexistent/x.ts"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    h.cancel.cancel();
}

#[tokio::test]
async fn publish_lifecycle_updates_the_active_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream/verify"))
        .and(body_json(serde_json::json!({"streamKey": "live/main"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/stream/end"))
        .and(body_json(serde_json::json!({"streamKey": "live/main"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri()).await;

    let response = router(h.state.clone())
        .oneshot(post_json(
            "/hooks/srs/verify",
            serde_json::json!({"action": "on_publish", "app": "live", "stream": "main"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.store.get(STREAM_ACTIVE_HASH, "live/main").is_some());

    let response = router(h.state.clone())
        .oneshot(post_json(
            "/hooks/srs/verify",
            serde_json::json!({"action": "on_unpublish", "app": "live", "stream": "main"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.store.get(STREAM_ACTIVE_HASH, "live/main").is_none());

    h.cancel.cancel();
    server.verify().await;
}

#[tokio::test]
async fn play_hook_increments_the_counter() {
    let h = harness("http://127.0.0.1:1").await;

    for _ in 0..3 {
        let response = router(h.state.clone())
            .oneshot(post_json(
                "/hooks/srs/verify",
                serde_json::json!({"action": "on_play", "app": "live", "stream": "main"}),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router(h.state.clone())
        .oneshot(get("/debug/tasks"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_value(response).await;
    assert_eq!(body["data"]["plays"], 3);

    h.cancel.cancel();
}

#[tokio::test]
async fn playlist_endpoint_resolves_the_stream_processor() {
    let h = harness("http://127.0.0.1:1").await;

    let response = router(h.state.clone())
        .oneshot(get("/detect/hls/live/main/index.m3u8"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    h.state
        .registry
        .load_or_create(&StreamKey::new("", "live", "main"))
        .await
        .expect("create");

    let response = router(h.state.clone())
        .oneshot(get("/detect/hls/live/main/index.m3u8"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/vnd.apple.mpegurl")
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let text = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(text.starts_with("#EXTM3U"));
    assert!(!text.contains("#EXT-X-ENDLIST"));

    h.cancel.cancel();
}

#[tokio::test]
async fn ts_endpoint_serves_staged_segments() {
    let h = harness("http://127.0.0.1:1").await;
    h.state
        .registry
        .load_or_create(&StreamKey::new("", "live", "main"))
        .await
        .expect("create");
    tokio::fs::write(h.workdir.join("7-org-abc.ts"), b"ts-payload")
        .await
        .expect("write");

    let response = router(h.state.clone())
        .oneshot(get("/detect/hls/live/main/7-org-abc.ts"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/vnd.apple.mpegurl")
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(&bytes[..], b"ts-payload");

    let response = router(h.state.clone())
        .oneshot(get("/detect/hls/live/main/missing.ts"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    h.cancel.cancel();
}

#[tokio::test]
async fn clip_endpoint_supports_single_ranges() {
    let h = harness("http://127.0.0.1:1").await;
    let clip_dir = h.accident_root.join("u-1");
    tokio::fs::create_dir_all(&clip_dir).await.expect("mkdir");
    tokio::fs::write(clip_dir.join("index.mp4"), vec![7u8; 4096])
        .await
        .expect("write");

    // Full response.
    let response = router(h.state.clone())
        .oneshot(get("/accident/hls/u-1/index.mp4"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(bytes.len(), 4096);

    // Single range.
    let request = Request::builder()
        .uri("/accident/hls/u-1/index.mp4")
        .header(header::RANGE, "bytes=0-1023")
        .body(Body::empty())
        .expect("request");
    let response = router(h.state.clone())
        .oneshot(request)
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok()),
        Some("bytes 0-1023/4096")
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(bytes.len(), 1024);

    // Unknown clip.
    let response = router(h.state.clone())
        .oneshot(get("/accident/hls/u-2/index.mp4"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    h.cancel.cancel();
}
