//! Control API integration tests against fake capture, audio and encode
//! backends.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;

use beatreel_api::{create_router, ApiConfig, AppState};
use beatreel_capture::{CaptureConfig, CaptureResult, CaptureSurface, RenderDriver, SurfaceLauncher};
use beatreel_media::{AudioSource, EncodeSpec, MediaError, MediaResult, VideoEncoder};
use beatreel_models::{JobId, Plan, RenderParams, RenderRequest, ResolutionProfile};
use beatreel_store::{JobStore, MemoryJobStore};
use beatreel_worker::{JobRunner, WorkerConfig};

struct FakeSurface {
    counter: u64,
}

#[async_trait]
impl CaptureSurface for FakeSurface {
    async fn wait_until_ready(&mut self, _timeout: Duration) -> CaptureResult<bool> {
        Ok(true)
    }

    async fn locate_target(&mut self) -> CaptureResult<()> {
        Ok(())
    }

    async fn frame_counter(&mut self) -> CaptureResult<u64> {
        Ok(self.counter)
    }

    async fn render_frame(&mut self, _time: f64, _params: &RenderParams) -> CaptureResult<()> {
        self.counter += 1;
        Ok(())
    }

    async fn wait_for_counter_above(&mut self, baseline: u64, _timeout: Duration) -> CaptureResult<Option<u64>> {
        Ok((self.counter > baseline).then_some(self.counter))
    }

    async fn capture_target(&mut self, path: &Path) -> CaptureResult<()> {
        tokio::fs::write(path, b"png").await?;
        Ok(())
    }

    async fn close(&mut self) -> CaptureResult<()> {
        Ok(())
    }
}

struct FakeLauncher;

#[async_trait]
impl SurfaceLauncher for FakeLauncher {
    async fn launch(&self, _resolution: ResolutionProfile) -> CaptureResult<Box<dyn CaptureSurface>> {
        Ok(Box::new(FakeSurface { counter: 0 }))
    }
}

/// Serves audio unless the URL path contains `missing`.
struct FakeAudio;

#[async_trait]
impl AudioSource for FakeAudio {
    async fn fetch(&self, url: &Url, dest: &Path) -> MediaResult<u64> {
        if url.path().contains("missing") {
            return Err(MediaError::download_failed(url.as_str(), "HTTP 404 Not Found"));
        }
        tokio::fs::write(dest, b"ID3").await?;
        Ok(3)
    }
}

const VIDEO_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42 fake video";

struct FakeEncoder;

#[async_trait]
impl VideoEncoder for FakeEncoder {
    async fn encode(&self, spec: &EncodeSpec) -> MediaResult<()> {
        tokio::fs::write(&spec.output_path, VIDEO_BYTES).await?;
        Ok(())
    }
}

struct TestApp {
    router: Router,
    store: Arc<dyn JobStore>,
    _work_dir: tempfile::TempDir,
}

fn test_app(tweak: impl FnOnce(&mut ApiConfig)) -> TestApp {
    let work_dir = tempfile::tempdir().unwrap();
    let mut config = ApiConfig::default();
    tweak(&mut config);

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let worker_config = WorkerConfig {
        work_dir: work_dir.path().to_path_buf(),
        ..Default::default()
    };
    let capture_config = CaptureConfig {
        ready_timeout: Duration::from_millis(200),
        frame_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let runner = JobRunner::new(
        worker_config,
        Arc::clone(&store),
        RenderDriver::new(Arc::new(FakeLauncher), &capture_config),
        Arc::new(FakeAudio),
        Arc::new(FakeEncoder),
    );

    let state = AppState::new(config, Arc::clone(&store), Arc::new(runner));
    TestApp {
        router: create_router(state, None),
        store,
        _work_dir: work_dir,
    }
}

async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

fn post_export(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/export")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn submit(router: &Router, body: Value) -> String {
    let response = send(router, post_export(&body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["status"], "queued");
    json["job_id"].as_str().unwrap().to_string()
}

/// Poll until the job leaves `queued`/`rendering`.
async fn wait_terminal(router: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let response = send(router, get(&format!("/export/{}", job_id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        if json["status"] == "done" || json["status"] == "failed" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {} never finished", job_id);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(|_| {});
    let response = send(&app.router, get("/health")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_submit_poll_download() {
    let app = test_app(|_| {});
    let job_id = submit(
        &app.router,
        json!({ "audioUrl": "https://x/a.mp3", "durationSec": 1, "plan": "free" }),
    )
    .await;

    let status = wait_terminal(&app.router, &job_id).await;
    assert_eq!(status["status"], "done");
    assert_eq!(status["progress"], 1.0);
    assert!(status.get("error").is_none());

    // Terminal status is stable across polls
    let again = json_body(send(&app.router, get(&format!("/export/{}", job_id))).await).await;
    assert_eq!(again, status);

    let response = send(&app.router, get(&format!("/download/{}", job_id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[header::CONTENT_LENGTH], VIDEO_BYTES.len().to_string().as_str());
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{}.mp4\"", job_id).as_str()
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], VIDEO_BYTES);
}

#[tokio::test]
async fn test_oversized_duration_is_rejected_without_a_job() {
    let app = test_app(|_| {});
    let response = send(
        &app.router,
        post_export(&json!({ "audioUrl": "https://x/a.mp3", "durationSec": 100000, "plan": "free" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json.get("job_id").is_none());
    let errors = json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["field"], "durationSec");
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_every_violation_is_reported() {
    let app = test_app(|_| {});
    let response = send(&app.router, post_export(&json!({ "plan": "gold" }))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    let fields: Vec<&str> = json["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"audioUrl"));
    assert!(fields.contains(&"durationSec"));
    assert!(fields.contains(&"plan"));
}

#[tokio::test]
async fn test_mistyped_field_does_not_hide_other_violations() {
    let app = test_app(|_| {});
    let response = send(
        &app.router,
        post_export(&json!({ "audioUrl": "ftp://x/cover.png", "durationSec": "ten", "plan": "gold" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    let errors = json["errors"].as_array().unwrap();
    let by_field = |field: &str| {
        errors
            .iter()
            .find(|e| e["field"] == field)
            .unwrap_or_else(|| panic!("no violation for {}", field))
    };
    assert_eq!(by_field("durationSec")["code"], "type");
    assert_eq!(by_field("audioUrl")["code"], "url");
    assert_eq!(by_field("plan")["code"], "plan");
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = test_app(|_| {});
    let request = Request::builder()
        .method("POST")
        .uri("/export")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = send(&app.router, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["detail"].is_string());
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = test_app(|_| {});

    let response = send(&app.router, get("/export/does-not-exist")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = send(&app.router, get("/download/does-not-exist")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_jobs_do_not_survive_a_restart() {
    let before = test_app(|_| {});
    let job_id = submit(
        &before.router,
        json!({ "audioUrl": "https://x/a.mp3", "durationSec": 1, "plan": "premium" }),
    )
    .await;

    let after = test_app(|_| {});
    let response = send(&after.router, get(&format!("/export/{}", job_id))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_audio_fetch_never_serves_a_file() {
    let app = test_app(|_| {});
    let job_id = submit(
        &app.router,
        json!({ "audioUrl": "https://x/missing.mp3", "durationSec": 1, "plan": "free" }),
    )
    .await;

    let status = wait_terminal(&app.router, &job_id).await;
    assert_eq!(status["status"], "failed");
    let error = status["error"].as_str().unwrap();
    assert!(error.contains("https://x/missing.mp3"), "{}", error);

    let response = send(&app.router, get(&format!("/download/{}", job_id))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_before_done_is_not_found() {
    let app = test_app(|_| {});
    // Created directly, so no runner ever picks it up
    let job = app
        .store
        .create(RenderRequest {
            audio_url: Url::parse("https://x/a.mp3").unwrap(),
            duration_sec: 5,
            plan: Plan::Free,
            bg_image_url: None,
            preset_id: None,
            preset_params: Default::default(),
        })
        .await
        .unwrap();

    let response = send(&app.router, get(&format!("/download/{}", job.id))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = json_body(send(&app.router, get(&format!("/export/{}", job.id))).await).await;
    assert_eq!(json["status"], "queued");
    assert_eq!(json["progress"], 0.0);
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let app = test_app(|c| c.rate_limit_rps = 1);
    let from = |ip: &str| {
        Request::builder()
            .uri(format!("/export/{}", JobId::new()))
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&app.router, from("203.0.113.1")).await.status(), StatusCode::NOT_FOUND);
    let limited = send(&app.router, from("203.0.113.1")).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers()[header::RETRY_AFTER], "1");
    assert_eq!(send(&app.router, from("203.0.113.2")).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_response_headers() {
    let app = test_app(|_| {});

    let response = send(&app.router, get("/health")).await;
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let request = Request::builder()
        .uri("/health")
        .header("X-Request-ID", "trace-me")
        .body(Body::empty())
        .unwrap();
    let response = send(&app.router, request).await;
    assert_eq!(response.headers()["x-request-id"], "trace-me");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = test_app(|c| c.max_body_size = 256);
    let body = json!({
        "audioUrl": "https://x/a.mp3",
        "durationSec": 1,
        "plan": "free",
        "presetParams": { "padding": "x".repeat(1024) }
    });

    let response = send(&app.router, post_export(&body)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let app = test_app(|_| {});
    let response = send(&app.router, get("/metrics")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
