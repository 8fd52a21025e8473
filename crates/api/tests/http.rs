//! HTTP surface driven through the router without a socket

use api::{create_router, AppConfig, AppState, RateLimitConfig, Runtime};
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use dms::InferenceEngine;
use frame_buffer::{EventKind, EventNotice};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

struct Harness {
    router: Router,
    state: Arc<AppState>,
    dir: TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.connection_strings.db_connections = "sqlite::memory:".into();
    config.api_settings.static_dir = dir.path().join("static").to_string_lossy().into_owned();
    config.detection_settings_path = dir.path().join("detection_settings.json");
    config.pipeline_settings.inference_engine = InferenceEngine::None;
    config.pipeline_settings.target_fps = 100;
    config.hardware.camera.width = 32;
    config.hardware.camera.height = 24;

    let Runtime { state, .. } = Runtime::build(&config, None).await.unwrap();
    let router = create_router(Arc::clone(&state), &RateLimitConfig::strict()).unwrap();
    Harness { router, state, dir }
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let mut req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    req
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_version() {
    let h = harness().await;
    let (status, body) = send(&h.router, request("GET", "/version", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "drowsiness-monitor");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_reports_components() {
    let h = harness().await;
    let (status, body) = send(&h.router, request("GET", "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["components"]["database"], "ok");
    assert_eq!(body["components"]["detection"], "stopped");
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_without_exporter_is_unavailable() {
    let h = harness().await;
    let (status, body) = send(&h.router, request("GET", "/metrics", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_detection_lifecycle_endpoints() {
    let h = harness().await;

    let (status, body) = send(&h.router, request("GET", "/detection/status", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_alive"], false);
    assert_eq!(body["data"]["is_running"], false);

    let (status, body) = send(&h.router, request("POST", "/detection/start", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["state"], "running");

    let (_, body) = send(&h.router, request("GET", "/detection/status", None)).await;
    assert_eq!(body["message"], "Detection is running.");

    let (_, body) = send(&h.router, request("POST", "/detection/pause", None)).await;
    assert_eq!(body["data"]["state"], "paused");
    assert_eq!(body["data"]["is_alive"], true);

    let (_, body) = send(&h.router, request("POST", "/detection/resume", None)).await;
    assert_eq!(body["data"]["state"], "running");

    let (_, body) = send(&h.router, request("POST", "/detection/restart", None)).await;
    assert_eq!(body["data"]["state"], "running");

    let (_, body) = send(&h.router, request("POST", "/detection/stop", None)).await;
    assert_eq!(body["data"]["state"], "stopped");
    assert_eq!(body["data"]["is_alive"], false);
}

#[tokio::test]
async fn test_event_crud() {
    let h = harness().await;

    let (status, created) = send(
        &h.router,
        request(
            "POST",
            "/drowsinessevent/",
            Some(json!({
                "vehicle_identification": "VH-001",
                "event_type": "drowsiness_stage_1",
                "ear": 0.12,
                "mar": 0.3
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(Uuid::parse_str(&id).unwrap().get_version_num(), 7);

    let (status, list) = send(&h.router, request("GET", "/drowsinessevent/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, fetched) = send(&h.router, request("GET", &format!("/drowsinessevent/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], created["id"]);
    assert_eq!(fetched["event_type"], "drowsiness_stage_1");
    assert_eq!(fetched["ear"], 0.12);

    let (status, body) = send(&h.router, request("DELETE", &format!("/drowsinessevent/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Drowsiness event deleted successfully");

    let (status, _) = send(&h.router, request("GET", &format!("/drowsinessevent/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&h.router, request("DELETE", &format!("/drowsinessevent/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_event_id_is_not_found() {
    let h = harness().await;
    let (status, body) = send(&h.router, request("GET", "/drowsinessevent/not-a-uuid", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");

    let (status, _) = send(&h.router, request("GET", "/drowsinessevent/download/not-a-uuid", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_without_required_fields_rejected() {
    let h = harness().await;
    let (status, _) = send(
        &h.router,
        request(
            "POST",
            "/drowsinessevent",
            Some(json!({"vehicle_identification": "", "event_type": "yawning"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_download_returns_jpeg_attachment() {
    let h = harness().await;
    let id = Uuid::now_v7();
    let image = h.state.images.save(id, &[0xFF, 0xD8, 0xFF, 0xD9]).await.unwrap();
    let event = storage::DrowsinessEvent {
        id,
        vehicle_identification: "VH-001".into(),
        timestamp: chrono::Utc::now(),
        image: image.clone(),
        ear: Some(0.1),
        mar: Some(0.2),
        event_type: "drowsiness_stage_2".into(),
    };
    h.state.repository.create(&event).await.unwrap();

    let response = h
        .router
        .clone()
        .oneshot(request("GET", &format!("/drowsinessevent/download/{id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains(&format!("{id}.jpg")));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], &[0xFF, 0xD8, 0xFF, 0xD9]);

    // Same file through the static mount
    let response = h
        .router
        .clone()
        .oneshot(request("GET", &format!("/static/{image}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_detection_config_update_validates_and_persists() {
    let h = harness().await;

    let (status, mut config) = send(&h.router, request("GET", "/config/detection", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["drowsiness"]["eye_aspect_ratio_consec_frames"], 10);

    config["drowsiness"]["eye_aspect_ratio_consec_frames"] = json!(0);
    let (status, _) = send(&h.router, request("POST", "/config/detection", Some(config.clone()))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!h.dir.path().join("detection_settings.json").exists());

    config["drowsiness"]["eye_aspect_ratio_consec_frames"] = json!(5);
    let (status, body) = send(&h.router, request("POST", "/config/detection", Some(config))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Updated and applied detection config");

    let saved = dms::DetectionConfig::load(h.dir.path().join("detection_settings.json")).unwrap();
    assert_eq!(saved.drowsiness.eye_aspect_ratio_consec_frames, 5);
    assert_eq!(h.state.detection.config().detection, saved);

    let (_, config) = send(&h.router, request("GET", "/config/detection", None)).await;
    assert_eq!(config["drowsiness"]["eye_aspect_ratio_consec_frames"], 5);
}

#[tokio::test]
async fn test_pipeline_toggles() {
    let h = harness().await;
    let toggles = json!({
        "drowsiness_model_run": true,
        "phone_detection_model_run": false,
        "hands_detection_model_run": true
    });
    let (status, body) = send(&h.router, request("POST", "/config/pipeline/update", Some(toggles.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], toggles);

    let (_, current) = send(&h.router, request("GET", "/config/pipeline", None)).await;
    assert_eq!(current, toggles);
}

#[tokio::test]
async fn test_realtime_polls() {
    let h = harness().await;

    let (status, metrics) = send(&h.router, request("GET", "/realtime/data/facialmetrics/latest", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics, json!({"ear": 0.0, "mar": 0.0, "is_drowsy": false, "is_calling": false}));

    h.state.buffer.update_drowsiness_event_recent(
        Some(EventNotice {
            kind: EventKind::Drowsiness,
            stage: 2,
            ear: 0.1,
            mar: 0.2,
            timestamp_ms: 1,
        }),
        None,
    );
    let uri = "/realtime/notification/drowsiness/latest";
    let (_, first) = send(&h.router, request("GET", uri, None)).await;
    assert_eq!(first["drowsiness_event"]["stage"], 2);
    assert!(first["yawning_event"].is_null());

    let (_, second) = send(&h.router, request("GET", uri, None)).await;
    assert!(second["drowsiness_event"].is_null());
}

#[tokio::test]
async fn test_video_feeds_are_mjpeg() {
    let h = harness().await;
    for feed in ["raw", "processed", "debug"] {
        let response = h
            .router
            .clone()
            .oneshot(request("GET", &format!("/realtime/video/{feed}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );
    }
}

#[tokio::test]
async fn test_buzzer_beep_is_rate_limited() {
    let h = harness().await;
    let beep = json!({"times": 1, "duration": 1, "pause": 0.0, "frequency": 0});

    let (status, body) = send(&h.router, request("POST", "/buzzer/beep", Some(beep.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Beeped 1 time(s).");

    let (status, _) = send(&h.router, request("POST", "/buzzer/beep", Some(beep))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_buzzer_beep_rejects_bad_request() {
    let h = harness().await;
    let (status, _) = send(
        &h.router,
        request("POST", "/buzzer/beep", Some(json!({"times": 0, "duration": 100, "pause": 0.1}))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
