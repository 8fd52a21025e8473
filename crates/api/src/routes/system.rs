//! Version, health and Prometheus metrics

use crate::{ApiError, AppState};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use detection_service::LifecycleState;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: String,
}

pub async fn version(State(state): State<Arc<AppState>>) -> Json<VersionResponse> {
    Json(VersionResponse {
        name: "drowsiness-monitor",
        version: state.version.clone(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub detection: LifecycleState,
    pub detection_alive: bool,
    pub database: &'static str,
    pub buzzer_stage: alerting::AlertStage,
    pub frames_processed: u64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match state.repository.count().await {
        Ok(_) => "ok",
        Err(_) => "error",
    };
    let detection = state.detection.status();
    let status = if database == "ok" && detection.state != LifecycleState::Stopped {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            detection: detection.state,
            detection_alive: detection.is_alive,
            database,
            buzzer_stage: state.buzzer.stage(),
            frames_processed: state.buffer.frames_written(),
        },
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let handle = state.prometheus.as_ref().ok_or(ApiError::Unavailable("metrics exporter"))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
