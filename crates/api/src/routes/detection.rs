//! Detection lifecycle control

use crate::{ApiError, AppState, StandardResponse};
use axum::extract::State;
use detection_service::{DetectionService, DetectionStatus};
use std::sync::Arc;

type StatusResponse = Result<StandardResponse<DetectionStatus>, ApiError>;

/// Lifecycle calls join threads, so they leave the async executor
async fn blocking<F>(state: &AppState, op: F) -> Result<DetectionStatus, ApiError>
where
    F: FnOnce(&DetectionService) -> Result<DetectionStatus, ApiError> + Send + 'static,
{
    let detection = Arc::clone(&state.detection);
    tokio::task::spawn_blocking(move || op(&detection)).await?
}

pub async fn start(State(state): State<Arc<AppState>>) -> StatusResponse {
    let status = blocking(&state, |d| Ok(d.start()?)).await?;
    Ok(StandardResponse::with_data("Detection started.", status))
}

pub async fn restart(State(state): State<Arc<AppState>>) -> StatusResponse {
    let status = blocking(&state, |d| Ok(d.restart()?)).await?;
    Ok(StandardResponse::with_data("Detection restarted.", status))
}

pub async fn pause(State(state): State<Arc<AppState>>) -> StatusResponse {
    let status = blocking(&state, |d| Ok(d.pause())).await?;
    Ok(StandardResponse::with_data("Detection paused.", status))
}

pub async fn resume(State(state): State<Arc<AppState>>) -> StatusResponse {
    let status = blocking(&state, |d| Ok(d.resume())).await?;
    Ok(StandardResponse::with_data("Detection resumed.", status))
}

pub async fn stop(State(state): State<Arc<AppState>>) -> StatusResponse {
    let status = blocking(&state, |d| Ok(d.stop())).await?;
    Ok(StandardResponse::with_data("Detection stopped.", status))
}

pub async fn status(State(state): State<Arc<AppState>>) -> StandardResponse<DetectionStatus> {
    let status = state.detection.status();
    let message = if status.is_alive && status.is_running {
        "Detection is running."
    } else {
        "Detection is stopped or paused."
    };
    StandardResponse::with_data(message, status)
}
