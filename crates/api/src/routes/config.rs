//! Live detection settings and pipeline toggles

use crate::{ApiError, AppState, StandardResponse};
use axum::extract::State;
use axum::Json;
use dms::{DetectionConfig, EnabledDetectors};
use std::sync::Arc;
use tracing::info;

pub async fn get_detection(State(state): State<Arc<AppState>>) -> Json<DetectionConfig> {
    Json(state.detection.config().detection.clone())
}

/// Validate, persist to disk, then apply to the running loop
pub async fn update_detection(
    State(state): State<Arc<AppState>>,
    Json(config): Json<DetectionConfig>,
) -> Result<StandardResponse, ApiError> {
    config
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let path = state.detection_settings_path.clone();
    let to_save = config.clone();
    tokio::task::spawn_blocking(move || to_save.save(&path))
        .await?
        .map_err(|e| ApiError::Config(e.to_string()))?;

    state.detection.reinitialize_configuration(config)?;
    info!("Detection settings saved to {}", state.detection_settings_path.display());
    Ok(StandardResponse::success("Updated and applied detection config"))
}

pub async fn get_pipeline(State(state): State<Arc<AppState>>) -> Json<EnabledDetectors> {
    Json(state.detection.config().enabled)
}

pub async fn update_pipeline(
    State(state): State<Arc<AppState>>,
    Json(enabled): Json<EnabledDetectors>,
) -> StandardResponse<EnabledDetectors> {
    state.detection.update_pipeline(enabled);
    StandardResponse::with_data("Updated pipeline configuration", enabled)
}
