//! Persisted drowsiness events

use crate::{ApiError, AppState};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use storage::{DrowsinessEvent, NewDrowsinessEvent};
use uuid::Uuid;

fn not_found() -> ApiError {
    ApiError::NotFound("Drowsiness event not found".into())
}

/// Unparseable ids cannot exist, so they are reported as missing
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| not_found())
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DrowsinessEvent>>, ApiError> {
    Ok(Json(state.repository.get_all().await?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DrowsinessEvent>, ApiError> {
    let id = parse_id(&id)?;
    state
        .repository
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewDrowsinessEvent>,
) -> Result<Json<DrowsinessEvent>, ApiError> {
    if new.vehicle_identification.is_empty() || new.event_type.is_empty() {
        return Err(ApiError::Validation(
            "vehicle_identification and event_type are required".into(),
        ));
    }
    let event = new.into_event();
    state.repository.create(&event).await?;
    Ok(Json(event))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = parse_id(&id)?;
    let event = state.repository.get_by_id(id).await?.ok_or_else(not_found)?;
    if !state.repository.delete(id).await? {
        return Err(not_found());
    }
    if !event.image.is_empty() {
        state.images.remove(&event.image).await;
    }
    Ok(Json(DeleteResponse {
        message: "Drowsiness event deleted successfully",
    }))
}

/// Event snapshot as a JPEG attachment
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let event = state.repository.get_by_id(id).await?.ok_or_else(not_found)?;
    if event.image.is_empty() {
        return Err(ApiError::NotFound("Drowsiness event has no image".into()));
    }
    let jpeg = state.images.read(&event.image).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.jpg\"", event.id),
            ),
            (
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                "Content-Disposition".to_string(),
            ),
        ],
        jpeg,
    ))
}
