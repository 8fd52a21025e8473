//! Response envelope and error mapping

use alerting::BuzzerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use detection_service::DetectionError;
use serde::Serialize;
use storage::StorageError;
use thiserror::Error;
use tracing::error;

/// `{status, message, data}` body used by the control endpoints
#[derive(Debug, Serialize)]
pub struct StandardResponse<T: Serialize = ()> {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl StandardResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> StandardResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for StandardResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Buzzer failed: {0}")]
    Buzzer(#[from] BuzzerError),

    #[error("{0} unavailable")]
    Unavailable(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => ApiError::NotFound("Drowsiness event not found".into()),
            other => ApiError::Storage(other),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Detection(DetectionError::Config(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Config(_)
            | ApiError::Detection(_)
            | ApiError::Storage(_)
            | ApiError::Buzzer(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = StandardResponse::<()> {
            status: "error",
            message: self.to_string(),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}
