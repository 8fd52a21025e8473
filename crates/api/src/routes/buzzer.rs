//! Manual buzzer control

use crate::{ApiError, AppState, StandardResponse};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const MAX_TIMES: u32 = 20;
const MAX_DURATION_MS: u64 = 5_000;
const MAX_PAUSE_SECS: f64 = 5.0;

#[derive(Debug, Clone, Deserialize)]
pub struct BeepRequest {
    pub times: u32,
    /// Beep length in milliseconds
    pub duration: u64,
    /// Gap between beeps in seconds
    pub pause: f64,
    /// 0 drives an active buzzer steadily
    #[serde(default)]
    pub frequency: u32,
}

impl BeepRequest {
    fn validate(&self) -> Result<Duration, ApiError> {
        if self.times == 0 || self.times > MAX_TIMES {
            return Err(ApiError::Validation(format!("times must be 1..={}", MAX_TIMES)));
        }
        if self.duration == 0 || self.duration > MAX_DURATION_MS {
            return Err(ApiError::Validation(format!(
                "duration must be 1..={} ms",
                MAX_DURATION_MS
            )));
        }
        if !(0.0..=MAX_PAUSE_SECS).contains(&self.pause) {
            return Err(ApiError::Validation(format!(
                "pause must be 0..={} s",
                MAX_PAUSE_SECS
            )));
        }
        Ok(Duration::from_secs_f64(self.pause))
    }
}

pub async fn test(State(state): State<Arc<AppState>>) -> Result<StandardResponse, ApiError> {
    let buzzer = Arc::clone(&state.buzzer);
    tokio::task::spawn_blocking(move || buzzer.test()).await??;
    Ok(StandardResponse::success("Beeped"))
}

pub async fn beep(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BeepRequest>,
) -> Result<StandardResponse, ApiError> {
    let pause = req.validate()?;
    let buzzer = Arc::clone(&state.buzzer);
    let BeepRequest {
        times,
        duration,
        frequency,
        ..
    } = req;
    tokio::task::spawn_blocking(move || buzzer.beep(times, duration, pause, frequency)).await??;
    Ok(StandardResponse::success(format!("Beeped {} time(s).", times)))
}
