//! Live video, metrics and drowsiness notifications

use crate::stream::{content_type, mjpeg_stream, Feed};
use crate::AppState;
use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use frame_buffer::{DrowsinessEventSignal, FacialMetrics};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

fn video(state: &AppState, feed: Feed) -> Response {
    let stream = mjpeg_stream(Arc::clone(&state.buffer), feed, state.stream_interval());
    (
        [
            (header::CONTENT_TYPE, content_type()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

pub async fn video_raw(State(state): State<Arc<AppState>>) -> Response {
    video(&state, Feed::Raw)
}

pub async fn video_processed(State(state): State<Arc<AppState>>) -> Response {
    video(&state, Feed::Processed)
}

pub async fn video_debug(State(state): State<Arc<AppState>>) -> Response {
    video(&state, Feed::Debug)
}

pub async fn facial_metrics_latest(State(state): State<Arc<AppState>>) -> Json<FacialMetrics> {
    Json(state.buffer.get_facial_metrics())
}

/// Pending events, consumed by this read
pub async fn drowsiness_latest(State(state): State<Arc<AppState>>) -> Json<DrowsinessEventSignal> {
    Json(state.buffer.get_drowsiness_event_recent())
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(text) => socket.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize push: {}", e);
            true
        }
    }
}

pub async fn facial_metrics_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| push_facial_metrics(socket, state))
}

async fn push_facial_metrics(mut socket: WebSocket, state: Arc<AppState>) {
    info!("Facial metrics client connected");
    let mut ticker = tokio::time::interval(state.stream_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !send_json(&mut socket, &state.buffer.get_facial_metrics()).await {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!("Facial metrics client disconnected");
}

pub async fn drowsiness_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| push_notifications(socket, state))
}

async fn push_notifications(mut socket: WebSocket, state: Arc<AppState>) {
    info!("Drowsiness notification client connected");
    let mut events = state.buffer.subscribe_events();
    loop {
        tokio::select! {
            notice = events.recv() => match notice {
                Ok(notice) => {
                    if !send_json(&mut socket, &notice).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!("Notification client lagged by {}", skipped),
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!("Drowsiness notification client disconnected");
}
