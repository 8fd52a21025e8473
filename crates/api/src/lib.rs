//! Drowsiness Monitor API Server
//!
//! REST, MJPEG and WebSocket surface over the detection service, plus the
//! process lifespan: detection starts at boot and is stopped, together with
//! the buzzer and the event database, on shutdown.

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
mod error;
pub mod rate_limit;
mod routes;
mod state;
pub mod stream;

pub use config::AppConfig;
pub use error::{ApiError, StandardResponse};
pub use rate_limit::RateLimitConfig;
pub use state::{AppState, Runtime};

/// Time allowed for queued events to be written after detection stops
const RECORDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Create the application router
pub fn create_router(state: Arc<AppState>, rate_limit: &RateLimitConfig) -> Result<Router, ApiError> {
    use routes::{buzzer, config, detection, events, realtime, system};

    let governor = rate_limit::create_governor_config(rate_limit)?;
    let limited = Router::new()
        .route("/buzzer/beep", post(buzzer::beep))
        .layer(GovernorLayer { config: governor });

    let static_route = format!(
        "/{}",
        state
            .static_dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("static")
    );

    let router = Router::new()
        .route("/version", get(system::version))
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .route("/detection/start", post(detection::start))
        .route("/detection/restart", post(detection::restart))
        .route("/detection/pause", post(detection::pause))
        .route("/detection/resume", post(detection::resume))
        .route("/detection/stop", post(detection::stop))
        .route("/detection/status", get(detection::status))
        .route("/realtime/video/raw", get(realtime::video_raw))
        .route("/realtime/video/processed", get(realtime::video_processed))
        .route("/realtime/video/debug", get(realtime::video_debug))
        .route("/realtime/data/facialmetrics", get(realtime::facial_metrics_ws))
        .route("/realtime/data/facialmetrics/latest", get(realtime::facial_metrics_latest))
        .route("/realtime/notification/drowsiness", get(realtime::drowsiness_ws))
        .route("/realtime/notification/drowsiness/latest", get(realtime::drowsiness_latest))
        .route("/drowsinessevent", get(events::list).post(events::create))
        .route("/drowsinessevent/", get(events::list).post(events::create))
        .route("/drowsinessevent/download/:id", get(events::download))
        .route("/drowsinessevent/:id", get(events::get).delete(events::delete))
        .route("/buzzer/test", get(buzzer::test))
        .route("/config/detection", get(config::get_detection).post(config::update_detection))
        .route("/config/pipeline", get(config::get_pipeline))
        .route("/config/pipeline/update", post(config::update_pipeline))
        .merge(limited)
        .nest_service(&static_route, ServeDir::new(&state.static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    Ok(router)
}

/// Install the global tracing subscriber. Level comes from `RUST_LOG`,
/// defaulting to `info`.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber already installed: {}", e);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

/// Run the server until a shutdown signal arrives
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus exporter not installed: {}", e);
            None
        }
    };

    let Runtime { state, recorder } = Runtime::build(&config, prometheus).await?;
    tokio::fs::create_dir_all(&state.static_dir).await?;

    let detection = Arc::clone(&state.detection);
    match tokio::task::spawn_blocking(move || detection.start()).await? {
        Ok(status) => info!("Detection running at boot: {:?}", status.state),
        Err(e) => error!("Detection not started at boot: {}", e),
    }

    let app = create_router(Arc::clone(&state), &RateLimitConfig::default())?;
    let listener = tokio::net::TcpListener::bind(&config.api_settings.bind_address).await?;
    info!("Starting API server on {}", config.api_settings.bind_address);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let detection = Arc::clone(&state.detection);
    let buzzer = Arc::clone(&state.buzzer);
    tokio::task::spawn_blocking(move || {
        detection.stop();
        buzzer.stop();
    })
    .await?;

    // Last handle on the event sink goes with the state
    let repository = state.repository.clone();
    drop(state);
    if tokio::time::timeout(RECORDER_DRAIN_TIMEOUT, recorder).await.is_err() {
        warn!("Event recorder still busy at shutdown");
    }
    repository.close().await;

    info!("Server shut down");
    Ok(())
}
