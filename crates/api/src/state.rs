//! Shared handler state and process wiring

use crate::config::AppConfig;
use crate::ApiError;
use alerting::{Buzzer, BuzzerController, LogBuzzer};
use cloud_sync::{CloudConfig, DisabledNotifier, MqttNotifier, Notifier};
use detection_service::{channel_sink, DetectionService, EventRecorder, RuntimeConfig, ServiceParts};
use dms::{DetectionConfig, DetectorSet, ModelFactory};
use frame_buffer::SharedFrameBuffer;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{EventRepository, ImageStore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Pending episode records between the loop and the recorder
const RECORD_CHANNEL_CAPACITY: usize = 32;

const QUOTA_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Application state shared across handlers
pub struct AppState {
    pub detection: Arc<DetectionService>,
    pub buffer: Arc<SharedFrameBuffer>,
    pub buzzer: Arc<BuzzerController>,
    pub repository: EventRepository,
    pub images: ImageStore,
    /// Where `POST /config/detection` persists settings
    pub detection_settings_path: PathBuf,
    pub vehicle_id: String,
    pub static_dir: PathBuf,
    pub prometheus: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    /// Cadence of the MJPEG and metrics pushes
    pub fn stream_interval(&self) -> Duration {
        self.detection
            .config()
            .frame_interval()
            .max(Duration::from_millis(1))
    }
}

/// Process-wide components built from [`AppConfig`]
pub struct Runtime {
    pub state: Arc<AppState>,
    /// Finishes once the detection service is dropped
    pub recorder: JoinHandle<()>,
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    let api = &config.api_settings;
    if !api.send_to_server {
        info!("Server notifications disabled");
        return Arc::new(DisabledNotifier);
    }

    let cloud = CloudConfig {
        broker_url: api.server.clone(),
        broker_port: api.port,
        vehicle_id: api.vehicle_id.clone(),
        ..CloudConfig::default()
    };
    match MqttNotifier::connect(cloud) {
        Ok(notifier) => {
            let quota = Arc::clone(&notifier);
            tokio::spawn(async move {
                let mut daily = tokio::time::interval(QUOTA_PERIOD);
                daily.tick().await;
                loop {
                    daily.tick().await;
                    quota.reset_daily_quota();
                }
            });
            notifier as Arc<dyn Notifier>
        }
        Err(e) => {
            warn!("MQTT unavailable, notifications disabled: {}", e);
            Arc::new(DisabledNotifier)
        }
    }
}

fn build_buzzer(config: &AppConfig) -> BuzzerController {
    let hardware = config.hardware.buzzer.build().unwrap_or_else(|e| {
        warn!("Buzzer {:?} unavailable, using log buzzer: {}", config.hardware.buzzer, e);
        Box::new(LogBuzzer::default()) as Box<dyn Buzzer>
    });
    BuzzerController::new(hardware)
}

impl Runtime {
    /// Connect storage, pick hardware and models, wire the detection service.
    /// Must run inside a tokio runtime.
    pub async fn build(config: &AppConfig, prometheus: Option<PrometheusHandle>) -> Result<Self, ApiError> {
        let repository = EventRepository::connect(&config.connection_strings.db_connections).await?;
        let api = &config.api_settings;
        let images = ImageStore::new(&api.static_dir, &api.image_event_dir);
        let notifier = build_notifier(config);

        let detection_config = DetectionConfig::load_or_default(&config.detection_settings_path)
            .map_err(|e| ApiError::Config(e.to_string()))?;
        let pipeline = &config.pipeline_settings;
        let factory = ModelFactory::new(pipeline.inference_engine, pipeline.models.clone());
        let detectors = DetectorSet::from_factory(&factory);

        let (sink, rx) = channel_sink(RECORD_CHANNEL_CAPACITY);
        let recorder = EventRecorder::new(
            repository.clone(),
            images.clone(),
            notifier,
            api.vehicle_id.clone(),
        )
        .spawn(rx);

        let buffer = Arc::new(SharedFrameBuffer::new());
        let buzzer = Arc::new(build_buzzer(config));
        let detection = Arc::new(DetectionService::new(ServiceParts {
            camera: Arc::new(config.hardware.camera.clone()),
            detectors,
            buffer: Arc::clone(&buffer),
            buzzer: Arc::clone(&buzzer),
            sink: Arc::new(sink),
            config: RuntimeConfig {
                detection: detection_config,
                enabled: pipeline.enabled(),
                target_fps: pipeline.target_fps,
            },
        }));

        let state = Arc::new(AppState {
            detection,
            buffer,
            buzzer,
            repository,
            images,
            detection_settings_path: config.detection_settings_path.clone(),
            vehicle_id: api.vehicle_id.clone(),
            static_dir: PathBuf::from(&api.static_dir),
            prometheus,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        });

        Ok(Self { state, recorder })
    }
}
