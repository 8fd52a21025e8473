//! Application settings
//!
//! Loaded once at start from `config/app_settings.json` (or the path given
//! on the command line) and overlaid with `DROWSY__`-prefixed environment
//! variables, e.g. `DROWSY__API_SETTINGS__SERVER=broker.local`.

use crate::ApiError;
use alerting::BuzzerKind;
use camera_capture::CameraConfig;
use dms::{EnabledDetectors, InferenceEngine, ModelPaths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config/app_settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub drowsiness_model_run: bool,
    pub phone_detection_model_run: bool,
    pub hands_detection_model_run: bool,
    pub inference_engine: InferenceEngine,
    #[serde(flatten)]
    pub models: ModelPaths,
    pub target_fps: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let enabled = EnabledDetectors::default();
        Self {
            drowsiness_model_run: enabled.drowsiness_model_run,
            phone_detection_model_run: enabled.phone_detection_model_run,
            hands_detection_model_run: enabled.hands_detection_model_run,
            inference_engine: InferenceEngine::default(),
            models: ModelPaths::default(),
            target_fps: 15,
        }
    }
}

impl PipelineSettings {
    pub fn enabled(&self) -> EnabledDetectors {
        EnabledDetectors {
            drowsiness_model_run: self.drowsiness_model_run,
            phone_detection_model_run: self.phone_detection_model_run,
            hands_detection_model_run: self.hands_detection_model_run,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionStrings {
    /// SQLite file path or `sqlite:` URL
    pub db_connections: String,
}

impl Default for ConnectionStrings {
    fn default() -> Self {
        Self {
            db_connections: "data/drowsiness.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub vehicle_id: String,
    /// MQTT broker host
    pub server: String,
    /// MQTT broker port
    pub port: u16,
    pub device: String,
    pub static_dir: String,
    pub image_event_dir: String,
    pub send_to_server: bool,
    pub bind_address: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            vehicle_id: "VH-001".to_string(),
            server: "localhost".to_string(),
            port: 1883,
            device: "dev".to_string(),
            static_dir: "static".to_string(),
            image_event_dir: "images".to_string(),
            send_to_server: false,
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSettings {
    pub camera: CameraConfig,
    pub buzzer: BuzzerKind,
}

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline_settings: PipelineSettings,
    pub connection_strings: ConnectionStrings,
    pub api_settings: ApiSettings,
    pub hardware: HardwareSettings,
    pub detection_settings_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipeline_settings: PipelineSettings::default(),
            connection_strings: ConnectionStrings::default(),
            api_settings: ApiSettings::default(),
            hardware: HardwareSettings::default(),
            detection_settings_path: PathBuf::from("config/detection_settings.json"),
        }
    }
}

impl AppConfig {
    /// Load from `path` (optional file) plus `DROWSY__` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("DROWSY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        let app: AppConfig = config
            .try_deserialize()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        info!("Loaded application settings from {}", path.display());
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app_settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "pipeline_settings": {{ "inference_engine": "none", "hands_detection_model_run": true }},
                "api_settings": {{ "vehicle_id": "VH-042", "send_to_server": true }},
                "hardware": {{ "buzzer": {{ "kind": "gpio" }}, "camera": {{ "width": 320 }} }}
            }}"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.pipeline_settings.inference_engine, InferenceEngine::None);
        assert!(config.pipeline_settings.enabled().hands_detection_model_run);
        assert!(config.pipeline_settings.drowsiness_model_run);
        assert_eq!(config.api_settings.vehicle_id, "VH-042");
        assert!(config.api_settings.send_to_server);
        assert_eq!(config.api_settings.static_dir, "static");
        assert_eq!(config.hardware.buzzer, BuzzerKind::Gpio { pin: 23 });
        assert_eq!(config.hardware.camera.width, 320);
        assert_eq!(config.hardware.camera.height, 480);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app_settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ApiError::Config(_))));
    }
}
