//! DMS configuration

use crate::DmsError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Eye/mouth thresholds and alert hysteresis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrowsinessConfig {
    /// EAR below this counts as an eyes-closed frame
    pub eye_aspect_ratio_threshold: f32,

    /// Consecutive eyes-closed frames before stage 1
    pub eye_aspect_ratio_consec_frames: u32,

    /// MAR above this counts as a yawning frame
    pub mouth_aspect_ratio_threshold: f32,

    /// Consecutive yawning frames before a yawn is confirmed
    pub mouth_aspect_ratio_consec_frames: u32,

    /// Pixelate the face region in the processed stream
    pub apply_masking: bool,

    /// Additional closed-eye frames per stage escalation (0 = same as entry)
    #[serde(default)]
    pub escalation_frames: u32,

    /// Consecutive open-eye frames that end an episode
    #[serde(default = "default_recovery_frames")]
    pub recovery_frames: u32,
}

fn default_recovery_frames() -> u32 {
    10
}

impl Default for DrowsinessConfig {
    fn default() -> Self {
        Self {
            eye_aspect_ratio_threshold: 0.21,
            eye_aspect_ratio_consec_frames: 10,
            mouth_aspect_ratio_threshold: 0.6,
            mouth_aspect_ratio_consec_frames: 15,
            apply_masking: false,
            escalation_frames: 0,
            recovery_frames: default_recovery_frames(),
        }
    }
}

impl DrowsinessConfig {
    /// Frames per escalation step, falling back to the entry window
    pub fn effective_escalation_frames(&self) -> u32 {
        if self.escalation_frames == 0 {
            self.eye_aspect_ratio_consec_frames
        } else {
            self.escalation_frames
        }
    }
}

/// Phone-use detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneDetectionConfig {
    /// Max hand-to-ear distance (pixels) that counts as holding a phone
    pub distance_threshold: u32,
}

impl Default for PhoneDetectionConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 60,
        }
    }
}

/// Detection settings persisted as JSON and editable at runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub drowsiness: DrowsinessConfig,
    pub phone_detection: PhoneDetectionConfig,
}

impl DetectionConfig {
    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DmsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DmsError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| DmsError::Config(e.to_string()))?;
        config.validate()?;
        info!("Loaded detection settings from {}", path.display());
        Ok(config)
    }

    /// Load settings, or defaults when the file does not exist yet
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, DmsError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            info!("No detection settings at {}, using defaults", path.as_ref().display());
            Ok(Self::default())
        }
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DmsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DmsError::Config(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| DmsError::Config(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| DmsError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Reject values that would make the trackers misbehave
    pub fn validate(&self) -> Result<(), DmsError> {
        let d = &self.drowsiness;
        if !(d.eye_aspect_ratio_threshold > 0.0) {
            return Err(DmsError::Config("eye_aspect_ratio_threshold must be positive".into()));
        }
        if !(d.mouth_aspect_ratio_threshold > 0.0) {
            return Err(DmsError::Config("mouth_aspect_ratio_threshold must be positive".into()));
        }
        if d.eye_aspect_ratio_consec_frames == 0 || d.mouth_aspect_ratio_consec_frames == 0 {
            return Err(DmsError::Config("consecutive frame counts must be non-zero".into()));
        }
        if d.recovery_frames == 0 {
            return Err(DmsError::Config("recovery_frames must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/detection_settings.json");

        let config = DetectionConfig {
            drowsiness: DrowsinessConfig {
                eye_aspect_ratio_threshold: 0.24,
                eye_aspect_ratio_consec_frames: 6,
                mouth_aspect_ratio_consec_frames: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(DetectionConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_new_fields_use_defaults() {
        let json = r#"{
            "drowsiness": {
                "eye_aspect_ratio_threshold": 0.2,
                "eye_aspect_ratio_consec_frames": 12,
                "mouth_aspect_ratio_threshold": 0.7,
                "mouth_aspect_ratio_consec_frames": 20,
                "apply_masking": true
            },
            "phone_detection": { "distance_threshold": 80 }
        }"#;
        let config: DetectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.drowsiness.recovery_frames, 10);
        assert_eq!(config.drowsiness.effective_escalation_frames(), 12);
    }

    #[test]
    fn test_validate_rejects_zero_frames() {
        let mut config = DetectionConfig::default();
        config.drowsiness.eye_aspect_ratio_consec_frames = 0;
        assert!(matches!(config.validate(), Err(DmsError::Config(_))));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = DetectionConfig::load_or_default(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, DetectionConfig::default());
    }
}
