//! Detection Service
//!
//! Runs the capture/detect/alert/publish loop on a dedicated thread and
//! exposes its lifecycle (start, pause, resume, stop, restart). Confirmed
//! episodes are handed to an [`EventSink`]; the [`EventRecorder`] task
//! persists and notifies them off the loop thread.

mod control;
mod pipeline;
mod recorder;
mod service;
mod sink;

pub use control::{Gate, LoopControl};
pub use pipeline::{CycleReport, DetectionLoop, LoopShared};
pub use recorder::EventRecorder;
pub use service::{DetectionService, ServiceParts};
pub use sink::{channel_sink, ChannelEventSink, EpisodeRecord, EventSink, NullSink, SinkMessage};

use camera_capture::CameraError;
use dms::{DetectionConfig, EnabledDetectors};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Detection service error types
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Camera unavailable: {0}")]
    Camera(#[from] CameraError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Image encoding failed: {0}")]
    Encode(String),

    #[error("Failed to spawn detection thread: {0}")]
    Spawn(String),
}

/// Lifecycle of the background loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Running,
    Paused,
}

/// Reported by every lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStatus {
    pub state: LifecycleState,
    /// Loop thread exists and has not exited
    pub is_alive: bool,
    /// Logical run flag
    pub is_running: bool,
}

/// Configuration snapshot read by the loop once per cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub detection: DetectionConfig,
    pub enabled: EnabledDetectors,
    pub target_fps: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            enabled: EnabledDetectors::default(),
            target_fps: 15,
        }
    }
}

impl RuntimeConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}
