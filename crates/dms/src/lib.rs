//! Driver Monitoring System (DMS)
//!
//! Per-frame driver state analysis from landmark models:
//! - Eye aspect ratio (eyes closed) and mouth aspect ratio (yawning)
//! - Phone use from body pose (hand held near an ear)
//! - Hand landmarks for the processed stream
//!
//! Each capability implements [`Detector`]; the detection loop keeps the
//! temporal state (consecutive-frame counters) itself.

pub mod analysis;
pub mod annotate;
pub mod config;
pub mod drowsiness;
pub mod landmarks;
pub mod model;
pub mod phone;

pub use analysis::{DetectorSet, EnabledDetectors, FrameAnalysis};
pub use annotate::annotate;
pub use config::{DetectionConfig, DrowsinessConfig, PhoneDetectionConfig};
pub use drowsiness::{DrowsinessDetector, DrowsinessResult};
pub use landmarks::{Landmarks, Point};
pub use model::{Capability, InferenceEngine, LandmarkModel, ModelFactory, ModelPaths};
pub use phone::{HandsDetector, HandsResult, PhoneDetectionResult, PhoneDetector, PhoneState};

use camera_capture::VideoFrame;
use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}

/// A per-frame detection capability.
///
/// `infer` receives the configuration snapshot of the current cycle and
/// reads its thresholds from it, so a detector holds no copy of them.
/// `reinitialize_configuration` is called once whenever that snapshot
/// changes, before the next `infer`; it is the hook for state derived from
/// the settings, and detectors without such state only log the change.
pub trait Detector: Send {
    type Output;

    fn name(&self) -> &'static str;

    fn infer(&mut self, frame: &VideoFrame, config: &DetectionConfig)
        -> Result<Self::Output, DmsError>;

    fn reinitialize_configuration(&mut self, config: &DetectionConfig);
}
