//! Camera Capture Library for the Drowsiness Monitor
//!
//! Provides the frame sources the detection loop pulls from:
//! - Capture device (USB or CSI camera, with the `device` feature)
//! - Synthetic test-pattern camera (development hosts, CI)
//! - Image replay camera (recorded JPEG/PNG sequences from a directory)
//!
//! A source is opened through a [`CameraProvider`], selected once at process
//! start from [`CameraConfig`].

#[cfg(feature = "device")]
pub mod device;
pub mod frame;
pub mod source;

#[cfg(feature = "device")]
pub use device::{DeviceCamera, DeviceSettings};
pub use frame::VideoFrame;
pub use source::{ReplayCamera, SyntheticCamera};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Frame capture failed: {0}")]
    Capture(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Camera released")]
    Released,
}

/// Which frame source implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraKind {
    /// Generated moving test pattern
    #[default]
    Synthetic,
    /// Cycle through still images in `replay_dir`
    Replay,
    /// Native capture device `device_index`
    Device,
}

/// Camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Source implementation
    pub kind: CameraKind,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Requested device frame rate
    pub fps: u32,
    /// Index of the capture device for [`CameraKind::Device`]
    pub device_index: u32,
    /// Directory of frames for [`CameraKind::Replay`]
    pub replay_dir: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: CameraKind::Synthetic,
            width: 640,
            height: 480,
            fps: 15,
            device_index: 0,
            replay_dir: None,
        }
    }
}

impl CameraConfig {
    #[cfg(feature = "device")]
    fn open_device(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        let camera = DeviceCamera::open(DeviceSettings {
            index: self.device_index,
            width: self.width,
            height: self.height,
            fps: self.fps,
        })?;
        Ok(Box::new(camera))
    }

    #[cfg(not(feature = "device"))]
    fn open_device(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        Err(CameraError::Open(format!(
            "camera {}: built without the `device` feature",
            self.device_index
        )))
    }
}

/// A camera the detection loop can poll.
///
/// `capture` is called once per loop cycle. A transient `Err` is expected
/// and non-fatal; the loop logs it and retries on the next cycle.
pub trait FrameSource: Send {
    /// Grab the next frame
    fn capture(&mut self) -> Result<VideoFrame, CameraError>;

    /// Release the underlying device. Further captures fail with
    /// [`CameraError::Released`].
    fn release(&mut self);
}

/// Opens a fresh [`FrameSource`] each time detection is started.
pub trait CameraProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

impl CameraProvider for CameraConfig {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        match self.kind {
            CameraKind::Synthetic => Ok(Box::new(SyntheticCamera::new(self.width, self.height))),
            CameraKind::Replay => {
                let dir = self.replay_dir.as_ref().ok_or_else(|| {
                    CameraError::Open("replay camera requires replay_dir".to_string())
                })?;
                Ok(Box::new(ReplayCamera::open(dir)?))
            }
            CameraKind::Device => self.open_device(),
        }
    }
}

impl<F> CameraProvider for F
where
    F: Fn() -> Result<Box<dyn FrameSource>, CameraError> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        self()
    }
}
