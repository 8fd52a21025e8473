//! Native capture device through nokhwa
//!
//! nokhwa cameras are not `Send`, so the device lives on its own thread
//! and the loop thread exchanges one request for one frame with it.

use crate::frame::VideoFrame;
use crate::{CameraError, FrameSource};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest wait for one frame before the cycle is reported as failed
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

/// Requested capture mode; the device picks the closest it supports
#[derive(Debug, Clone, Copy)]
pub struct DeviceSettings {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

type FrameResult = Result<VideoFrame, CameraError>;

pub struct DeviceCamera {
    index: u32,
    requests: Option<SyncSender<()>>,
    frames: Receiver<FrameResult>,
    worker: Option<JoinHandle<()>>,
}

impl DeviceCamera {
    /// Open the device and start streaming. Fails if the device cannot be
    /// opened in any RGB-decodable mode.
    pub fn open(settings: DeviceSettings) -> Result<Self, CameraError> {
        let (requests, request_rx) = mpsc::sync_channel(1);
        let (frame_tx, frames) = mpsc::sync_channel(1);
        let (ready_tx, ready) = mpsc::sync_channel(1);

        let worker = thread::Builder::new()
            .name(format!("camera-{}", settings.index))
            .spawn(move || device_thread(settings, request_rx, frame_tx, ready_tx))
            .map_err(|e| CameraError::Open(e.to_string()))?;

        match ready.recv() {
            Ok(Ok(name)) => {
                info!("Opened camera {} ({})", settings.index, name);
                Ok(Self {
                    index: settings.index,
                    requests: Some(requests),
                    frames,
                    worker: Some(worker),
                })
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(CameraError::Open(format!("camera {} thread exited", settings.index)))
            }
        }
    }
}

impl FrameSource for DeviceCamera {
    fn capture(&mut self) -> Result<VideoFrame, CameraError> {
        let requests = self.requests.as_ref().ok_or(CameraError::Released)?;

        // A frame that arrived after an earlier timeout is stale
        if self.frames.try_recv().is_ok() {
            debug!("Dropped late frame from camera {}", self.index);
        }
        requests
            .send(())
            .map_err(|_| CameraError::Capture("camera thread exited".to_string()))?;

        match self.frames.recv_timeout(CAPTURE_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CameraError::Capture(format!(
                "no frame within {:?}",
                CAPTURE_TIMEOUT
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CameraError::Capture("camera thread exited".to_string()))
            }
        }
    }

    fn release(&mut self) {
        // Closing the request channel ends the device thread
        if self.requests.take().is_none() {
            return;
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Camera {} thread panicked", self.index);
            }
        }
        info!("Released camera {}", self.index);
    }
}

impl Drop for DeviceCamera {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_device(settings: &DeviceSettings) -> Result<Camera, CameraError> {
    let format = CameraFormat::new(
        Resolution::new(settings.width, settings.height),
        FrameFormat::MJPEG,
        settings.fps,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));
    let mut camera = Camera::new(CameraIndex::Index(settings.index), requested)
        .map_err(|e| CameraError::Open(e.to_string()))?;
    camera
        .open_stream()
        .map_err(|e| CameraError::Open(e.to_string()))?;
    Ok(camera)
}

fn grab(camera: &mut Camera, sequence: u64) -> FrameResult {
    let buffer = camera
        .frame()
        .map_err(|e| CameraError::Capture(e.to_string()))?;
    let image = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| CameraError::Format(e.to_string()))?;
    let (width, height) = (image.width(), image.height());
    Ok(VideoFrame::new(image.into_raw(), width, height, crate::source::now_ns(), sequence))
}

fn device_thread(
    settings: DeviceSettings,
    requests: Receiver<()>,
    frames: SyncSender<FrameResult>,
    ready: SyncSender<Result<String, CameraError>>,
) {
    let mut camera = match open_device(&settings) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(camera.info().human_name()));

    let mut sequence = 0u64;
    while requests.recv().is_ok() {
        let result = grab(&mut camera, sequence);
        sequence += 1;
        if frames.send(result).is_err() {
            break;
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("Camera {} did not stop cleanly: {}", settings.index, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_fails_to_open() {
        let settings = DeviceSettings {
            index: 97,
            width: 640,
            height: 480,
            fps: 15,
        };
        assert!(matches!(DeviceCamera::open(settings), Err(CameraError::Open(_))));
    }
}
