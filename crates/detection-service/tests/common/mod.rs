//! Shared fixtures for the detection loop tests

#![allow(dead_code)]

use alerting::{Buzzer, BuzzerController, BuzzerError};
use camera_capture::{CameraError, FrameSource, SyntheticCamera, VideoFrame};
use detection_service::{EventSink, LoopShared, RuntimeConfig};
use dms::landmarks::synthetic_face;
use dms::model::{NoopModel, ScriptedModel};
use dms::{DetectorSet, DrowsinessDetector, HandsDetector, PhoneDetector};
use frame_buffer::SharedFrameBuffer;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Buzzer that records the pause of each beep instead of sounding
#[derive(Clone)]
pub struct QuietBuzzer {
    pub pauses: Arc<Mutex<Vec<Duration>>>,
    pub cleanups: Arc<AtomicUsize>,
    /// Time one beep call holds the hardware
    pub beep_time: Duration,
}

impl Default for QuietBuzzer {
    fn default() -> Self {
        Self {
            pauses: Arc::default(),
            cleanups: Arc::default(),
            beep_time: Duration::from_millis(1),
        }
    }
}

impl QuietBuzzer {
    pub fn slow(beep_time: Duration) -> Self {
        Self {
            beep_time,
            ..Self::default()
        }
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

impl Buzzer for QuietBuzzer {
    fn beep(&mut self, _times: u32, _ms: u64, pause: Duration, _hz: u32) -> Result<(), BuzzerError> {
        std::thread::sleep(self.beep_time);
        self.pauses.lock().unwrap().push(pause);
        Ok(())
    }

    fn cleanup(&mut self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Face model reporting the given eye openness on every frame
pub fn detectors_with_ear(ear: f32) -> DetectorSet {
    DetectorSet::new(
        DrowsinessDetector::new(Box::new(ScriptedModel::constant(vec![synthetic_face(ear, 0.2)]))),
        PhoneDetector::new(Box::new(NoopModel)),
        HandsDetector::new(Box::new(NoopModel)),
    )
}

pub fn closed_eyes() -> DetectorSet {
    detectors_with_ear(0.1)
}

pub fn open_eyes() -> DetectorSet {
    detectors_with_ear(0.3)
}

pub fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        target_fps: 200,
        ..Default::default()
    }
}

pub fn quiet_controller() -> (Arc<BuzzerController>, QuietBuzzer) {
    let buzzer = QuietBuzzer::default();
    (Arc::new(BuzzerController::new(Box::new(buzzer.clone()))), buzzer)
}

pub fn shared(config: RuntimeConfig, sink: Arc<dyn EventSink>) -> (LoopShared, QuietBuzzer) {
    let (buzzer, quiet) = quiet_controller();
    let shared = LoopShared {
        config: Arc::new(ArcSwap::from_pointee(config)),
        buffer: Arc::new(SharedFrameBuffer::new()),
        buzzer,
        sink,
    };
    (shared, quiet)
}

pub fn camera() -> Box<dyn FrameSource> {
    Box::new(SyntheticCamera::new(64, 48))
}

/// Counts opens and releases across every source it hands out
#[derive(Clone, Default)]
pub struct CountingCameras {
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl CountingCameras {
    pub fn open(&self) -> Box<dyn FrameSource> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Box::new(CountingCamera {
            inner: SyntheticCamera::new(32, 24),
            released: Arc::clone(&self.released),
        })
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

pub struct CountingCamera {
    inner: SyntheticCamera,
    released: Arc<AtomicUsize>,
}

impl FrameSource for CountingCamera {
    fn capture(&mut self) -> Result<VideoFrame, CameraError> {
        self.inner.capture()
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release();
    }
}

/// Fails every other capture
pub struct FlakyCamera {
    inner: SyntheticCamera,
    calls: u64,
}

impl FlakyCamera {
    pub fn new() -> Self {
        Self {
            inner: SyntheticCamera::new(32, 24),
            calls: 0,
        }
    }
}

impl FrameSource for FlakyCamera {
    fn capture(&mut self) -> Result<VideoFrame, CameraError> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            return Err(CameraError::Capture("dropped frame".into()));
        }
        self.inner.capture()
    }

    fn release(&mut self) {
        self.inner.release();
    }
}

pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
