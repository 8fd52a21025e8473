//! Lifecycle controller over the detection loop

use crate::control::LoopControl;
use crate::pipeline::{DetectionLoop, LoopShared};
use crate::sink::EventSink;
use crate::{DetectionError, DetectionStatus, LifecycleState, RuntimeConfig};
use alerting::BuzzerController;
use arc_swap::ArcSwap;
use camera_capture::CameraProvider;
use dms::{DetectionConfig, DetectorSet, EnabledDetectors, InferenceEngine, ModelFactory, ModelPaths};
use frame_buffer::SharedFrameBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Everything the service needs, built once at process start
pub struct ServiceParts {
    pub camera: Arc<dyn CameraProvider>,
    pub detectors: DetectorSet,
    pub buffer: Arc<SharedFrameBuffer>,
    pub buzzer: Arc<BuzzerController>,
    pub sink: Arc<dyn EventSink>,
    pub config: RuntimeConfig,
}

struct Worker {
    handle: JoinHandle<DetectorSet>,
    control: Arc<LoopControl>,
}

/// Clears the alive flag when the loop thread exits, panics included
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Lifecycle {
    worker: Option<Worker>,
    /// Parked detectors while no loop is running
    detectors: Option<DetectorSet>,
}

/// Start/pause/resume/stop/restart over a single loop thread.
///
/// Every operation returns the resulting [`DetectionStatus`]; calling one
/// in a state it does not apply to changes nothing. Transitions are
/// serialized by the lifecycle mutex; status reads never take it.
pub struct DetectionService {
    camera: Arc<dyn CameraProvider>,
    shared: LoopShared,
    lifecycle: Mutex<Lifecycle>,
    /// Written only while the lifecycle mutex is held
    state: ArcSwap<LifecycleState>,
    alive: Arc<AtomicBool>,
}

impl DetectionService {
    pub fn new(parts: ServiceParts) -> Self {
        Self {
            camera: parts.camera,
            shared: LoopShared {
                config: Arc::new(ArcSwap::from_pointee(parts.config)),
                buffer: parts.buffer,
                buzzer: parts.buzzer,
                sink: parts.sink,
            },
            lifecycle: Mutex::new(Lifecycle {
                worker: None,
                detectors: Some(parts.detectors),
            }),
            state: ArcSwap::from_pointee(LifecycleState::Stopped),
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn buffer(&self) -> &Arc<SharedFrameBuffer> {
        &self.shared.buffer
    }

    pub fn buzzer(&self) -> &Arc<BuzzerController> {
        &self.shared.buzzer
    }

    fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(Arc::new(state));
    }

    /// Last completed transition. Does not wait for one in progress.
    pub fn status(&self) -> DetectionStatus {
        let state = self.state();
        DetectionStatus {
            state,
            is_alive: self.alive.load(Ordering::Acquire),
            is_running: state == LifecycleState::Running,
        }
    }

    /// Loop thread alive
    pub fn is_active(&self) -> bool {
        self.status().is_alive
    }

    /// Logical run flag
    pub fn is_running(&self) -> bool {
        self.status().is_running
    }

    /// Open the camera and spawn the loop. Only acts when stopped.
    pub fn start(&self) -> Result<DetectionStatus, DetectionError> {
        let mut lifecycle = self.lock();
        self.start_locked(&mut lifecycle)?;
        Ok(self.status())
    }

    fn start_locked(&self, lifecycle: &mut Lifecycle) -> Result<(), DetectionError> {
        if self.state() != LifecycleState::Stopped {
            return Ok(());
        }

        let source = self.camera.open()?;
        let detectors = lifecycle.detectors.take().unwrap_or_else(|| {
            error!("Detectors lost with a crashed loop, continuing without models");
            DetectorSet::from_factory(&ModelFactory::new(InferenceEngine::None, ModelPaths::default()))
        });

        let control = Arc::new(LoopControl::new());
        let detection_loop =
            DetectionLoop::new(source, detectors, self.shared.clone(), Arc::clone(&control));
        self.alive.store(true, Ordering::Release);
        let alive = AliveGuard(Arc::clone(&self.alive));
        let handle = thread::Builder::new()
            .name("detection".into())
            .spawn(move || {
                let _alive = alive;
                detection_loop.run()
            })
            .map_err(|e| DetectionError::Spawn(e.to_string()))?;

        lifecycle.worker = Some(Worker { handle, control });
        self.set_state(LifecycleState::Running);
        info!("Detection started");
        Ok(())
    }

    pub fn pause(&self) -> DetectionStatus {
        let lifecycle = self.lock();
        if self.state() == LifecycleState::Running {
            if let Some(worker) = &lifecycle.worker {
                worker.control.pause();
            }
            self.shared.buzzer.drive(alerting::AlertStage::None);
            self.set_state(LifecycleState::Paused);
            info!("Detection paused");
        }
        self.status()
    }

    pub fn resume(&self) -> DetectionStatus {
        let lifecycle = self.lock();
        if self.state() == LifecycleState::Paused {
            if let Some(worker) = &lifecycle.worker {
                worker.control.resume();
            }
            self.set_state(LifecycleState::Running);
            info!("Detection resumed");
        }
        self.status()
    }

    /// Signal the loop, wait for its current cycle to finish, stop the buzzer
    pub fn stop(&self) -> DetectionStatus {
        let mut lifecycle = self.lock();
        self.stop_locked(&mut lifecycle);
        self.status()
    }

    fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        if self.state() == LifecycleState::Stopped {
            return;
        }
        if let Some(worker) = lifecycle.worker.take() {
            worker.control.request_stop();
            match worker.handle.join() {
                Ok(detectors) => lifecycle.detectors = Some(detectors),
                Err(_) => warn!("Detection loop panicked"),
            }
        }
        self.shared.buzzer.stop();
        self.set_state(LifecycleState::Stopped);
        info!("Detection stopped");
    }

    /// Stop then start under one lifecycle lock
    pub fn restart(&self) -> Result<DetectionStatus, DetectionError> {
        let mut lifecycle = self.lock();
        self.stop_locked(&mut lifecycle);
        self.start_locked(&mut lifecycle)?;
        Ok(self.status())
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Arc<RuntimeConfig> {
        self.shared.config.load_full()
    }

    /// Swap detection settings; the loop applies them on its next cycle
    pub fn reinitialize_configuration(&self, detection: DetectionConfig) -> Result<(), DetectionError> {
        detection
            .validate()
            .map_err(|e| DetectionError::Config(e.to_string()))?;
        self.shared.config.rcu(|current| RuntimeConfig {
            detection: detection.clone(),
            ..RuntimeConfig::clone(current)
        });
        info!("Detection settings updated");
        Ok(())
    }

    /// Swap detector toggles
    pub fn update_pipeline(&self, enabled: EnabledDetectors) {
        self.shared.config.rcu(|current| RuntimeConfig {
            enabled,
            ..RuntimeConfig::clone(current)
        });
        info!("Pipeline toggles updated: {:?}", enabled);
    }
}

impl Drop for DetectionService {
    fn drop(&mut self) {
        let mut lifecycle = self.lock();
        self.stop_locked(&mut lifecycle);
    }
}
