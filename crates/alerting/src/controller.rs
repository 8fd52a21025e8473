//! Background beep loop driven by the current alert stage

use crate::buzzer::{BeepPattern, Buzzer};
use crate::stage::AlertStage;
use crate::BuzzerError;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct LoopState {
    stage: AlertStage,
    running: bool,
}

struct Shared {
    state: Mutex<LoopState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Hardware = Arc<Mutex<Box<dyn Buzzer>>>;

fn lock_hardware(hardware: &Hardware) -> MutexGuard<'_, Box<dyn Buzzer>> {
    hardware.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the buzzer and a lazily started beep thread.
///
/// The thread reads the stage at each cycle boundary, so a cycle in
/// progress always completes before a new cadence applies.
pub struct BuzzerController {
    hardware: Hardware,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BuzzerController {
    pub fn new(hardware: Box<dyn Buzzer>) -> Self {
        Self {
            hardware: Arc::new(Mutex::new(hardware)),
            shared: Arc::new(Shared {
                state: Mutex::new(LoopState {
                    stage: AlertStage::None,
                    running: false,
                }),
                wake: Condvar::new(),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Stage the beep loop is currently following
    pub fn stage(&self) -> AlertStage {
        self.shared.lock().stage
    }

    /// Whether the beep thread exists and has not exited
    pub fn is_looping(&self) -> bool {
        self.thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Follow `stage`. `None` idles the loop without ending it.
    pub fn drive(&self, stage: AlertStage) {
        {
            let mut state = self.shared.lock();
            if state.stage == stage && (state.running || stage == AlertStage::None) {
                return;
            }
            debug!("Buzzer stage {} -> {}", state.stage, stage);
            state.stage = stage;
        }
        self.shared.wake.notify_all();

        if stage != AlertStage::None {
            self.ensure_thread();
        }
    }

    fn ensure_thread(&self) {
        let mut slot = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        if let Some(finished) = slot.take() {
            let _ = finished.join();
        }

        self.shared.lock().running = true;
        let shared = Arc::clone(&self.shared);
        let hardware = Arc::clone(&self.hardware);
        match thread::Builder::new()
            .name("buzzer".into())
            .spawn(move || beep_loop(shared, hardware))
        {
            Ok(handle) => {
                info!("Beep loop started");
                *slot = Some(handle);
            }
            Err(e) => {
                warn!("Failed to start beep loop: {}", e);
                self.shared.lock().running = false;
            }
        }
    }

    /// End the beep loop, wait for it, release the hardware
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock();
            state.running = false;
            state.stage = AlertStage::None;
        }
        self.shared.wake.notify_all();

        let handle = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Beep loop panicked");
            }
            info!("Beep loop stopped");
        }
        lock_hardware(&self.hardware).cleanup();
    }

    /// Sound one stage-1 cycle on the caller's thread
    pub fn test(&self) -> Result<(), BuzzerError> {
        lock_hardware(&self.hardware).beep_stage_1()
    }

    /// Manual beep on the caller's thread
    pub fn beep(
        &self,
        times: u32,
        duration_ms: u64,
        pause: Duration,
        frequency_hz: u32,
    ) -> Result<(), BuzzerError> {
        lock_hardware(&self.hardware).beep(times, duration_ms, pause, frequency_hz)
    }
}

impl Drop for BuzzerController {
    fn drop(&mut self) {
        if self.is_looping() {
            self.stop();
        }
    }
}

fn beep_loop(shared: Arc<Shared>, hardware: Hardware) {
    let mut silenced = true;
    loop {
        let stage = {
            let state = shared.lock();
            if !state.running {
                return;
            }
            state.stage
        };

        let Some(pattern) = BeepPattern::for_stage(stage) else {
            if !silenced {
                lock_hardware(&hardware).cleanup();
                silenced = true;
            }
            let state = shared.lock();
            let _idle = shared
                .wake
                .wait_while(state, |s| s.running && s.stage == AlertStage::None)
                .unwrap_or_else(PoisonError::into_inner);
            continue;
        };

        silenced = false;
        let result = lock_hardware(&hardware).play(&pattern);
        if let Err(e) = result {
            warn!("Buzzer beep failed at {}: {}", stage, e);
            // Hold the cadence so a dead buzzer does not spin
            let state = shared.lock();
            let _ = shared
                .wake
                .wait_timeout_while(state, pattern.cycle(), |s| s.running && s.stage == stage)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
