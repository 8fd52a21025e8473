//! Pause/stop signalling between the lifecycle controller and the loop

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Flags {
    paused: bool,
    stop: bool,
}

/// What the loop should do at the top of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Run,
    Paused,
    Stop,
}

/// Run/pause/stop flags plus a condition variable the loop parks and
/// sleeps on, so that pause and stop take effect without polling.
#[derive(Debug, Default)]
pub struct LoopControl {
    flags: Mutex<Flags>,
    wake: Condvar,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pause(&self) {
        self.lock().paused = true;
        self.wake.notify_all();
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        self.wake.notify_all();
    }

    pub fn request_stop(&self) {
        self.lock().stop = true;
        self.wake.notify_all();
    }

    pub fn gate(&self) -> Gate {
        let flags = self.lock();
        if flags.stop {
            Gate::Stop
        } else if flags.paused {
            Gate::Paused
        } else {
            Gate::Run
        }
    }

    /// Park while paused. `false` means stop was requested.
    pub fn wait_resumed(&self) -> bool {
        let flags = self.lock();
        let flags = self
            .wake
            .wait_while(flags, |f| f.paused && !f.stop)
            .unwrap_or_else(PoisonError::into_inner);
        !flags.stop
    }

    /// Sleep up to `duration`; pause or stop end it early.
    /// `false` means stop was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let flags = self.lock();
        let (flags, _) = self
            .wake
            .wait_timeout_while(flags, duration, |f| !f.paused && !f.stop)
            .unwrap_or_else(PoisonError::into_inner);
        !flags.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_gate_precedence() {
        let control = LoopControl::new();
        assert_eq!(control.gate(), Gate::Run);
        control.pause();
        assert_eq!(control.gate(), Gate::Paused);
        control.request_stop();
        assert_eq!(control.gate(), Gate::Stop);
    }

    #[test]
    fn test_stop_wakes_sleep_early() {
        let control = Arc::new(LoopControl::new());
        let waker = Arc::clone(&control);
        let started = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.request_stop();
        });

        assert!(!control.sleep(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_resume_unparks() {
        let control = Arc::new(LoopControl::new());
        control.pause();
        let waker = Arc::clone(&control);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.resume();
        });

        assert!(control.wait_resumed());
        assert_eq!(control.gate(), Gate::Run);
        handle.join().unwrap();
    }

    #[test]
    fn test_full_sleep_without_signal() {
        let control = LoopControl::new();
        let started = Instant::now();
        assert!(control.sleep(Duration::from_millis(15)));
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
