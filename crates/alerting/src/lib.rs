//! Alerting System
//!
//! Maps drowsiness severity onto buzzer behaviour:
//! - [`StageTracker`]: consecutive-frame hysteresis producing [`AlertStage`]
//! - [`BuzzerController`]: background beep loop following the current stage
//! - [`Buzzer`] drivers: sysfs GPIO and a logging stand-in

mod buzzer;
mod controller;
mod stage;

pub use buzzer::{BeepPattern, Buzzer, BuzzerKind, LogBuzzer, SysfsGpioBuzzer};
pub use controller::BuzzerController;
pub use stage::{AlertStage, StageTracker, StageTransition};

use thiserror::Error;

/// Buzzer error types
#[derive(Error, Debug)]
pub enum BuzzerError {
    #[error("GPIO I/O failed: {0}")]
    Io(String),

    #[error("Buzzer unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for BuzzerError {
    fn from(e: std::io::Error) -> Self {
        BuzzerError::Io(e.to_string())
    }
}
