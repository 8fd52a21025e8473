//! Buzzer drivers and stage beep patterns

use crate::stage::AlertStage;
use crate::BuzzerError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One beep cycle: `times` beeps of `duration_ms`, each followed by `pause`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeepPattern {
    pub times: u32,
    pub duration_ms: u64,
    pub pause: Duration,
    pub frequency_hz: u32,
}

impl BeepPattern {
    /// Slow / medium / fast cadence for stages 1-3
    pub fn for_stage(stage: AlertStage) -> Option<BeepPattern> {
        let pause_ms = match stage {
            AlertStage::None => return None,
            AlertStage::Stage1 => 1000,
            AlertStage::Stage2 => 500,
            AlertStage::Stage3 => 100,
        };
        Some(BeepPattern {
            times: 1,
            duration_ms: 1000,
            pause: Duration::from_millis(pause_ms),
            frequency_hz: 0,
        })
    }

    /// Wall time of one cycle
    pub fn cycle(&self) -> Duration {
        (Duration::from_millis(self.duration_ms) + self.pause) * self.times
    }
}

/// Buzzer hardware
pub trait Buzzer: Send {
    /// Sound `times` beeps, blocking until done. `frequency_hz` of 0 drives
    /// the output steadily (active buzzer).
    fn beep(
        &mut self,
        times: u32,
        duration_ms: u64,
        pause: Duration,
        frequency_hz: u32,
    ) -> Result<(), BuzzerError>;

    fn play(&mut self, pattern: &BeepPattern) -> Result<(), BuzzerError> {
        self.beep(pattern.times, pattern.duration_ms, pattern.pause, pattern.frequency_hz)
    }

    fn beep_stage_1(&mut self) -> Result<(), BuzzerError> {
        self.play(&stage_pattern(AlertStage::Stage1))
    }

    fn beep_stage_2(&mut self) -> Result<(), BuzzerError> {
        self.play(&stage_pattern(AlertStage::Stage2))
    }

    fn beep_stage_3(&mut self) -> Result<(), BuzzerError> {
        self.play(&stage_pattern(AlertStage::Stage3))
    }

    /// Silence the output and release the device
    fn cleanup(&mut self);
}

fn stage_pattern(stage: AlertStage) -> BeepPattern {
    BeepPattern::for_stage(stage).unwrap_or(BeepPattern {
        times: 0,
        duration_ms: 0,
        pause: Duration::ZERO,
        frequency_hz: 0,
    })
}

/// Which buzzer driver to build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuzzerKind {
    /// Buzzer on a GPIO line exported through sysfs
    Gpio {
        #[serde(default = "default_pin")]
        pin: u32,
    },
    /// Log beeps and sleep for their duration
    #[default]
    Log,
}

fn default_pin() -> u32 {
    23
}

impl BuzzerKind {
    pub fn build(&self) -> Result<Box<dyn Buzzer>, BuzzerError> {
        match self {
            BuzzerKind::Gpio { pin } => Ok(Box::new(SysfsGpioBuzzer::new(*pin)?)),
            BuzzerKind::Log => Ok(Box::new(LogBuzzer::default())),
        }
    }
}

/// GPIO buzzer through `/sys/class/gpio`
pub struct SysfsGpioBuzzer {
    root: PathBuf,
    pin: u32,
    exported: bool,
}

impl SysfsGpioBuzzer {
    pub fn new(pin: u32) -> Result<Self, BuzzerError> {
        Self::with_root("/sys/class/gpio", pin)
    }

    /// Use an alternative sysfs root
    pub fn with_root(root: impl Into<PathBuf>, pin: u32) -> Result<Self, BuzzerError> {
        let root = root.into();
        if !root.exists() {
            return Err(BuzzerError::Unavailable(format!("{} not present", root.display())));
        }
        info!("GPIO buzzer on pin {}", pin);
        let mut buzzer = Self {
            root,
            pin,
            exported: false,
        };
        buzzer.export()?;
        Ok(buzzer)
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn export(&mut self) -> Result<(), BuzzerError> {
        if self.exported {
            return Ok(());
        }
        if !self.pin_dir().exists() {
            fs::write(self.root.join("export"), self.pin.to_string())?;
        }
        fs::write(self.pin_dir().join("direction"), "out")?;
        self.exported = true;
        Ok(())
    }

    fn set(&self, high: bool) -> Result<(), BuzzerError> {
        fs::write(self.pin_dir().join("value"), if high { "1" } else { "0" })?;
        Ok(())
    }

    fn sound(&self, duration: Duration, frequency_hz: u32) -> Result<(), BuzzerError> {
        if frequency_hz == 0 {
            self.set(true)?;
            thread::sleep(duration);
            return self.set(false);
        }

        // Software square wave for passive buzzers
        let half = Duration::from_secs_f64(0.5 / frequency_hz as f64);
        let cycles = (duration.as_secs_f64() * frequency_hz as f64) as u64;
        for _ in 0..cycles {
            self.set(true)?;
            thread::sleep(half);
            self.set(false)?;
            thread::sleep(half);
        }
        Ok(())
    }
}

impl Buzzer for SysfsGpioBuzzer {
    fn beep(
        &mut self,
        times: u32,
        duration_ms: u64,
        pause: Duration,
        frequency_hz: u32,
    ) -> Result<(), BuzzerError> {
        self.export()?;
        for _ in 0..times {
            if let Err(e) = self.sound(Duration::from_millis(duration_ms), frequency_hz) {
                let _ = self.set(false);
                return Err(e);
            }
            thread::sleep(pause);
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        if !self.exported {
            return;
        }
        if let Err(e) = self.set(false) {
            warn!("Failed to silence GPIO {}: {}", self.pin, e);
        }
        if let Err(e) = fs::write(self.root.join("unexport"), self.pin.to_string()) {
            warn!("Failed to unexport GPIO {}: {}", self.pin, e);
        }
        self.exported = false;
        debug!("GPIO {} released", self.pin);
    }
}

/// Stand-in buzzer for hosts without GPIO
#[derive(Debug, Default)]
pub struct LogBuzzer {
    beeps: u64,
}

impl LogBuzzer {
    /// Total beeps sounded
    pub fn beeps(&self) -> u64 {
        self.beeps
    }
}

impl Buzzer for LogBuzzer {
    fn beep(
        &mut self,
        times: u32,
        duration_ms: u64,
        pause: Duration,
        frequency_hz: u32,
    ) -> Result<(), BuzzerError> {
        for _ in 0..times {
            info!("BEEP {}ms @ {}Hz", duration_ms, frequency_hz);
            self.beeps += 1;
            thread::sleep(Duration::from_millis(duration_ms) + pause);
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        debug!("Log buzzer cleanup after {} beeps", self.beeps);
    }
}
