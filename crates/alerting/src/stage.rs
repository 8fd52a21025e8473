//! Alert stages and consecutive-frame hysteresis

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Alert severity, ordered
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertStage {
    #[default]
    None,
    Stage1,
    Stage2,
    Stage3,
}

impl AlertStage {
    pub fn level(&self) -> u8 {
        match self {
            AlertStage::None => 0,
            AlertStage::Stage1 => 1,
            AlertStage::Stage2 => 2,
            AlertStage::Stage3 => 3,
        }
    }

    /// One stage up, saturating at Stage3
    pub fn next(&self) -> AlertStage {
        match self {
            AlertStage::None => AlertStage::Stage1,
            AlertStage::Stage1 => AlertStage::Stage2,
            AlertStage::Stage2 | AlertStage::Stage3 => AlertStage::Stage3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStage::None => "none",
            AlertStage::Stage1 => "stage_1",
            AlertStage::Stage2 => "stage_2",
            AlertStage::Stage3 => "stage_3",
        }
    }

    /// Status bar colour for the processed stream
    pub fn color(&self) -> [u8; 3] {
        match self {
            AlertStage::None => [0, 180, 0],
            AlertStage::Stage1 => [255, 191, 0],
            AlertStage::Stage2 => [255, 120, 0],
            AlertStage::Stage3 => [220, 0, 0],
        }
    }
}

impl std::fmt::Display for AlertStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage change reported by [`StageTracker::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTransition {
    /// Episode began at Stage1
    Entered(AlertStage),
    /// Stage went up within the episode
    Escalated(AlertStage),
    /// Episode ended, stage back to None
    Cleared,
}

/// Consecutive-frame hysteresis over a per-frame condition.
///
/// `entry_frames` consecutive qualifying frames enter Stage1. Every further
/// `escalation_frames` qualifying frames in the episode raise one stage up
/// to `max_stage`. `exit_frames` consecutive clear frames end the episode.
/// Before entry any clear frame resets the count.
#[derive(Debug, Clone)]
pub struct StageTracker {
    entry_frames: u32,
    escalation_frames: u32,
    exit_frames: u32,
    max_stage: AlertStage,
    stage: AlertStage,
    /// Qualifying frames since the count last reset
    qualifying: u32,
    /// Consecutive clear frames inside an episode
    clear: u32,
}

impl StageTracker {
    pub fn new(entry_frames: u32, escalation_frames: u32, exit_frames: u32) -> Self {
        Self {
            entry_frames: entry_frames.max(1),
            escalation_frames: escalation_frames.max(1),
            exit_frames: exit_frames.max(1),
            max_stage: AlertStage::Stage3,
            stage: AlertStage::None,
            qualifying: 0,
            clear: 0,
        }
    }

    /// Tracker that never goes past Stage1 (yawning)
    pub fn single_stage(entry_frames: u32, exit_frames: u32) -> Self {
        Self {
            max_stage: AlertStage::Stage1,
            ..Self::new(entry_frames, u32::MAX, exit_frames)
        }
    }

    pub fn stage(&self) -> AlertStage {
        self.stage
    }

    pub fn qualifying_frames(&self) -> u32 {
        self.qualifying
    }

    pub fn in_episode(&self) -> bool {
        self.stage > AlertStage::None
    }

    /// Change the windows, keeping the in-flight counts
    pub fn retarget(&mut self, entry_frames: u32, escalation_frames: u32, exit_frames: u32) {
        self.entry_frames = entry_frames.max(1);
        if self.max_stage > AlertStage::Stage1 {
            self.escalation_frames = escalation_frames.max(1);
        }
        self.exit_frames = exit_frames.max(1);
    }

    /// Feed one frame
    pub fn update(&mut self, qualifying: bool) -> Option<StageTransition> {
        if !self.in_episode() {
            if !qualifying {
                self.qualifying = 0;
                return None;
            }
            self.qualifying = self.qualifying.saturating_add(1);
            if self.qualifying >= self.entry_frames {
                self.stage = AlertStage::Stage1;
                self.clear = 0;
                debug!("Episode entered after {} frames", self.qualifying);
                return Some(StageTransition::Entered(self.stage));
            }
            return None;
        }

        if !qualifying {
            self.clear += 1;
            if self.clear >= self.exit_frames {
                debug!("Episode cleared at {}", self.stage);
                self.stage = AlertStage::None;
                self.qualifying = 0;
                self.clear = 0;
                return Some(StageTransition::Cleared);
            }
            return None;
        }

        self.clear = 0;
        self.qualifying = self.qualifying.saturating_add(1);
        if self.stage < self.max_stage {
            let needed = self
                .entry_frames
                .saturating_add(self.escalation_frames.saturating_mul(self.stage.level() as u32));
            if self.qualifying >= needed {
                self.stage = self.stage.next();
                return Some(StageTransition::Escalated(self.stage));
            }
        }
        None
    }

    /// Drop any episode in progress
    pub fn reset(&mut self) {
        self.stage = AlertStage::None;
        self.qualifying = 0;
        self.clear = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed(tracker: &mut StageTracker, qualifying: bool, n: u32) -> Vec<StageTransition> {
        (0..n).filter_map(|_| tracker.update(qualifying)).collect()
    }

    #[test]
    fn test_entry_at_threshold() {
        let mut tracker = StageTracker::new(10, 10, 5);
        assert!(feed(&mut tracker, true, 9).is_empty());
        assert_eq!(tracker.stage(), AlertStage::None);

        assert_eq!(tracker.update(true), Some(StageTransition::Entered(AlertStage::Stage1)));
        assert!(feed(&mut tracker, true, 5).is_empty());
        assert_eq!(tracker.stage(), AlertStage::Stage1);
    }

    #[test]
    fn test_clear_frame_before_entry_resets() {
        let mut tracker = StageTracker::new(3, 3, 3);
        feed(&mut tracker, true, 2);
        tracker.update(false);
        feed(&mut tracker, true, 2);
        assert_eq!(tracker.stage(), AlertStage::None);
    }

    #[test]
    fn test_escalation_and_cap() {
        let mut tracker = StageTracker::new(2, 3, 2);
        let transitions = feed(&mut tracker, true, 20);
        assert_eq!(
            transitions,
            vec![
                StageTransition::Entered(AlertStage::Stage1),
                StageTransition::Escalated(AlertStage::Stage2),
                StageTransition::Escalated(AlertStage::Stage3),
            ]
        );
        assert_eq!(tracker.stage(), AlertStage::Stage3);
    }

    #[test]
    fn test_short_gap_keeps_episode() {
        let mut tracker = StageTracker::new(2, 4, 3);
        feed(&mut tracker, true, 2);
        feed(&mut tracker, false, 2);
        assert_eq!(tracker.stage(), AlertStage::Stage1);

        assert_eq!(feed(&mut tracker, true, 4), vec![StageTransition::Escalated(AlertStage::Stage2)]);
        assert_eq!(feed(&mut tracker, false, 3), vec![StageTransition::Cleared]);
        assert_eq!(tracker.qualifying_frames(), 0);
    }

    #[test]
    fn test_single_stage_never_escalates() {
        let mut tracker = StageTracker::single_stage(3, 2);
        let transitions = feed(&mut tracker, true, 100);
        assert_eq!(transitions, vec![StageTransition::Entered(AlertStage::Stage1)]);
    }

    #[test]
    fn test_retarget_keeps_count() {
        let mut tracker = StageTracker::new(10, 10, 5);
        feed(&mut tracker, true, 6);
        tracker.retarget(7, 10, 5);
        assert_eq!(tracker.qualifying_frames(), 6);
        assert_eq!(tracker.update(true), Some(StageTransition::Entered(AlertStage::Stage1)));
    }

    proptest! {
        #[test]
        fn prop_stage_monotonic_within_episode(frames in proptest::collection::vec(any::<bool>(), 0..300)) {
            let mut tracker = StageTracker::new(4, 5, 3);
            let mut previous = AlertStage::None;
            for qualifying in frames {
                let transition = tracker.update(qualifying);
                let stage = tracker.stage();
                match transition {
                    Some(StageTransition::Cleared) => prop_assert_eq!(stage, AlertStage::None),
                    _ => prop_assert!(stage >= previous),
                }
                previous = stage;
            }
        }
    }
}
