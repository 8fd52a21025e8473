//! Combined per-frame analysis over all enabled detectors

use crate::config::DetectionConfig;
use crate::drowsiness::{DrowsinessDetector, DrowsinessResult};
use crate::model::{Capability, ModelFactory};
use crate::phone::{HandsDetector, HandsResult, PhoneDetectionResult, PhoneDetector};
use crate::{Detector, DmsError};
use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Runtime detector toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledDetectors {
    pub drowsiness_model_run: bool,
    pub phone_detection_model_run: bool,
    pub hands_detection_model_run: bool,
}

impl Default for EnabledDetectors {
    fn default() -> Self {
        Self {
            drowsiness_model_run: true,
            phone_detection_model_run: true,
            hands_detection_model_run: false,
        }
    }
}

/// Results of one frame. A disabled or failed detector leaves `None`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameAnalysis {
    pub drowsiness: Option<DrowsinessResult>,
    pub phone: Option<PhoneDetectionResult>,
    pub hands: Option<HandsResult>,
    /// Detectors that returned an error this frame
    #[serde(skip)]
    pub failed: Vec<&'static str>,
}

impl FrameAnalysis {
    pub fn ear(&self) -> f32 {
        self.drowsiness.as_ref().map_or(0.0, |d| d.ear)
    }

    pub fn mar(&self) -> f32 {
        self.drowsiness.as_ref().map_or(0.0, |d| d.mar)
    }

    pub fn eyes_closed(&self) -> bool {
        self.drowsiness.as_ref().is_some_and(|d| d.eyes_closed)
    }

    pub fn yawning(&self) -> bool {
        self.drowsiness.as_ref().is_some_and(|d| d.yawning)
    }

    pub fn is_calling(&self) -> bool {
        self.phone.as_ref().is_some_and(|p| p.is_calling())
    }
}

fn run_one<D: Detector>(
    detector: &mut D,
    enabled: bool,
    frame: &VideoFrame,
    config: &DetectionConfig,
    failed: &mut Vec<&'static str>,
) -> Option<D::Output> {
    if !enabled {
        return None;
    }
    match detector.infer(frame, config) {
        Ok(output) => Some(output),
        Err(e) => {
            warn!("{} detector failed: {}", detector.name(), e);
            failed.push(detector.name());
            None
        }
    }
}

/// The three detection capabilities, built once at start
pub struct DetectorSet {
    drowsiness: DrowsinessDetector,
    phone: PhoneDetector,
    hands: HandsDetector,
}

impl DetectorSet {
    pub fn new(drowsiness: DrowsinessDetector, phone: PhoneDetector, hands: HandsDetector) -> Self {
        Self {
            drowsiness,
            phone,
            hands,
        }
    }

    pub fn from_factory(factory: &ModelFactory) -> Self {
        Self::new(
            DrowsinessDetector::new(factory.build(Capability::Face)),
            PhoneDetector::new(factory.build(Capability::Pose)),
            HandsDetector::new(factory.build(Capability::Hands)),
        )
    }

    /// Run every enabled detector; errors count as no detection
    pub fn analyze(
        &mut self,
        frame: &VideoFrame,
        config: &DetectionConfig,
        enabled: &EnabledDetectors,
    ) -> FrameAnalysis {
        let mut failed = Vec::new();
        let drowsiness = run_one(
            &mut self.drowsiness,
            enabled.drowsiness_model_run,
            frame,
            config,
            &mut failed,
        );
        let phone = run_one(
            &mut self.phone,
            enabled.phone_detection_model_run,
            frame,
            config,
            &mut failed,
        );
        let hands = run_one(
            &mut self.hands,
            enabled.hands_detection_model_run,
            frame,
            config,
            &mut failed,
        );

        FrameAnalysis {
            drowsiness,
            phone,
            hands,
            failed,
        }
    }

    pub fn reinitialize_configuration(&mut self, config: &DetectionConfig) -> Result<(), DmsError> {
        config.validate()?;
        self.drowsiness.reinitialize_configuration(config);
        self.phone.reinitialize_configuration(config);
        self.hands.reinitialize_configuration(config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::synthetic_face;
    use crate::model::{NoopModel, ScriptedModel};

    fn set(face: ScriptedModel) -> DetectorSet {
        DetectorSet::new(
            DrowsinessDetector::new(Box::new(face)),
            PhoneDetector::new(Box::new(NoopModel)),
            HandsDetector::new(Box::new(NoopModel)),
        )
    }

    #[test]
    fn test_disabled_detector_is_skipped() {
        let mut detectors = set(ScriptedModel::constant(vec![synthetic_face(0.1, 0.1)]));
        let enabled = EnabledDetectors {
            drowsiness_model_run: false,
            ..Default::default()
        };
        let analysis = detectors.analyze(
            &VideoFrame::filled(8, 8, [0; 3]),
            &DetectionConfig::default(),
            &enabled,
        );
        assert!(analysis.drowsiness.is_none());
        assert!(!analysis.eyes_closed());
        assert!(analysis.phone.is_some());
    }

    #[test]
    fn test_failure_is_recorded_not_raised() {
        let mut detectors = set(ScriptedModel::new([None]));
        let analysis = detectors.analyze(
            &VideoFrame::filled(8, 8, [0; 3]),
            &DetectionConfig::default(),
            &EnabledDetectors::default(),
        );
        assert!(analysis.drowsiness.is_none());
        assert_eq!(analysis.failed, vec!["drowsiness"]);
        assert_eq!(analysis.ear(), 0.0);
    }

    #[test]
    fn test_reinitialize_rejects_invalid() {
        let mut detectors = set(ScriptedModel::constant(vec![]));
        let mut config = DetectionConfig::default();
        config.drowsiness.recovery_frames = 0;
        assert!(detectors.reinitialize_configuration(&config).is_err());
    }
}
