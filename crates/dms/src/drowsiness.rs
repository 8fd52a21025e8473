//! Eye closure and yawning from the face mesh

use crate::config::DetectionConfig;
use crate::landmarks::{face_ear, face_mar, Landmarks};
use crate::model::LandmarkModel;
use crate::{Detector, DmsError};
use camera_capture::VideoFrame;
use serde::Serialize;
use tracing::{debug, info};

/// Per-frame face result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrowsinessResult {
    /// Highest-scoring face, if any
    pub face: Option<Landmarks>,
    pub ear: f32,
    pub mar: f32,
    /// EAR below threshold this frame
    pub eyes_closed: bool,
    /// MAR above threshold this frame
    pub yawning: bool,
}

impl DrowsinessResult {
    pub fn face_detected(&self) -> bool {
        self.face.is_some()
    }
}

/// Face-mesh based drowsiness detector
pub struct DrowsinessDetector {
    model: Box<dyn LandmarkModel>,
}

impl DrowsinessDetector {
    pub fn new(model: Box<dyn LandmarkModel>) -> Self {
        info!("Drowsiness detector using {} face model", model.name());
        Self { model }
    }
}

impl Detector for DrowsinessDetector {
    type Output = DrowsinessResult;

    fn name(&self) -> &'static str {
        "drowsiness"
    }

    fn infer(
        &mut self,
        frame: &VideoFrame,
        config: &DetectionConfig,
    ) -> Result<DrowsinessResult, DmsError> {
        let mut faces = self.model.detect(frame)?;
        faces.sort_by(|a, b| b.score.total_cmp(&a.score));

        let Some(face) = faces.into_iter().next() else {
            return Ok(DrowsinessResult::default());
        };

        // A partial mesh gives no usable ratios; treat as no face
        let (Some(ear), Some(mar)) = (face_ear(&face), face_mar(&face)) else {
            debug!("Face mesh has {} points, ignoring", face.points.len());
            return Ok(DrowsinessResult::default());
        };

        let d = &config.drowsiness;
        Ok(DrowsinessResult {
            eyes_closed: ear < d.eye_aspect_ratio_threshold,
            yawning: mar > d.mouth_aspect_ratio_threshold,
            face: Some(face),
            ear,
            mar,
        })
    }

    fn reinitialize_configuration(&mut self, config: &DetectionConfig) {
        let d = &config.drowsiness;
        info!(
            "Drowsiness thresholds now EAR<{:.3} MAR>{:.3}",
            d.eye_aspect_ratio_threshold, d.mouth_aspect_ratio_threshold
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::synthetic_face;
    use crate::model::{NoopModel, ScriptedModel};

    fn frame() -> VideoFrame {
        VideoFrame::filled(32, 32, [0, 0, 0])
    }

    #[test]
    fn test_closed_eyes_below_threshold() {
        let model = ScriptedModel::constant(vec![synthetic_face(0.15, 0.2)]);
        let mut detector = DrowsinessDetector::new(Box::new(model));
        let result = detector.infer(&frame(), &DetectionConfig::default()).unwrap();

        assert!(result.face_detected());
        assert!(result.eyes_closed);
        assert!(!result.yawning);
        assert!((result.ear - 0.15).abs() < 1e-4);
    }

    #[test]
    fn test_yawn_and_threshold_from_config() {
        let model = ScriptedModel::constant(vec![synthetic_face(0.3, 0.65)]);
        let mut detector = DrowsinessDetector::new(Box::new(model));

        let result = detector.infer(&frame(), &DetectionConfig::default()).unwrap();
        assert!(result.yawning);

        let mut config = DetectionConfig::default();
        config.drowsiness.mouth_aspect_ratio_threshold = 0.7;
        config.drowsiness.eye_aspect_ratio_threshold = 0.35;
        let result = detector.infer(&frame(), &config).unwrap();
        assert!(!result.yawning);
        assert!(result.eyes_closed);
    }

    #[test]
    fn test_no_face_is_zeroed() {
        let mut detector = DrowsinessDetector::new(Box::new(NoopModel));
        let result = detector.infer(&frame(), &DetectionConfig::default()).unwrap();
        assert_eq!(result, DrowsinessResult::default());
    }

    #[test]
    fn test_best_scoring_face_wins() {
        let mut weak = synthetic_face(0.1, 0.1);
        weak.score = 0.2;
        let strong = synthetic_face(0.3, 0.1);
        let model = ScriptedModel::constant(vec![weak, strong]);
        let mut detector = DrowsinessDetector::new(Box::new(model));

        let result = detector.infer(&frame(), &DetectionConfig::default()).unwrap();
        assert!(!result.eyes_closed);
    }
}
