//! Phone use and hand detection
//!
//! A driver is considered calling when a wrist or index fingertip from the
//! pose model sits within `distance_threshold` pixels of an ear.

use crate::config::DetectionConfig;
use crate::landmarks::{hand, pose, Landmarks, Point};
use crate::model::LandmarkModel;
use crate::{Detector, DmsError};
use camera_capture::VideoFrame;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Hand-to-ear measurement for one side
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhoneState {
    pub side: Side,
    /// Shortest hand-to-ear distance in pixels
    pub distance: f32,
    pub is_calling: bool,
    /// Hand point and ear point of the shortest distance
    pub hand: Point,
    pub ear: Point,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhoneDetectionResult {
    pub pose: Option<Landmarks>,
    pub detection: Vec<PhoneState>,
}

impl PhoneDetectionResult {
    pub fn is_calling(&self) -> bool {
        self.detection.iter().any(|s| s.is_calling)
    }
}

fn nearest(pose: &Landmarks, hand_points: [usize; 2]) -> Option<(f32, Point, Point)> {
    let ears = [pose::LEFT_EAR, pose::RIGHT_EAR];
    let mut best: Option<(f32, Point, Point)> = None;
    for &h in &hand_points {
        let Some(hp) = pose.get(h) else { continue };
        for &e in &ears {
            let Some(ep) = pose.get(e) else { continue };
            let d = hp.distance(ep);
            if best.map_or(true, |(bd, _, _)| d < bd) {
                best = Some((d, *hp, *ep));
            }
        }
    }
    best
}

/// Pose-based phone use detector
pub struct PhoneDetector {
    model: Box<dyn LandmarkModel>,
}

impl PhoneDetector {
    pub fn new(model: Box<dyn LandmarkModel>) -> Self {
        info!("Phone detector using {} pose model", model.name());
        Self { model }
    }
}

impl Detector for PhoneDetector {
    type Output = PhoneDetectionResult;

    fn name(&self) -> &'static str {
        "phone_detection"
    }

    fn infer(
        &mut self,
        frame: &VideoFrame,
        config: &DetectionConfig,
    ) -> Result<PhoneDetectionResult, DmsError> {
        let bodies = self.model.detect(frame)?;
        let Some(body) = bodies.into_iter().max_by(|a, b| a.score.total_cmp(&b.score)) else {
            return Ok(PhoneDetectionResult::default());
        };

        let threshold = config.phone_detection.distance_threshold as f32;
        let sides = [
            (Side::Left, [pose::LEFT_WRIST, pose::LEFT_INDEX]),
            (Side::Right, [pose::RIGHT_WRIST, pose::RIGHT_INDEX]),
        ];
        let detection = sides
            .into_iter()
            .filter_map(|(side, points)| {
                nearest(&body, points).map(|(distance, hand, ear)| PhoneState {
                    side,
                    distance,
                    is_calling: distance < threshold,
                    hand,
                    ear,
                })
            })
            .collect();

        Ok(PhoneDetectionResult {
            pose: Some(body),
            detection,
        })
    }

    fn reinitialize_configuration(&mut self, config: &DetectionConfig) {
        info!(
            "Phone distance threshold now {}px",
            config.phone_detection.distance_threshold
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandsResult {
    pub hands: Vec<Landmarks>,
}

/// Hand landmark detector, used for the processed stream
pub struct HandsDetector {
    model: Box<dyn LandmarkModel>,
}

impl HandsDetector {
    pub fn new(model: Box<dyn LandmarkModel>) -> Self {
        info!("Hands detector using {} hands model", model.name());
        Self { model }
    }
}

impl Detector for HandsDetector {
    type Output = HandsResult;

    fn name(&self) -> &'static str {
        "hands_detection"
    }

    fn infer(&mut self, frame: &VideoFrame, _config: &DetectionConfig) -> Result<HandsResult, DmsError> {
        let hands = self
            .model
            .detect(frame)?
            .into_iter()
            .filter(|h| h.points.len() >= hand::POINTS)
            .collect();
        Ok(HandsResult { hands })
    }

    fn reinitialize_configuration(&mut self, _config: &DetectionConfig) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;

    fn body(wrist: Point) -> Landmarks {
        let mut points = vec![Point::new(0.0, 400.0); pose::POINTS];
        points[pose::LEFT_EAR] = Point::new(200.0, 100.0);
        points[pose::RIGHT_EAR] = Point::new(120.0, 100.0);
        points[pose::RIGHT_WRIST] = wrist;
        points[pose::RIGHT_INDEX] = Point::new(wrist.x, wrist.y + 5.0);
        Landmarks::new(points, 0.8)
    }

    fn run(lm: Landmarks) -> PhoneDetectionResult {
        let mut detector = PhoneDetector::new(Box::new(ScriptedModel::constant(vec![lm])));
        detector
            .infer(&VideoFrame::filled(8, 8, [0; 3]), &DetectionConfig::default())
            .unwrap()
    }

    #[test]
    fn test_hand_at_ear_is_calling() {
        let result = run(body(Point::new(125.0, 110.0)));
        assert!(result.is_calling());

        let right = result.detection.iter().find(|s| s.side == Side::Right).unwrap();
        assert!(right.distance < 15.0);
        assert_eq!(right.ear, Point::new(120.0, 100.0));
    }

    #[test]
    fn test_hand_on_wheel_is_not_calling() {
        let result = run(body(Point::new(150.0, 350.0)));
        assert!(!result.is_calling());
        assert_eq!(result.detection.len(), 2);
    }

    #[test]
    fn test_hands_filters_partial_sets() {
        let full = Landmarks::new(vec![Point::default(); hand::POINTS], 0.9);
        let partial = Landmarks::new(vec![Point::default(); 4], 0.9);
        let model = ScriptedModel::constant(vec![full, partial]);
        let mut detector = HandsDetector::new(Box::new(model));

        let result = detector
            .infer(&VideoFrame::filled(8, 8, [0; 3]), &DetectionConfig::default())
            .unwrap();
        assert_eq!(result.hands.len(), 1);
    }
}
