//! Landmark models for face, hands and body pose
//!
//! Models are black boxes returning landmark sets in frame pixel
//! coordinates. [`ModelFactory`] picks an implementation once at start:
//! an ONNX regressor run with tract, or [`NoopModel`] when the engine is
//! disabled or the model cannot be loaded.

use crate::landmarks::{self, Landmarks, Point};
use crate::DmsError;
use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Which landmark topology a model produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Face,
    Hands,
    Pose,
}

impl Capability {
    /// Square model input edge in pixels
    pub fn input_size(&self) -> u32 {
        match self {
            Capability::Face => 192,
            Capability::Hands => 224,
            Capability::Pose => 256,
        }
    }

    pub fn landmark_count(&self) -> usize {
        match self {
            Capability::Face => landmarks::FACE_MESH_POINTS,
            Capability::Hands => landmarks::hand::POINTS,
            Capability::Pose => landmarks::pose::POINTS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Face => "face",
            Capability::Hands => "hands",
            Capability::Pose => "pose",
        }
    }
}

/// Inference backend requested by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceEngine {
    /// ONNX models executed with tract
    #[default]
    Tract,
    /// No inference; detectors report nothing
    None,
}

/// Model file locations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub face_model_path: Option<PathBuf>,
    pub hands_model_path: Option<PathBuf>,
    pub pose_model_path: Option<PathBuf>,
}

impl ModelPaths {
    fn for_capability(&self, capability: Capability) -> Option<&Path> {
        match capability {
            Capability::Face => self.face_model_path.as_deref(),
            Capability::Hands => self.hands_model_path.as_deref(),
            Capability::Pose => self.pose_model_path.as_deref(),
        }
    }
}

/// Landmark model interface
pub trait LandmarkModel: Send {
    /// Backend name for logs and status
    fn name(&self) -> &'static str;

    /// Detect zero or more landmark sets in the frame
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Landmarks>, DmsError>;
}

/// Model that never detects anything
#[derive(Debug, Default)]
pub struct NoopModel;

impl LandmarkModel for NoopModel {
    fn name(&self) -> &'static str {
        "none"
    }

    fn detect(&mut self, _frame: &VideoFrame) -> Result<Vec<Landmarks>, DmsError> {
        Ok(Vec::new())
    }
}

/// Single-landmark-set regressor in ONNX format.
///
/// Input `1x3xSxS` RGB scaled to 0-1; output 0 holds `K*3` coordinates in
/// input pixel space, optional output 1 holds a presence logit.
pub struct TractLandmarkModel {
    capability: Capability,
    plan: TypedRunnableModel<TypedModel>,
    min_score: f32,
}

impl TractLandmarkModel {
    /// Load and optimize a model file
    pub fn load(capability: Capability, path: &Path) -> Result<Self, DmsError> {
        info!("Loading {} landmark model from {}", capability.as_str(), path.display());
        let size = capability.input_size() as usize;

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| DmsError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            capability,
            plan,
            min_score: 0.5,
        })
    }

    fn input_tensor(&self, frame: &VideoFrame) -> Result<Tensor, DmsError> {
        let size = self.capability.input_size();
        let img = frame
            .to_rgb_image()
            .map_err(|e| DmsError::ImageProcessing(e.to_string()))?;
        let resized =
            image::imageops::resize(&img, size, size, image::imageops::FilterType::Triangle);

        let size = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into())
    }
}

impl LandmarkModel for TractLandmarkModel {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Landmarks>, DmsError> {
        let input = self.input_tensor(frame)?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        let score = match outputs.get(1) {
            Some(logit) => {
                let view = logit
                    .to_array_view::<f32>()
                    .map_err(|e| DmsError::Inference(e.to_string()))?;
                let raw = view.iter().next().copied().unwrap_or(0.0);
                1.0 / (1.0 + (-raw).exp())
            }
            None => 1.0,
        };
        if score < self.min_score {
            debug!("{} presence {:.2} below threshold", self.capability.as_str(), score);
            return Ok(Vec::new());
        }

        let coords = outputs
            .first()
            .ok_or_else(|| DmsError::Inference("model produced no outputs".into()))?
            .to_array_view::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        let coords: Vec<f32> = coords.iter().copied().collect();

        let count = self.capability.landmark_count();
        if coords.len() < count * 3 {
            return Err(DmsError::Inference(format!(
                "expected {} coordinates, got {}",
                count * 3,
                coords.len()
            )));
        }

        let size = self.capability.input_size() as f32;
        let sx = frame.width as f32 / size;
        let sy = frame.height as f32 / size;
        let points = coords
            .chunks_exact(3)
            .take(count)
            .map(|c| Point {
                x: c[0] * sx,
                y: c[1] * sy,
                z: c[2],
            })
            .collect();

        Ok(vec![Landmarks::new(points, score)])
    }
}

/// Replays a fixed sequence of outputs, repeating the last one.
/// A `None` step simulates an inference failure.
pub struct ScriptedModel {
    steps: VecDeque<Option<Vec<Landmarks>>>,
    last: Option<Vec<Landmarks>>,
}

impl ScriptedModel {
    pub fn new(steps: impl IntoIterator<Item = Option<Vec<Landmarks>>>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            last: Some(Vec::new()),
        }
    }

    /// Same output on every frame
    pub fn constant(output: Vec<Landmarks>) -> Self {
        Self {
            steps: VecDeque::new(),
            last: Some(output),
        }
    }
}

impl LandmarkModel for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &VideoFrame) -> Result<Vec<Landmarks>, DmsError> {
        if let Some(step) = self.steps.pop_front() {
            self.last = step;
        }
        self.last
            .clone()
            .ok_or_else(|| DmsError::Inference("scripted failure".into()))
    }
}

/// Selects landmark model implementations at process start
#[derive(Debug, Clone, Default)]
pub struct ModelFactory {
    engine: InferenceEngine,
    paths: ModelPaths,
}

impl ModelFactory {
    pub fn new(engine: InferenceEngine, paths: ModelPaths) -> Self {
        Self { engine, paths }
    }

    /// Build the model for a capability, falling back to [`NoopModel`]
    /// when tract is unavailable for it
    pub fn build(&self, capability: Capability) -> Box<dyn LandmarkModel> {
        match self.engine {
            InferenceEngine::None => Box::new(NoopModel),
            InferenceEngine::Tract => match self.paths.for_capability(capability) {
                Some(path) => match TractLandmarkModel::load(capability, path) {
                    Ok(model) => Box::new(model),
                    Err(e) => {
                        warn!("{} model unavailable, falling back to none: {}", capability.as_str(), e);
                        Box::new(NoopModel)
                    }
                },
                None => {
                    warn!("No {} model path configured, falling back to none", capability.as_str());
                    Box::new(NoopModel)
                }
            },
        }
    }
}
