//! Landmark geometry: eye/mouth aspect ratios and body keypoints

use serde::{Deserialize, Serialize};

/// Face mesh indices (468-point topology), ordered p1..p6 for EAR
pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];

/// Inner-lip indices ordered p1..p8 for MAR
pub const MOUTH: [usize; 8] = [78, 81, 13, 311, 308, 402, 14, 178];

/// Face mesh landmark count
pub const FACE_MESH_POINTS: usize = 468;

/// Body pose keypoints (33-point topology)
pub mod pose {
    pub const LEFT_EAR: usize = 7;
    pub const RIGHT_EAR: usize = 8;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_INDEX: usize = 19;
    pub const RIGHT_INDEX: usize = 20;
    pub const POINTS: usize = 33;
}

/// Hand keypoints (21-point topology)
pub mod hand {
    pub const WRIST: usize = 0;
    pub const INDEX_TIP: usize = 8;
    pub const POINTS: usize = 21;
}

/// Landmark in frame pixel coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Planar distance
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One detected face, hand or body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmarks {
    pub points: Vec<Point>,
    /// Model confidence (0-1)
    pub score: f32,
}

impl Landmarks {
    pub fn new(points: Vec<Point>, score: f32) -> Self {
        Self { points, score }
    }

    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    /// Axis-aligned bounding box `(x, y, width, height)`
    pub fn bounding_box(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some((min_x, min_y, max_x - min_x, max_y - min_y))
    }

    fn pick<const N: usize>(&self, indices: &[usize; N]) -> Option<[Point; N]> {
        let mut out = [Point::default(); N];
        for (slot, &idx) in out.iter_mut().zip(indices.iter()) {
            *slot = *self.points.get(idx)?;
        }
        Some(out)
    }
}

/// Eye aspect ratio for six eye-contour points:
/// `(|p2-p6| + |p3-p5|) / (2 * |p1-p4|)`
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> f32 {
    let vertical = eye[1].distance(&eye[5]) + eye[2].distance(&eye[4]);
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal <= f32::EPSILON {
        return 0.0;
    }
    vertical / (2.0 * horizontal)
}

/// Mouth aspect ratio for eight inner-lip points:
/// `(|p2-p8| + |p3-p7| + |p4-p6|) / (2 * |p1-p5|)`
pub fn mouth_aspect_ratio(mouth: &[Point; 8]) -> f32 {
    let vertical =
        mouth[1].distance(&mouth[7]) + mouth[2].distance(&mouth[6]) + mouth[3].distance(&mouth[5]);
    let horizontal = mouth[0].distance(&mouth[4]);
    if horizontal <= f32::EPSILON {
        return 0.0;
    }
    vertical / (2.0 * horizontal)
}

/// Mean EAR of both eyes from a face mesh
pub fn face_ear(face: &Landmarks) -> Option<f32> {
    let left = face.pick(&LEFT_EYE)?;
    let right = face.pick(&RIGHT_EYE)?;
    Some((eye_aspect_ratio(&left) + eye_aspect_ratio(&right)) / 2.0)
}

/// MAR from a face mesh
pub fn face_mar(face: &Landmarks) -> Option<f32> {
    face.pick(&MOUTH).map(|m| mouth_aspect_ratio(&m))
}

/// Face mesh whose EAR equals `eye_open` and MAR equals `mouth_open`.
/// Used to drive the pipeline without a trained model.
pub fn synthetic_face(eye_open: f32, mouth_open: f32) -> Landmarks {
    let mut points = vec![Point::new(100.0, 100.0); FACE_MESH_POINTS];

    for (eye, cx) in [(LEFT_EYE, 140.0f32), (RIGHT_EYE, 60.0f32)] {
        let half = eye_open * 20.0 / 2.0;
        points[eye[0]] = Point::new(cx - 10.0, 80.0);
        points[eye[3]] = Point::new(cx + 10.0, 80.0);
        points[eye[1]] = Point::new(cx - 3.0, 80.0 - half);
        points[eye[5]] = Point::new(cx - 3.0, 80.0 + half);
        points[eye[2]] = Point::new(cx + 3.0, 80.0 - half);
        points[eye[4]] = Point::new(cx + 3.0, 80.0 + half);
    }

    let half = mouth_open * 40.0 * 2.0 / 3.0 / 2.0;
    points[MOUTH[0]] = Point::new(80.0, 150.0);
    points[MOUTH[4]] = Point::new(120.0, 150.0);
    for (top, bottom, x) in [(1, 7, 90.0), (2, 6, 100.0), (3, 5, 110.0)] {
        points[MOUTH[top]] = Point::new(x, 150.0 - half);
        points[MOUTH[bottom]] = Point::new(x, 150.0 + half);
    }

    Landmarks::new(points, 0.9)
}
