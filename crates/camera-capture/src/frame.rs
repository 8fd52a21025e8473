//! Video frame types and processing

use crate::CameraError;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u64,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Solid-colour frame
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(data, width, height, 0, 0)
    }

    /// Wrap an `image` buffer
    pub fn from_rgb_image(img: RgbImage, timestamp_ns: u64, sequence: u64) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Copy into an `image` buffer for drawing and encoding
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::Format(format!(
                "{} bytes do not fit {}x{} RGB",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Mean luminance (0-255), used by the synthetic detectors and tests
    pub fn mean_luma(&self) -> f32 {
        let pixels = self.data.len() / 3;
        if pixels == 0 {
            return 0.0;
        }
        let sum: f32 = self
            .data
            .chunks_exact(3)
            .map(|p| p[0] as f32 * 0.299 + p[1] as f32 * 0.587 + p[2] as f32 * 0.114)
            .sum();
        sum / pixels as f32
    }

    /// Place `other` to the right of `self`; the shorter frame is padded black
    pub fn hconcat(&self, other: &VideoFrame) -> VideoFrame {
        let width = self.width + other.width;
        let height = self.height.max(other.height);
        let mut data = vec![0u8; (width * height * 3) as usize];

        for (src, x_off) in [(self, 0u32), (other, self.width)] {
            let row_len = (src.width * 3) as usize;
            for row in 0..src.height {
                let src_start = (row * src.width * 3) as usize;
                let dst_start = ((row * width + x_off) * 3) as usize;
                if let Some(line) = src.data.get(src_start..src_start + row_len) {
                    data[dst_start..dst_start + row_len].copy_from_slice(line);
                }
            }
        }

        VideoFrame {
            data,
            width,
            height,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        }
    }

    /// Resize frame using nearest-neighbour sampling
    pub fn resize(&self, new_width: u32, new_height: u32) -> VideoFrame {
        let mut resized = Vec::with_capacity((new_width * new_height * 3) as usize);

        let x_ratio = self.width as f32 / new_width as f32;
        let y_ratio = self.height as f32 / new_height as f32;

        for y in 0..new_height {
            for x in 0..new_width {
                let x0 = ((x as f32 * x_ratio).floor() as u32).min(self.width.saturating_sub(1));
                let y0 = ((y as f32 * y_ratio).floor() as u32).min(self.height.saturating_sub(1));
                resized.extend_from_slice(&self.get_pixel(x0, y0).unwrap_or([0, 0, 0]));
            }
        }

        VideoFrame {
            data: resized,
            width: new_width,
            height: new_height,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        }
    }

    /// Encode as JPEG for MJPEG streams and event snapshots
    pub fn encode_jpeg(&self) -> Result<Vec<u8>, CameraError> {
        let img = self.to_rgb_image()?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg)
            .map_err(|e| CameraError::Format(e.to_string()))?;
        Ok(out.into_inner())
    }
}

/// Decode a JPEG/PNG still into a frame
pub fn decode_image(bytes: &[u8], timestamp_ns: u64, sequence: u64) -> Result<VideoFrame, CameraError> {
    let img = image::load_from_memory(bytes).map_err(|e| CameraError::Format(e.to_string()))?;
    Ok(VideoFrame::from_rgb_image(img.to_rgb8(), timestamp_ns, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_pixel_bounds() {
        let frame = VideoFrame::filled(4, 2, [10, 20, 30]);
        assert_eq!(frame.get_pixel(3, 1), Some([10, 20, 30]));
        assert_eq!(frame.get_pixel(4, 0), None);
    }

    #[test]
    fn test_hconcat_pads_shorter_frame() {
        let left = VideoFrame::filled(2, 2, [255, 0, 0]);
        let right = VideoFrame::filled(3, 1, [0, 255, 0]);
        let joined = left.hconcat(&right);

        assert_eq!(joined.width, 5);
        assert_eq!(joined.height, 2);
        assert_eq!(joined.get_pixel(1, 1), Some([255, 0, 0]));
        assert_eq!(joined.get_pixel(2, 0), Some([0, 255, 0]));
        assert_eq!(joined.get_pixel(2, 1), Some([0, 0, 0]));
    }

    #[test]
    fn test_jpeg_decodes_back_to_same_size() {
        let frame = VideoFrame::filled(16, 8, [120, 120, 120]);
        let jpeg = frame.encode_jpeg().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = decode_image(&jpeg, 0, 0).unwrap();
        assert_eq!((decoded.width, decoded.height), (16, 8));
    }

    #[test]
    fn test_mean_luma() {
        assert_eq!(VideoFrame::filled(2, 2, [0, 0, 0]).mean_luma(), 0.0);
        let white = VideoFrame::filled(2, 2, [255, 255, 255]).mean_luma();
        assert!((white - 255.0).abs() < 0.5);
    }

    #[test]
    fn test_mismatched_buffer_is_format_error() {
        let frame = VideoFrame::new(vec![0; 5], 2, 2, 0, 0);
        assert!(matches!(frame.to_rgb_image(), Err(CameraError::Format(_))));
    }
}
