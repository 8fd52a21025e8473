//! Frame source implementations

use crate::frame::{decode_image, VideoFrame};
use crate::{CameraError, FrameSource};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub(crate) fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Moving vertical bar over a gradient, one step per capture
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    sequence: u64,
    released: bool,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        info!("Setting up synthetic camera {}x{}", width, height);
        Self {
            width,
            height,
            sequence: 0,
            released: false,
        }
    }
}

impl FrameSource for SyntheticCamera {
    fn capture(&mut self) -> Result<VideoFrame, CameraError> {
        if self.released {
            return Err(CameraError::Released);
        }

        let bar_x = (self.sequence % self.width.max(1) as u64) as u32;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                if x.abs_diff(bar_x) < 4 {
                    data.extend_from_slice(&[255, 255, 255]);
                } else {
                    let shade = ((y * 255) / self.height.max(1)) as u8;
                    data.extend_from_slice(&[shade / 2, shade / 2, shade]);
                }
            }
        }

        self.sequence += 1;
        Ok(VideoFrame::new(data, self.width, self.height, now_ns(), self.sequence))
    }

    fn release(&mut self) {
        if !self.released {
            info!("Releasing synthetic camera");
            self.released = true;
        }
    }
}

/// Replays still images from a directory in file-name order, looping
pub struct ReplayCamera {
    files: Vec<PathBuf>,
    cursor: usize,
    sequence: u64,
    released: bool,
}

impl ReplayCamera {
    /// Open a directory of `.jpg`/`.jpeg`/`.png` frames
    pub fn open(dir: &Path) -> Result<Self, CameraError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!(
                "no image frames in {}",
                dir.display()
            )));
        }

        info!("Replay camera opened with {} frames from {}", files.len(), dir.display());
        Ok(Self {
            files,
            cursor: 0,
            sequence: 0,
            released: false,
        })
    }

    /// Number of frames in one replay pass
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ReplayCamera {
    fn capture(&mut self) -> Result<VideoFrame, CameraError> {
        if self.released {
            return Err(CameraError::Released);
        }

        let path = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();
        self.sequence += 1;

        let bytes = std::fs::read(path).map_err(|e| {
            warn!("Replay frame {} unreadable: {}", path.display(), e);
            CameraError::Capture(e.to_string())
        })?;
        debug!("Replaying {}", path.display());
        decode_image(&bytes, now_ns(), self.sequence)
    }

    fn release(&mut self) {
        if !self.released {
            info!("Releasing replay camera");
            self.released = true;
        }
    }
}
