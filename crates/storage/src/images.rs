//! Event snapshot files under the static directory

use crate::StorageError;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Writes `{static_dir}/{image_event_dir}/{id}.jpg`
#[derive(Debug, Clone)]
pub struct ImageStore {
    static_dir: PathBuf,
    image_event_dir: String,
}

impl ImageStore {
    pub fn new(static_dir: impl Into<PathBuf>, image_event_dir: impl Into<String>) -> Self {
        Self {
            static_dir: static_dir.into(),
            image_event_dir: image_event_dir.into(),
        }
    }

    /// Save a JPEG and return its path relative to the static directory
    pub async fn save(&self, id: Uuid, jpeg: &[u8]) -> Result<String, StorageError> {
        let relative = format!("{}/{}.jpg", self.image_event_dir.trim_matches('/'), id);
        let path = self.static_dir.join(&relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::ImageError(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&path, jpeg)
            .await
            .map_err(|e| StorageError::ImageError(format!("{}: {}", path.display(), e)))?;
        debug!("Saved event image {}", path.display());
        Ok(relative)
    }

    /// Resolve a stored relative path, refusing anything outside the
    /// static directory
    pub fn resolve(&self, image: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(image);
        let safe = !image.is_empty()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::ImageError(format!("invalid image path {image:?}")));
        }
        Ok(self.static_dir.join(relative))
    }

    pub async fn read(&self, image: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(image)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(StorageError::ImageError(format!("{}: {}", path.display(), e))),
        }
    }

    /// Remove a snapshot; a missing file is not an error
    pub async fn remove(&self, image: &str) {
        let Ok(path) = self.resolve(image) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}
