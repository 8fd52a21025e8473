//! Storage Layer
//!
//! SQLite persistence of drowsiness events (repository pattern over a
//! `sqlx` pool) and the JPEG snapshots they reference.

mod event;
mod images;
mod repository;

pub use event::{DrowsinessEvent, NewDrowsinessEvent};
pub use images::ImageStore;
pub use repository::EventRepository;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Image store error: {0}")]
    ImageError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}
