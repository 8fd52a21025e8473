//! Drowsiness event entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted drowsiness event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrowsinessEvent {
    /// Time-ordered UUIDv7
    pub id: Uuid,
    pub vehicle_identification: String,
    pub timestamp: DateTime<Utc>,
    /// Snapshot path relative to the static directory
    pub image: String,
    pub ear: Option<f64>,
    pub mar: Option<f64>,
    /// e.g. `drowsiness_stage_1`, `yawning`
    pub event_type: String,
}

/// Event fields supplied by a caller; id is assigned on creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDrowsinessEvent {
    pub vehicle_identification: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub ear: Option<f64>,
    #[serde(default)]
    pub mar: Option<f64>,
    pub event_type: String,
}

impl NewDrowsinessEvent {
    /// Assign a fresh id; missing timestamp means now
    pub fn into_event(self) -> DrowsinessEvent {
        DrowsinessEvent {
            id: Uuid::now_v7(),
            vehicle_identification: self.vehicle_identification,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            image: self.image,
            ear: self.ear,
            mar: self.mar,
            event_type: self.event_type,
        }
    }
}
