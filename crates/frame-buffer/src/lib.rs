//! Shared Frame/Metrics Buffer
//!
//! Single-writer, many-reader store of the latest raw frame, processed
//! frame, facial metrics and pending drowsiness/yawning event. Readers
//! never block the detection loop and always see whole values.

mod buffer;

pub use buffer::{CycleFrames, CycleSnapshot, SharedFrameBuffer, EVENT_CHANNEL_CAPACITY};

use serde::{Deserialize, Serialize};

/// Per-frame facial metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FacialMetrics {
    pub ear: f32,
    pub mar: f32,
    pub is_drowsy: bool,
    pub is_calling: bool,
}

/// What kind of condition an event notice reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Drowsiness,
    Yawning,
    PhoneUse,
}

/// A transition into an alert condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNotice {
    pub kind: EventKind,
    /// Alert stage level (1-3) for drowsiness, 0 otherwise
    pub stage: u8,
    pub ear: f32,
    pub mar: f32,
    /// Wall-clock time of the triggering frame (ms since epoch)
    pub timestamp_ms: u64,
}

impl EventNotice {
    /// Event type label used for persistence and notification
    pub fn event_type(&self) -> String {
        match self.kind {
            EventKind::Drowsiness => format!("drowsiness_stage_{}", self.stage),
            EventKind::Yawning => "yawning".to_string(),
            EventKind::PhoneUse => "phone_use".to_string(),
        }
    }
}

/// Most recent unconsumed events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrowsinessEventSignal {
    pub drowsiness_event: Option<EventNotice>,
    pub yawning_event: Option<EventNotice>,
}

impl DrowsinessEventSignal {
    pub fn is_empty(&self) -> bool {
        self.drowsiness_event.is_none() && self.yawning_event.is_none()
    }
}
