//! Shared buffer implementation

use crate::{DrowsinessEventSignal, EventNotice, FacialMetrics};
use arc_swap::ArcSwap;
use camera_capture::VideoFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Notices buffered per subscriber before it starts lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Raw and annotated frame of the same cycle
#[derive(Debug, Clone)]
pub struct CycleFrames {
    pub raw: Arc<VideoFrame>,
    pub processed: Arc<VideoFrame>,
}

/// Everything the last completed cycle published, swapped as one value
#[derive(Debug, Clone, Default)]
pub struct CycleSnapshot {
    pub frames: Option<CycleFrames>,
    pub metrics: FacialMetrics,
}

/// Latest-value store written by the detection loop
pub struct SharedFrameBuffer {
    latest: ArcSwap<CycleSnapshot>,
    /// Pending signal; read is a take
    pending: Mutex<DrowsinessEventSignal>,
    events: broadcast::Sender<EventNotice>,
    /// Frame pairs written (for statistics)
    frames_written: AtomicU64,
}

impl SharedFrameBuffer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            latest: ArcSwap::from_pointee(CycleSnapshot::default()),
            pending: Mutex::new(DrowsinessEventSignal::default()),
            events,
            frames_written: AtomicU64::new(0),
        }
    }

    /// Publish frames and metrics of one cycle in a single swap
    pub fn update_cycle(&self, raw: VideoFrame, processed: VideoFrame, metrics: FacialMetrics) {
        self.latest.store(Arc::new(CycleSnapshot {
            frames: Some(CycleFrames {
                raw: Arc::new(raw),
                processed: Arc::new(processed),
            }),
            metrics,
        }));
        self.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Store the raw and annotated frame of one cycle, keeping the metrics
    pub fn update_frame(&self, raw: VideoFrame, processed: VideoFrame) {
        let frames = CycleFrames {
            raw: Arc::new(raw),
            processed: Arc::new(processed),
        };
        self.latest.rcu(|current| CycleSnapshot {
            frames: Some(frames.clone()),
            metrics: current.metrics,
        });
        self.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Last completed cycle
    pub fn snapshot(&self) -> Arc<CycleSnapshot> {
        self.latest.load_full()
    }

    /// Raw and processed frame of the same cycle
    pub fn get_frames(&self) -> Option<CycleFrames> {
        self.latest.load().frames.clone()
    }

    pub fn get_raw_frame(&self) -> Option<Arc<VideoFrame>> {
        self.latest.load().frames.as_ref().map(|f| Arc::clone(&f.raw))
    }

    pub fn get_processed_frame(&self) -> Option<Arc<VideoFrame>> {
        self.latest.load().frames.as_ref().map(|f| Arc::clone(&f.processed))
    }

    pub fn update_facial_metrics(&self, metrics: FacialMetrics) {
        self.latest.rcu(|current| CycleSnapshot {
            frames: current.frames.clone(),
            metrics,
        });
    }

    /// Latest metrics; zero default before the first cycle
    pub fn get_facial_metrics(&self) -> FacialMetrics {
        self.latest.load().metrics
    }

    /// Record new events. `None` leaves that slot as it is; every given
    /// notice is also broadcast to subscribers.
    pub fn update_drowsiness_event_recent(
        &self,
        drowsiness: Option<EventNotice>,
        yawning: Option<EventNotice>,
    ) {
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(notice) = &drowsiness {
                pending.drowsiness_event = Some(notice.clone());
            }
            if let Some(notice) = &yawning {
                pending.yawning_event = Some(notice.clone());
            }
        }
        for notice in drowsiness.into_iter().chain(yawning) {
            self.publish(notice);
        }
    }

    /// Take the pending signal, leaving it empty
    pub fn get_drowsiness_event_recent(&self) -> DrowsinessEventSignal {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending)
    }

    /// Broadcast a notice without touching the pending signal
    pub fn publish(&self, notice: EventNotice) {
        // Err only means no subscriber is connected
        if self.events.send(notice).is_err() {
            debug!("No event subscribers");
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EventNotice> {
        self.events.subscribe()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }
}

impl Default for SharedFrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
