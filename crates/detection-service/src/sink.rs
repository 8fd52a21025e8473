//! Hand-off of confirmed events from the loop thread

use camera_capture::VideoFrame;
use frame_buffer::EventNotice;
use tokio::sync::mpsc;
use tracing::warn;

/// A confirmed episode with its annotated frame
#[derive(Debug, Clone)]
pub struct EpisodeRecord {
    pub notice: EventNotice,
    pub frame: VideoFrame,
}

#[derive(Debug)]
pub enum SinkMessage {
    /// Persist and notify
    Record(EpisodeRecord),
    /// Notify only
    Notify(EventNotice),
}

/// Receives events from the loop. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn record(&self, record: EpisodeRecord);

    fn notify(&self, notice: EventNotice);
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _record: EpisodeRecord) {}

    fn notify(&self, _notice: EventNotice) {}
}

/// Bounded channel to an [`crate::EventRecorder`]; a full channel drops
pub struct ChannelEventSink {
    tx: mpsc::Sender<SinkMessage>,
}

impl ChannelEventSink {
    fn send(&self, message: SinkMessage) {
        if let Err(e) = self.tx.try_send(message) {
            warn!("Event sink dropped message: {}", e);
            metrics::counter!("detection_events_dropped_total").increment(1);
        }
    }
}

impl EventSink for ChannelEventSink {
    fn record(&self, record: EpisodeRecord) {
        self.send(SinkMessage::Record(record));
    }

    fn notify(&self, notice: EventNotice) {
        self.send(SinkMessage::Notify(notice));
    }
}

pub fn channel_sink(capacity: usize) -> (ChannelEventSink, mpsc::Receiver<SinkMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelEventSink { tx }, rx)
}
