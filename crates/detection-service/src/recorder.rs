//! Async persistence and notification of loop events

use crate::sink::{EpisodeRecord, SinkMessage};
use crate::DetectionError;
use chrono::{TimeZone, Utc};
use cloud_sync::{EventMessage, Notifier};
use frame_buffer::EventNotice;
use std::sync::Arc;
use storage::{DrowsinessEvent, EventRepository, ImageStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drains the loop's event channel: encode, save image, insert, notify
pub struct EventRecorder {
    repository: EventRepository,
    images: ImageStore,
    notifier: Arc<dyn Notifier>,
    vehicle_id: String,
}

impl EventRecorder {
    pub fn new(
        repository: EventRepository,
        images: ImageStore,
        notifier: Arc<dyn Notifier>,
        vehicle_id: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            images,
            notifier,
            vehicle_id: vehicle_id.into(),
        }
    }

    pub fn spawn(self, rx: mpsc::Receiver<SinkMessage>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    /// Process messages until every sender is gone
    pub async fn run(self, mut rx: mpsc::Receiver<SinkMessage>) {
        info!("Event recorder started");
        while let Some(message) = rx.recv().await {
            match message {
                SinkMessage::Record(record) => {
                    if let Err(e) = self.persist(record).await {
                        warn!("Failed to persist event: {}", e);
                    }
                }
                SinkMessage::Notify(notice) => self.notify(&notice, None),
            }
        }
        info!("Event recorder stopped");
    }

    /// Persist one episode and notify it
    pub async fn persist(&self, record: EpisodeRecord) -> Result<DrowsinessEvent, DetectionError> {
        let EpisodeRecord { notice, frame } = record;
        let jpeg = tokio::task::spawn_blocking(move || frame.encode_jpeg())
            .await
            .map_err(|e| DetectionError::Encode(e.to_string()))?
            .map_err(|e| DetectionError::Encode(e.to_string()))?;

        let id = Uuid::now_v7();
        let image = self.images.save(id, &jpeg).await?;
        let event = DrowsinessEvent {
            id,
            vehicle_identification: self.vehicle_id.clone(),
            timestamp: Utc
                .timestamp_millis_opt(notice.timestamp_ms as i64)
                .single()
                .unwrap_or_else(Utc::now),
            image,
            ear: Some(notice.ear as f64),
            mar: Some(notice.mar as f64),
            event_type: notice.event_type(),
        };

        if let Err(e) = self.repository.create(&event).await {
            self.images.remove(&event.image).await;
            return Err(e.into());
        }
        debug!("Recorded {} as {}", event.event_type, event.id);

        self.notify(&notice, Some(&event));
        Ok(event)
    }

    fn notify(&self, notice: &EventNotice, event: Option<&DrowsinessEvent>) {
        let mut message =
            EventMessage::new(&self.vehicle_id, notice.event_type(), notice.ear, notice.mar);
        if let Some(event) = event {
            message = message.with_record(event.id, event.image.clone());
        }
        if let Err(e) = self.notifier.notify(&message) {
            warn!("Notification failed for {}: {}", message.event_type, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::VideoFrame;
    use cloud_sync::CloudError;
    use frame_buffer::EventKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventMessage>>);

    impl Notifier for Collect {
        fn notify(&self, message: &EventMessage) -> Result<(), CloudError> {
            self.0.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn notice(kind: EventKind, stage: u8) -> EventNotice {
        EventNotice {
            kind,
            stage,
            ear: 0.12,
            mar: 0.4,
            timestamp_ms: 1_700_000_000_123,
        }
    }

    #[tokio::test]
    async fn test_persist_saves_image_and_row() {
        let dir = tempfile::tempdir().unwrap();
        let repository = EventRepository::connect("sqlite::memory:").await.unwrap();
        let images = ImageStore::new(dir.path(), "images");
        let notifier = Arc::new(Collect::default());
        let recorder = EventRecorder::new(repository.clone(), images.clone(), notifier.clone(), "VH-001");

        let event = recorder
            .persist(EpisodeRecord {
                notice: notice(EventKind::Drowsiness, 1),
                frame: VideoFrame::filled(16, 16, [50, 50, 50]),
            })
            .await
            .unwrap();

        assert_eq!(event.event_type, "drowsiness_stage_1");
        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(repository.get_by_id(event.id).await.unwrap(), Some(event.clone()));
        assert_eq!(&images.read(&event.image).await.unwrap()[..2], &[0xFF, 0xD8]);

        let sent = notifier.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_id, Some(event.id));
    }

    #[tokio::test]
    async fn test_run_drains_until_senders_drop() {
        let dir = tempfile::tempdir().unwrap();
        let repository = EventRepository::connect("sqlite::memory:").await.unwrap();
        let notifier = Arc::new(Collect::default());
        let recorder = EventRecorder::new(
            repository.clone(),
            ImageStore::new(dir.path(), "images"),
            notifier.clone(),
            "VH-001",
        );

        let (sink, rx) = crate::channel_sink(8);
        let handle = recorder.spawn(rx);
        crate::EventSink::record(
            &sink,
            EpisodeRecord {
                notice: notice(EventKind::Yawning, 0),
                frame: VideoFrame::filled(8, 8, [0; 3]),
            },
        );
        crate::EventSink::notify(&sink, notice(EventKind::PhoneUse, 0));
        drop(sink);
        handle.await.unwrap();

        assert_eq!(repository.count().await.unwrap(), 1);
        let types: Vec<String> = notifier.0.lock().unwrap().iter().map(|m| m.event_type.clone()).collect();
        assert_eq!(types, vec!["yawning", "phone_use"]);
    }
}
