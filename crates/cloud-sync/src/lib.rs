//! Cloud Synchronization Module
//!
//! Fire-and-forget event notification to the fleet server:
//! - MQTT publishing to `vehicles/{vehicle_id}/events`
//! - Daily message quota
//! - Disabled sink when sending is switched off

use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Cloud sync error types
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Daily quota exhausted")]
    BandwidthLimit,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Cloud sync configuration
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// MQTT broker host
    pub broker_url: String,
    /// MQTT port
    pub broker_port: u16,
    /// Vehicle ID
    pub vehicle_id: String,
    /// Messages allowed per day
    pub daily_quota: u32,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            broker_url: "localhost".to_string(),
            broker_port: 1883,
            vehicle_id: "unknown".to_string(),
            daily_quota: 2000,
        }
    }
}

/// Event message for the fleet server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub message_type: String,
    pub vehicle_id: String,
    pub timestamp: DateTime<Utc>,
    /// Persisted event id, absent for notify-only events
    pub event_id: Option<Uuid>,
    pub event_type: String,
    pub ear: f32,
    pub mar: f32,
    /// Snapshot path served from the static directory
    pub image: Option<String>,
}

impl EventMessage {
    pub fn new(vehicle_id: &str, event_type: impl Into<String>, ear: f32, mar: f32) -> Self {
        Self {
            message_type: "event".to_string(),
            vehicle_id: vehicle_id.to_string(),
            timestamp: Utc::now(),
            event_id: None,
            event_type: event_type.into(),
            ear,
            mar,
            image: None,
        }
    }

    pub fn with_record(mut self, event_id: Uuid, image: impl Into<String>) -> Self {
        self.event_id = Some(event_id);
        self.image = Some(image.into());
        self
    }
}

/// Outward notification sink. Must not block; callers only log errors.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &EventMessage) -> Result<(), CloudError>;
}

/// Sink used when `send_to_server` is off
#[derive(Debug, Default)]
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn notify(&self, message: &EventMessage) -> Result<(), CloudError> {
        debug!("Notification disabled, dropping {}", message.event_type);
        Ok(())
    }
}

/// MQTT publisher
pub struct MqttNotifier {
    config: CloudConfig,
    client: AsyncClient,
    sent_today: AtomicU32,
}

impl MqttNotifier {
    /// Create the client and spawn its event loop on the current runtime.
    /// The broker connection is established in the background.
    pub fn connect(config: CloudConfig) -> Result<Arc<Self>, CloudError> {
        if config.broker_url.is_empty() {
            return Err(CloudError::Connection("no broker configured".to_string()));
        }
        let mut options = MqttOptions::new(
            format!("vehicle-{}", config.vehicle_id),
            &config.broker_url,
            config.broker_port,
        );
        options.set_keep_alive(std::time::Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(options, 10);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(incoming)) => {
                        debug!("MQTT incoming: {:?}", incoming);
                    }
                    Err(e) => {
                        error!("MQTT error: {}", e);
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                    _ => {}
                }
            }
        });

        info!("MQTT notifier for broker {}:{}", config.broker_url, config.broker_port);
        Ok(Arc::new(Self {
            config,
            client,
            sent_today: AtomicU32::new(0),
        }))
    }

    pub fn topic(&self) -> String {
        format!("vehicles/{}/events", self.config.vehicle_id)
    }

    /// Reset daily quota (call at midnight)
    pub fn reset_daily_quota(&self) {
        self.sent_today.store(0, Ordering::Relaxed);
    }
}

impl Notifier for MqttNotifier {
    fn notify(&self, message: &EventMessage) -> Result<(), CloudError> {
        if self.sent_today.load(Ordering::Relaxed) >= self.config.daily_quota {
            return Err(CloudError::BandwidthLimit);
        }

        let payload =
            serde_json::to_vec(message).map_err(|e| CloudError::Serialization(e.to_string()))?;
        self.client
            .try_publish(self.topic(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| CloudError::Publish(e.to_string()))?;

        self.sent_today.fetch_add(1, Ordering::Relaxed);
        debug!("Queued {} for {}", message.event_type, self.topic());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let id = Uuid::now_v7();
        let message = EventMessage::new("VH-001", "drowsiness_stage_1", 0.12, 0.3)
            .with_record(id, "images/x.jpg");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["vehicle_id"], "VH-001");
        assert_eq!(json["event_type"], "drowsiness_stage_1");
        assert_eq!(json["event_id"], id.to_string());
    }

    #[test]
    fn test_disabled_notifier_accepts_everything() {
        let message = EventMessage::new("VH-001", "yawning", 0.3, 0.7);
        assert!(DisabledNotifier.notify(&message).is_ok());
    }

    #[tokio::test]
    async fn test_quota_enforced() {
        let notifier = MqttNotifier::connect(CloudConfig {
            // Nothing listens here; publishes only queue
            broker_url: "127.0.0.1".into(),
            broker_port: 1,
            vehicle_id: "VH-7".into(),
            daily_quota: 2,
        })
        .unwrap();
        assert_eq!(notifier.topic(), "vehicles/VH-7/events");

        let message = EventMessage::new("VH-7", "yawning", 0.3, 0.7);
        assert!(notifier.notify(&message).is_ok());
        assert!(notifier.notify(&message).is_ok());
        assert!(matches!(notifier.notify(&message), Err(CloudError::BandwidthLimit)));

        notifier.reset_daily_quota();
        assert!(notifier.notify(&message).is_ok());
    }

    #[test]
    fn test_empty_broker_rejected() {
        let config = CloudConfig {
            broker_url: String::new(),
            ..Default::default()
        };
        assert!(matches!(MqttNotifier::connect(config), Err(CloudError::Connection(_))));
    }
}
