use super::{EventLog, TopicsConfig};
use crate::codec::AvroCodec;
use crate::event::{HubEvent, HubSnapshot, SensorEvent};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Encodes canonical events and appends them to their topic, keyed by hub.
#[derive(Clone)]
pub struct EventPublisher {
    log: Arc<dyn EventLog>,
    codec: Arc<AvroCodec>,
    topics: TopicsConfig,
}

impl EventPublisher {
    pub fn new(log: Arc<dyn EventLog>, codec: Arc<AvroCodec>, topics: TopicsConfig) -> Self {
        Self { log, codec, topics }
    }

    pub fn topics(&self) -> &TopicsConfig {
        &self.topics
    }

    /// Append an already encoded record under `key`.
    pub async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        debug!(topic = %topic, key = %key, bytes = payload.len(), "Publishing record");

        self.log
            .append(topic, key, payload)
            .await
            .with_context(|| format!("Failed to publish to topic '{}'", topic))
    }

    pub async fn publish_sensor_event(&self, event: &SensorEvent) -> Result<()> {
        let payload = self
            .codec
            .encode_sensor_event(event)
            .context("Failed to encode sensor event")?;
        self.publish(&self.topics.sensors, &event.hub_id, payload).await
    }

    pub async fn publish_hub_event(&self, event: &HubEvent) -> Result<()> {
        let payload = self
            .codec
            .encode_hub_event(event)
            .context("Failed to encode hub event")?;
        self.publish(&self.topics.hubs, &event.hub_id, payload).await
    }

    pub async fn publish_snapshot(&self, snapshot: &HubSnapshot) -> Result<()> {
        let payload = self
            .codec
            .encode_snapshot(snapshot)
            .context("Failed to encode snapshot")?;
        self.publish(&self.topics.snapshots, &snapshot.hub_id, payload)
            .await
    }
}
