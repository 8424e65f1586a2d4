// Partitioned, ordered, append-only log (NATS JetStream or in-memory)

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

mod client;
mod jetstream;
mod memory;
mod publisher;

pub use client::{NatsClient, NatsConfig};
pub use jetstream::JetStreamLog;
pub use memory::MemoryLog;
pub use publisher::EventPublisher;

/// Header carrying the unescaped partition key on JetStream messages.
pub const PARTITION_KEY_HEADER: &str = "Telemetry-Partition-Key";

/// Topic names for the three logs.
#[derive(Clone, Debug, Deserialize)]
pub struct TopicsConfig {
    #[serde(default = "default_sensors_topic")]
    pub sensors: String,
    #[serde(default = "default_hubs_topic")]
    pub hubs: String,
    #[serde(default = "default_snapshots_topic")]
    pub snapshots: String,
}

fn default_sensors_topic() -> String {
    "telemetry.sensors.v1".to_string()
}

fn default_hubs_topic() -> String {
    "telemetry.hubs.v1".to_string()
}

fn default_snapshots_topic() -> String {
    "telemetry.snapshots.v1".to_string()
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            sensors: default_sensors_topic(),
            hubs: default_hubs_topic(),
            snapshots: default_snapshots_topic(),
        }
    }
}

/// One record pulled from a topic.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub topic: String,

    /// Partition key (hub id)
    pub key: String,

    /// Position within the topic, increasing in append order
    pub offset: u64,

    pub payload: Vec<u8>,

    /// True when this consumer group had already committed past the record
    /// before the subscription was reopened from the beginning.
    pub replayed: bool,
}

/// Where a new subscription starts reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartPosition {
    /// Resume after the group's last committed record
    Committed,
    /// Re-read the whole topic, flagging already-committed records as replayed
    Beginning,
}

/// Append side of the log.
///
/// Records appended with the same key are delivered in append order. A
/// successful return means the log has durably accepted the record; any
/// failure is reported, never swallowed.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()>;

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<Box<dyn LogConsumer>>;

    /// Flushes outstanding appends and releases the connection to the log.
    /// Called once, after every consumer has been closed.
    async fn close(&self) -> Result<()>;
}

/// Consume side of the log, owned by exactly one loop.
#[async_trait]
pub trait LogConsumer: Send {
    /// Pulls at most `max_records`, waiting no longer than `max_wait` when
    /// the topic is drained. An empty batch means the wait elapsed.
    async fn poll(&mut self, max_records: usize, max_wait: Duration) -> Result<Vec<LogRecord>>;

    /// Commits every record returned by `poll` so far.
    async fn commit(&mut self) -> Result<()>;

    /// Final commit and release of the subscription.
    async fn close(&mut self) -> Result<()>;
}

/// Subject a record with `key` is published on: `<topic>.<escaped key>`.
pub fn partition_subject(topic: &str, key: &str) -> String {
    format!("{}.{}", topic, key_token(key))
}

/// Escapes a partition key into a single subject token.
///
/// Alphanumerics, `-` and `_` pass through; every other byte becomes `~XX`.
/// The empty key maps to `~`.
fn key_token(key: &str) -> String {
    if key.is_empty() {
        return "~".to_string();
    }

    let mut token = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            token.push(byte as char);
        } else {
            token.push_str(&format!("~{:02X}", byte));
        }
    }
    token
}

/// JetStream stream backing a topic, e.g. `TELEMETRY_SENSORS_V1`.
pub fn stream_name(topic: &str) -> String {
    topic
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
