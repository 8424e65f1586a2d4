use super::stream_name;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream};
use serde::Deserialize;
use tracing::info;

/// NATS configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: i64,
}

fn default_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

fn default_max_age_days() -> i64 {
    7
}

fn default_max_bytes() -> i64 {
    10 * 1024 * 1024 * 1024 // 10GB
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_age_days: default_max_age_days(),
            max_bytes: default_max_bytes(),
        }
    }
}

/// NATS client with JetStream
#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS and initialize JetStream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        Ok(Self {
            jetstream: jetstream::new(client.clone()),
            client,
            config,
        })
    }

    /// Ensure the JetStream stream backing `topic` exists.
    ///
    /// The stream captures every partition subject of the topic (`<topic>.>`).
    pub async fn ensure_stream(&self, topic: &str) -> Result<stream::Stream> {
        let name = stream_name(topic);

        if let Ok(existing) = self.jetstream.get_stream(&name).await {
            return Ok(existing);
        }

        info!(stream = %name, topic = %topic, "Stream does not exist, creating...");

        let stream_config = stream::Config {
            name: name.clone(),
            subjects: vec![format!("{}.>", topic)],
            max_age: std::time::Duration::from_secs((self.config.max_age_days * 86400) as u64),
            max_bytes: self.config.max_bytes,
            storage: stream::StorageType::File,
            retention: stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        let created = self
            .jetstream
            .create_stream(stream_config)
            .await
            .with_context(|| format!("Failed to create JetStream stream '{}'", name))?;

        info!(stream = %name, "Created JetStream stream");
        Ok(created)
    }

    /// Flush buffered publishes to the server before the connection is dropped
    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")
    }

    /// Get JetStream context for publishing
    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }
}
