use super::{
    partition_subject, stream_name, EventLog, LogConsumer, LogRecord, NatsClient, StartPosition,
    PARTITION_KEY_HEADER,
};
use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{self, consumer};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

/// Event log backed by one JetStream stream per topic.
pub struct JetStreamLog {
    client: NatsClient,
    ensured: RwLock<HashSet<String>>,
}

impl JetStreamLog {
    pub fn new(client: NatsClient) -> Self {
        Self {
            client,
            ensured: RwLock::new(HashSet::new()),
        }
    }

    async fn ensure_topic(&self, topic: &str) -> Result<()> {
        let known = self
            .ensured
            .read()
            .map_err(|_| anyhow!("Stream cache lock poisoned"))?
            .contains(topic);
        if known {
            return Ok(());
        }

        self.client.ensure_stream(topic).await?;
        self.ensured
            .write()
            .map_err(|_| anyhow!("Stream cache lock poisoned"))?
            .insert(topic.to_string());
        Ok(())
    }
}

#[async_trait]
impl EventLog for JetStreamLog {
    async fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        self.ensure_topic(topic).await?;

        let subject = partition_subject(topic, key);
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(PARTITION_KEY_HEADER, key);

        debug!(topic = %topic, key = %key, subject = %subject, "Publishing record to NATS");

        self.client
            .jetstream()
            .publish_with_headers(subject.clone(), headers, payload.into())
            .await
            .context(format!("Failed to publish record to subject '{}'", subject))?
            .await
            .context("Failed to await publish ack")?;

        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<Box<dyn LogConsumer>> {
        let stream = self.client.ensure_stream(topic).await?;

        let config = consumer::pull::Config {
            durable_name: Some(group.to_string()),
            filter_subject: format!("{}.>", topic),
            ack_policy: consumer::AckPolicy::Explicit,
            ..Default::default()
        };

        let (consumer, replay_floor) = match start {
            StartPosition::Committed => {
                let consumer = stream
                    .get_or_create_consumer(group, config)
                    .await
                    .context("Failed to get or create consumer")?;
                (consumer, 0)
            }
            StartPosition::Beginning => {
                // get_or_create_consumer would hand back the durable at its
                // ack offset, so remember the floor and recreate it.
                let floor = match stream.get_consumer::<consumer::pull::Config>(group).await {
                    Ok(existing) => existing.cached_info().ack_floor.stream_sequence,
                    Err(_) => 0,
                };
                match stream.delete_consumer(group).await {
                    Ok(_) => info!(group = %group, "Deleted existing consumer for replay"),
                    Err(e) => info!(error = %e, "No existing consumer to delete (normal on first start)"),
                }
                let consumer = stream
                    .create_consumer(consumer::pull::Config {
                        deliver_policy: consumer::DeliverPolicy::All,
                        ..config
                    })
                    .await
                    .context("Failed to create consumer")?;
                (consumer, floor)
            }
        };

        info!(
            stream = %stream_name(topic),
            group = %group,
            replay_floor,
            "Consumer ready"
        );

        Ok(Box::new(JetStreamConsumer {
            topic: topic.to_string(),
            consumer,
            replay_floor,
            pending: Vec::new(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.client.flush().await?;
        info!("NATS connection flushed");
        Ok(())
    }
}

struct JetStreamConsumer {
    topic: String,
    consumer: consumer::PullConsumer,
    replay_floor: u64,
    pending: Vec<jetstream::Message>,
}

impl JetStreamConsumer {
    fn record(&self, message: &jetstream::Message) -> Result<LogRecord> {
        let offset = message
            .info()
            .map_err(|e| anyhow!("Failed to get message info: {}", e))?
            .stream_sequence;

        let key = match message
            .headers
            .as_ref()
            .and_then(|headers| headers.get(PARTITION_KEY_HEADER))
        {
            Some(value) => value.as_str().to_string(),
            None => message
                .subject
                .as_str()
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_string(),
        };

        Ok(LogRecord {
            topic: self.topic.clone(),
            key,
            offset,
            payload: message.payload.to_vec(),
            replayed: offset <= self.replay_floor,
        })
    }
}

#[async_trait]
impl LogConsumer for JetStreamConsumer {
    async fn poll(&mut self, max_records: usize, max_wait: Duration) -> Result<Vec<LogRecord>> {
        let mut batch = self
            .consumer
            .fetch()
            .max_messages(max_records)
            .expires(max_wait)
            .messages()
            .await
            .map_err(|e| anyhow!("Failed to fetch batch: {}", e))?;

        let mut records = Vec::new();
        while let Some(message) = batch.next().await {
            let message = message.map_err(|e| anyhow!("Error receiving message: {}", e))?;
            records.push(self.record(&message)?);
            self.pending.push(message);
        }

        Ok(records)
    }

    async fn commit(&mut self) -> Result<()> {
        for message in self.pending.drain(..) {
            message
                .ack()
                .await
                .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.commit().await
    }
}
