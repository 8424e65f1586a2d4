use super::SnapshotAggregator;
use crate::codec::AvroCodec;
use crate::config::AggregatorConfig;
use crate::log::{EventPublisher, LogConsumer, LogRecord};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Consumption loop: sensor-event log in, snapshot log out.
pub struct AggregationLoop {
    consumer: Box<dyn LogConsumer>,
    codec: Arc<AvroCodec>,
    publisher: EventPublisher,
    aggregator: SnapshotAggregator,
    batch_size: usize,
    poll_timeout: Duration,
}

impl AggregationLoop {
    pub fn new(
        consumer: Box<dyn LogConsumer>,
        codec: Arc<AvroCodec>,
        publisher: EventPublisher,
        config: &AggregatorConfig,
    ) -> Self {
        Self {
            consumer,
            codec,
            publisher,
            aggregator: SnapshotAggregator::new(),
            batch_size: config.batch_size.max(1),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
        }
    }

    /// Pull, fold and emit until `shutdown` turns true.
    ///
    /// The batch in flight is always finished and committed before
    /// returning. A failed snapshot publish stops the loop without
    /// committing, so the batch is redelivered on restart.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(batch_size = self.batch_size, "Snapshot aggregator started");

        while !*shutdown.borrow() {
            let records = self
                .consumer
                .poll(self.batch_size, self.poll_timeout)
                .await
                .context("Failed to pull sensor events")?;

            if records.is_empty() {
                continue;
            }

            for record in &records {
                self.process(record).await?;
            }

            self.consumer
                .commit()
                .await
                .context("Failed to commit sensor-event batch")?;
            debug!(records = records.len(), "Committed sensor-event batch");
        }

        info!(hubs = self.aggregator.hub_count(), "Stop requested, closing aggregator");
        self.consumer
            .close()
            .await
            .context("Failed to close sensor-event subscription")?;
        Ok(())
    }

    async fn process(&mut self, record: &LogRecord) -> Result<()> {
        let event = match self.codec.decode_sensor_event(&record.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    topic = %record.topic,
                    offset = record.offset,
                    error = %e,
                    "Failed to decode sensor event, skipping"
                );
                return Ok(());
            }
        };

        let Some(snapshot) = self.aggregator.update_state(&event) else {
            return Ok(());
        };

        // Already emitted before the last commit; only rebuild state.
        if record.replayed {
            return Ok(());
        }

        self.publisher
            .publish_snapshot(&snapshot)
            .await
            .with_context(|| format!("Failed to publish snapshot for hub '{}'", snapshot.hub_id))
    }
}
