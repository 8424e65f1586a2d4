use super::HubEventDispatcher;
use crate::codec::AvroCodec;
use crate::config::AnalyzerConfig;
use crate::log::{LogConsumer, LogRecord};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Consumption loop over the hub-event log.
pub struct HubEventLoop {
    consumer: Box<dyn LogConsumer>,
    codec: Arc<AvroCodec>,
    dispatcher: HubEventDispatcher,
    batch_size: usize,
    poll_timeout: Duration,
}

impl HubEventLoop {
    pub fn new(
        consumer: Box<dyn LogConsumer>,
        codec: Arc<AvroCodec>,
        dispatcher: HubEventDispatcher,
        config: &AnalyzerConfig,
    ) -> Self {
        Self {
            consumer,
            codec,
            dispatcher,
            batch_size: config.batch_size.max(1),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
        }
    }

    /// Pull and dispatch until `shutdown` turns true.
    ///
    /// Undecodable records and fatal dispatch errors stop the loop without
    /// committing the batch; the records are redelivered after a restart.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(batch_size = self.batch_size, "Hub event analyzer started");

        while !*shutdown.borrow() {
            let records = self
                .consumer
                .poll(self.batch_size, self.poll_timeout)
                .await
                .context("Failed to pull hub events")?;

            if records.is_empty() {
                continue;
            }

            for record in &records {
                self.process(record)?;
            }

            self.consumer
                .commit()
                .await
                .context("Failed to commit hub-event batch")?;
            debug!(records = records.len(), "Committed hub-event batch");
        }

        info!("Stop requested, closing analyzer");
        self.consumer
            .close()
            .await
            .context("Failed to close hub-event subscription")?;
        Ok(())
    }

    fn process(&self, record: &LogRecord) -> Result<()> {
        let event = self.codec.decode_hub_event(&record.payload).with_context(|| {
            format!(
                "Failed to decode hub event at {} offset {}",
                record.topic, record.offset
            )
        })?;

        match self.dispatcher.dispatch(&event) {
            Ok(()) => Ok(()),
            Err(e) if !e.is_fatal() => {
                warn!(
                    hub_id = %event.hub_id,
                    offset = record.offset,
                    error = %e,
                    "Hub event rejected"
                );
                Ok(())
            }
            Err(e) => Err(e).with_context(|| {
                format!(
                    "Failed to handle hub event from hub '{}' at offset {}",
                    event.hub_id, record.offset
                )
            }),
        }
    }
}
