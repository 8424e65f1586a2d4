use super::{EventLog, LogConsumer, LogRecord, StartPosition};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// In-process event log for local runs and tests.
///
/// Each topic is a single ordered sequence, which trivially preserves
/// per-key order. Committed positions are kept per (group, topic).
#[derive(Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    appended: Notify,
    closed: AtomicBool,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<Stored>>,
    committed: HashMap<(String, String), u64>,
}

struct Stored {
    key: String,
    payload: Vec<u8>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record appended to `topic`, in order.
    pub async fn records(&self, topic: &str) -> Vec<LogRecord> {
        let state = self.inner.state.lock().await;
        state
            .topics
            .get(topic)
            .map(|stored| {
                stored
                    .iter()
                    .enumerate()
                    .map(|(offset, record)| LogRecord {
                        topic: topic.to_string(),
                        key: record.key.clone(),
                        offset: offset as u64,
                        payload: record.payload.clone(),
                        replayed: false,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Position after the last record `group` committed on `topic`.
    pub async fn committed(&self, group: &str, topic: &str) -> u64 {
        let state = self.inner.state.lock().await;
        state
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn append(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            bail!("event log is closed");
        }
        {
            let mut state = self.inner.state.lock().await;
            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .push(Stored {
                    key: key.to_string(),
                    payload,
                });
        }
        self.inner.appended.notify_waiters();
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<Box<dyn LogConsumer>> {
        let committed = self.committed(group, topic).await;
        let (position, replay_floor) = match start {
            StartPosition::Committed => (committed, 0),
            StartPosition::Beginning => (0, committed),
        };

        Ok(Box::new(MemoryConsumer {
            log: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            position,
            replay_floor,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct MemoryConsumer {
    log: MemoryLog,
    topic: String,
    group: String,
    position: u64,
    replay_floor: u64,
}

impl MemoryConsumer {
    async fn take(&mut self, max_records: usize) -> Vec<LogRecord> {
        let state = self.log.inner.state.lock().await;
        let Some(stored) = state.topics.get(&self.topic) else {
            return Vec::new();
        };

        let start = self.position as usize;
        let records: Vec<LogRecord> = stored
            .iter()
            .enumerate()
            .skip(start)
            .take(max_records)
            .map(|(offset, record)| LogRecord {
                topic: self.topic.clone(),
                key: record.key.clone(),
                offset: offset as u64,
                payload: record.payload.clone(),
                replayed: (offset as u64) < self.replay_floor,
            })
            .collect();

        self.position += records.len() as u64;
        records
    }
}

#[async_trait]
impl LogConsumer for MemoryConsumer {
    async fn poll(&mut self, max_records: usize, max_wait: Duration) -> Result<Vec<LogRecord>> {
        let deadline = Instant::now() + max_wait;
        let log = self.log.clone();

        loop {
            // Register interest before looking, so an append between the
            // check and the wait still wakes us.
            let notified = log.inner.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let records = self.take(max_records).await;
            if !records.is_empty() {
                return Ok(records);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.log.inner.state.lock().await;
        let entry = state
            .committed
            .entry((self.group.clone(), self.topic.clone()))
            .or_insert(0);
        *entry = (*entry).max(self.position);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.commit().await
    }
}
