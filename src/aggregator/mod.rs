// Snapshot Aggregator: folds sensor events into one snapshot per hub

use crate::event::{HubSnapshot, SensorEvent, SensorState};
use std::collections::HashMap;
use tracing::debug;

mod runner;

pub use runner::AggregationLoop;

/// In-memory hub snapshots, owned by a single consumption loop.
///
/// `update_state` is an idempotent fold: redelivered or reordered events are
/// discarded, and only events that change a sensor's data produce a new
/// snapshot to emit.
#[derive(Debug, Default)]
pub struct SnapshotAggregator {
    snapshots: HashMap<String, HubSnapshot>,
}

impl SnapshotAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `event` into its hub's snapshot.
    ///
    /// Returns the updated snapshot when the event was accepted, `None` when
    /// it was discarded (malformed, stale, unchanged or valueless).
    pub fn update_state(&mut self, event: &SensorEvent) -> Option<HubSnapshot> {
        if event.hub_id.is_empty() || event.id.is_empty() {
            debug!(
                hub_id = %event.hub_id,
                sensor_id = %event.id,
                "Discarding sensor event without hub or sensor id"
            );
            return None;
        }

        let Some(payload) = event.payload.as_ref() else {
            debug!(hub_id = %event.hub_id, sensor_id = %event.id, "Ignoring valueless sensor event");
            return None;
        };

        let snapshot = self
            .snapshots
            .entry(event.hub_id.clone())
            .or_insert_with(|| HubSnapshot::new(event.hub_id.clone(), event.timestamp));

        if let Some(old) = snapshot.sensors_state.get(&event.id) {
            if old.timestamp > event.timestamp {
                debug!(
                    hub_id = %event.hub_id,
                    sensor_id = %event.id,
                    stored = %old.timestamp,
                    received = %event.timestamp,
                    "Discarding stale sensor event"
                );
                return None;
            }
            if old.data == *payload {
                debug!(hub_id = %event.hub_id, sensor_id = %event.id, "Sensor data unchanged");
                return None;
            }
        }

        snapshot.sensors_state.insert(
            event.id.clone(),
            SensorState {
                timestamp: event.timestamp,
                data: payload.clone(),
            },
        );
        // A newer reading of another sensor may already have moved the
        // snapshot forward.
        snapshot.timestamp = snapshot.timestamp.max(event.timestamp);

        debug!(
            hub_id = %event.hub_id,
            sensor_id = %event.id,
            sensors = snapshot.sensor_count(),
            "Snapshot updated"
        );
        Some(snapshot.clone())
    }

    pub fn snapshot(&self, hub_id: &str) -> Option<&HubSnapshot> {
        self.snapshots.get(hub_id)
    }

    pub fn hub_count(&self) -> usize {
        self.snapshots.len()
    }
}
