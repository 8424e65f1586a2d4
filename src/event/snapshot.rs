use super::SensorPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Latest accepted reading of one sensor.
///
/// Replaced wholesale on every accepted event, never merged field by field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    pub timestamp: DateTime<Utc>,
    pub data: SensorPayload,
}

/// Latest known state of every sensor on a hub.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HubSnapshot {
    pub hub_id: String,

    /// Max timestamp of any contained state (creation time while empty)
    pub timestamp: DateTime<Utc>,

    /// sensor_id -> latest state
    pub sensors_state: HashMap<String, SensorState>,
}

impl HubSnapshot {
    pub fn new(hub_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            hub_id: hub_id.into(),
            timestamp,
            sensors_state: HashMap::new(),
        }
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<&SensorState> {
        self.sensors_state.get(sensor_id)
    }

    /// Number of sensors tracked (for logging/display)
    pub fn sensor_count(&self) -> usize {
        self.sensors_state.len()
    }
}
