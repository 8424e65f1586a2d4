use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod kinds;
mod snapshot;

pub use kinds::{ActionType, ConditionOperation, ConditionType, DeviceType, UnknownSymbol};
pub use snapshot::{HubSnapshot, SensorState};

/// Canonical sensor reading as carried on the sensor-event log.
///
/// Immutable once constructed. `payload` is `None` when the producer sent a
/// payload kind this service does not recognize; such events travel through
/// the log and are ignored by the aggregator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    /// Sensor identifier within the hub
    pub id: String,

    /// Hub the sensor reports through (partition key)
    pub hub_id: String,

    /// Producer time
    pub timestamp: DateTime<Utc>,

    pub payload: Option<SensorPayload>,
}

/// Reading shape, one variant per sensor kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SensorPayload {
    Motion(MotionSensor),
    Temperature(TemperatureSensor),
    Light(LightSensor),
    Climate(ClimateSensor),
    Switch(SwitchSensor),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionSensor {
    pub link_quality: i32,
    pub motion: bool,
    pub voltage: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureSensor {
    pub temperature_c: i32,
    pub temperature_f: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightSensor {
    pub link_quality: i32,
    pub luminosity: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClimateSensor {
    pub temperature_c: i32,
    pub humidity: i32,
    pub co2_level: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchSensor {
    pub state: bool,
}

/// Hub lifecycle event as carried on the hub-event log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HubEvent {
    /// Hub the event belongs to (partition key)
    pub hub_id: String,

    /// Producer time
    pub timestamp: DateTime<Utc>,

    pub payload: Option<HubPayload>,
}

impl HubEvent {
    /// Type tag of the payload, `None` for a valueless event.
    pub fn event_type(&self) -> Option<HubEventType> {
        self.payload.as_ref().map(HubPayload::event_type)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HubPayload {
    DeviceAdded(DeviceAdded),
    DeviceRemoved(DeviceRemoved),
    ScenarioAdded(ScenarioAdded),
    ScenarioRemoved(ScenarioRemoved),
}

impl HubPayload {
    pub fn event_type(&self) -> HubEventType {
        match self {
            HubPayload::DeviceAdded(_) => HubEventType::DeviceAdded,
            HubPayload::DeviceRemoved(_) => HubEventType::DeviceRemoved,
            HubPayload::ScenarioAdded(_) => HubEventType::ScenarioAdded,
            HubPayload::ScenarioRemoved(_) => HubEventType::ScenarioRemoved,
        }
    }
}

/// Payload type tag used to route hub events to their handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HubEventType {
    DeviceAdded,
    DeviceRemoved,
    ScenarioAdded,
    ScenarioRemoved,
}

impl fmt::Display for HubEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HubEventType::DeviceAdded => "DeviceAddedEvent",
            HubEventType::DeviceRemoved => "DeviceRemovedEvent",
            HubEventType::ScenarioAdded => "ScenarioAddedEvent",
            HubEventType::ScenarioRemoved => "ScenarioRemovedEvent",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAdded {
    pub id: String,
    pub device_type: DeviceType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRemoved {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioAdded {
    pub name: String,
    pub conditions: Vec<ScenarioCondition>,
    pub actions: Vec<DeviceAction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRemoved {
    pub name: String,
}

/// Trigger half of a scenario: compare a sensor reading against `value`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioCondition {
    pub sensor_id: String,
    pub condition_type: ConditionType,
    pub operation: ConditionOperation,
    pub value: Option<i32>,
}

/// Effect half of a scenario: drive a device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAction {
    pub sensor_id: String,
    pub action_type: ActionType,
    pub value: Option<i32>,
}

/// Automation rule stored for a hub, keyed by (hub_id, name).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub hub_id: String,
    pub name: String,
    pub conditions: Vec<ScenarioCondition>,
    pub actions: Vec<DeviceAction>,
}

impl Scenario {
    pub fn from_event(hub_id: &str, added: &ScenarioAdded) -> Self {
        Self {
            hub_id: hub_id.to_string(),
            name: added.name.clone(),
            conditions: added.conditions.clone(),
            actions: added.actions.clone(),
        }
    }

    /// Every sensor id referenced by a condition or an action, in declaration
    /// order, without duplicates.
    pub fn referenced_sensors(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        let referenced = self
            .conditions
            .iter()
            .map(|c| c.sensor_id.as_str())
            .chain(self.actions.iter().map(|a| a.sensor_id.as_str()));
        for id in referenced {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}
