//! Wire messages accepted at the ingestion boundary.
//!
//! Each message carries at most one payload, selected by its `type` tag.
//! Tags this service does not know deserialize to `Unknown` instead of
//! failing, so newer producers can talk to older collectors.

use crate::event::{ActionType, ConditionOperation, ConditionType, DeviceType};
use serde::{Deserialize, Serialize};

/// Seconds + nanoseconds since the Unix epoch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestampMessage {
    pub seconds: Option<i64>,
    pub nanos: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorEventMessage {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub hub_id: String,

    pub timestamp: Option<TimestampMessage>,

    #[serde(default)]
    pub payload: Option<SensorPayloadMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorPayloadMessage {
    MotionSensor(MotionSensorMessage),
    TemperatureSensor(TemperatureSensorMessage),
    LightSensor(LightSensorMessage),
    ClimateSensor(ClimateSensorMessage),
    SwitchSensor(SwitchSensorMessage),
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionSensorMessage {
    pub link_quality: i32,
    pub motion: bool,
    pub voltage: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureSensorMessage {
    pub temperature_c: i32,
    pub temperature_f: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightSensorMessage {
    pub link_quality: i32,
    pub luminosity: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimateSensorMessage {
    pub temperature_c: i32,
    pub humidity: i32,
    pub co2_level: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchSensorMessage {
    pub state: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubEventMessage {
    #[serde(default)]
    pub hub_id: String,

    pub timestamp: Option<TimestampMessage>,

    #[serde(default)]
    pub payload: Option<HubPayloadMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HubPayloadMessage {
    DeviceAdded(DeviceAddedMessage),
    DeviceRemoved(DeviceRemovedMessage),
    ScenarioAdded(ScenarioAddedMessage),
    ScenarioRemoved(ScenarioRemovedMessage),
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAddedMessage {
    pub id: String,
    pub device_type: DeviceType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceRemovedMessage {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAddedMessage {
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<ScenarioConditionMessage>,
    #[serde(default)]
    pub actions: Vec<DeviceActionMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRemovedMessage {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConditionMessage {
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub operation: ConditionOperation,
    #[serde(default)]
    pub value: Option<ConditionValue>,
}

/// Condition operand; switch and motion conditions compare against booleans.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Int(i32),
    Bool(bool),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceActionMessage {
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub value: Option<i32>,
}
