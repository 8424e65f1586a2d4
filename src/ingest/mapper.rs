use super::message::*;
use super::MappingError;
use crate::event::{
    ClimateSensor, DeviceAction, DeviceAdded, DeviceRemoved, HubEvent, HubPayload, LightSensor,
    MotionSensor, ScenarioAdded, ScenarioCondition, ScenarioRemoved, SensorEvent, SensorPayload,
    SwitchSensor, TemperatureSensor,
};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Maps a raw sensor message onto the canonical model.
///
/// The payload is dispatched on its kind tag. An absent or unrecognized
/// payload yields an event with `payload: None`; only a malformed timestamp
/// fails the call.
pub fn map_sensor_event(message: &SensorEventMessage) -> Result<SensorEvent, MappingError> {
    let timestamp = map_timestamp(message.timestamp.as_ref())?;

    let payload = match &message.payload {
        Some(SensorPayloadMessage::MotionSensor(m)) => Some(map_motion(m)),
        Some(SensorPayloadMessage::TemperatureSensor(m)) => Some(map_temperature(m)),
        Some(SensorPayloadMessage::LightSensor(m)) => Some(map_light(m)),
        Some(SensorPayloadMessage::ClimateSensor(m)) => Some(map_climate(m)),
        Some(SensorPayloadMessage::SwitchSensor(m)) => Some(map_switch(m)),
        Some(SensorPayloadMessage::Unknown) | None => {
            debug!(
                hub_id = %message.hub_id,
                sensor_id = %message.id,
                "Sensor event without a recognized payload"
            );
            None
        }
    };

    Ok(SensorEvent {
        id: message.id.clone(),
        hub_id: message.hub_id.clone(),
        timestamp,
        payload,
    })
}

/// Maps a raw hub lifecycle message onto the canonical model.
pub fn map_hub_event(message: &HubEventMessage) -> Result<HubEvent, MappingError> {
    let timestamp = map_timestamp(message.timestamp.as_ref())?;

    let payload = match &message.payload {
        Some(HubPayloadMessage::DeviceAdded(m)) => Some(HubPayload::DeviceAdded(DeviceAdded {
            id: m.id.clone(),
            device_type: m.device_type,
        })),
        Some(HubPayloadMessage::DeviceRemoved(m)) => {
            Some(HubPayload::DeviceRemoved(DeviceRemoved { id: m.id.clone() }))
        }
        Some(HubPayloadMessage::ScenarioAdded(m)) => Some(map_scenario_added(m)),
        Some(HubPayloadMessage::ScenarioRemoved(m)) => {
            Some(HubPayload::ScenarioRemoved(ScenarioRemoved {
                name: m.name.clone(),
            }))
        }
        Some(HubPayloadMessage::Unknown) | None => None,
    };

    Ok(HubEvent {
        hub_id: message.hub_id.clone(),
        timestamp,
        payload,
    })
}

/// Both epoch fields must be present; nanos must lie in `0..1_000_000_000`.
///
/// Sub-microsecond digits are dropped: the log stores `timestamp-micros`,
/// and ordering decisions must agree before and after a round trip.
pub(crate) fn map_timestamp(
    timestamp: Option<&TimestampMessage>,
) -> Result<DateTime<Utc>, MappingError> {
    let timestamp = timestamp.ok_or(MappingError::MissingTimestamp)?;
    let seconds = timestamp
        .seconds
        .ok_or(MappingError::MissingTimestampField("seconds"))?;
    let nanos = timestamp
        .nanos
        .ok_or(MappingError::MissingTimestampField("nanos"))?;

    u32::try_from(nanos)
        .ok()
        .filter(|n| *n < 1_000_000_000)
        .and_then(|n| DateTime::from_timestamp(seconds, n - n % 1_000))
        .ok_or(MappingError::InvalidTimestamp { seconds, nanos })
}

fn map_motion(m: &MotionSensorMessage) -> SensorPayload {
    SensorPayload::Motion(MotionSensor {
        link_quality: m.link_quality,
        motion: m.motion,
        voltage: m.voltage,
    })
}

fn map_temperature(m: &TemperatureSensorMessage) -> SensorPayload {
    SensorPayload::Temperature(TemperatureSensor {
        temperature_c: m.temperature_c,
        temperature_f: m.temperature_f,
    })
}

fn map_light(m: &LightSensorMessage) -> SensorPayload {
    SensorPayload::Light(LightSensor {
        link_quality: m.link_quality,
        luminosity: m.luminosity,
    })
}

fn map_climate(m: &ClimateSensorMessage) -> SensorPayload {
    SensorPayload::Climate(ClimateSensor {
        temperature_c: m.temperature_c,
        humidity: m.humidity,
        co2_level: m.co2_level,
    })
}

fn map_switch(m: &SwitchSensorMessage) -> SensorPayload {
    SensorPayload::Switch(SwitchSensor { state: m.state })
}

fn map_scenario_added(m: &ScenarioAddedMessage) -> HubPayload {
    let conditions = m
        .conditions
        .iter()
        .map(|c| ScenarioCondition {
            sensor_id: c.sensor_id.clone(),
            condition_type: c.condition_type,
            operation: c.operation,
            value: c.value.map(condition_value),
        })
        .collect();

    let actions = m
        .actions
        .iter()
        .map(|a| DeviceAction {
            sensor_id: a.sensor_id.clone(),
            action_type: a.action_type,
            value: a.value,
        })
        .collect();

    HubPayload::ScenarioAdded(ScenarioAdded {
        name: m.name.clone(),
        conditions,
        actions,
    })
}

fn condition_value(value: ConditionValue) -> i32 {
    match value {
        ConditionValue::Int(v) => v,
        ConditionValue::Bool(b) => i32::from(b),
    }
}
