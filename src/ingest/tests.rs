use super::mapper::map_timestamp;
use super::*;
use crate::event::{
    ActionType, ConditionOperation, ConditionType, DeviceType, HubPayload, MotionSensor,
    SensorPayload,
};
use chrono::{TimeZone, Utc};
use serde_json::json;

fn sensor_message(value: serde_json::Value) -> SensorEventMessage {
    serde_json::from_value(value).expect("valid sensor message")
}

fn hub_message(value: serde_json::Value) -> HubEventMessage {
    serde_json::from_value(value).expect("valid hub message")
}

#[test]
fn test_motion_event_maps_all_fields() {
    let message = sensor_message(json!({
        "id": "S1",
        "hubId": "H1",
        "timestamp": {"seconds": 100, "nanos": 5_000},
        "payload": {"type": "MOTION_SENSOR", "linkQuality": 80, "motion": true, "voltage": 3000}
    }));

    let event = map_sensor_event(&message).unwrap();

    assert_eq!(event.id, "S1");
    assert_eq!(event.hub_id, "H1");
    assert_eq!(event.timestamp, Utc.timestamp_opt(100, 5_000).unwrap());
    assert_eq!(
        event.payload,
        Some(SensorPayload::Motion(MotionSensor {
            link_quality: 80,
            motion: true,
            voltage: 3000,
        }))
    );
}

#[test]
fn test_each_sensor_kind_dispatches_to_its_variant() {
    let cases = [
        (
            json!({"type": "TEMPERATURE_SENSOR", "temperatureC": 21, "temperatureF": 70}),
            "Temperature",
        ),
        (
            json!({"type": "LIGHT_SENSOR", "linkQuality": 50, "luminosity": 300}),
            "Light",
        ),
        (
            json!({"type": "CLIMATE_SENSOR", "temperatureC": 22, "humidity": 45, "co2Level": 600}),
            "Climate",
        ),
        (json!({"type": "SWITCH_SENSOR", "state": true}), "Switch"),
    ];

    for (payload, expected) in cases {
        let message = sensor_message(json!({
            "id": "S1",
            "hubId": "H1",
            "timestamp": {"seconds": 1, "nanos": 0},
            "payload": payload
        }));
        let event = map_sensor_event(&message).unwrap();
        let kind = match event.payload {
            Some(SensorPayload::Temperature(_)) => "Temperature",
            Some(SensorPayload::Light(_)) => "Light",
            Some(SensorPayload::Climate(_)) => "Climate",
            Some(SensorPayload::Switch(_)) => "Switch",
            other => panic!("unexpected payload {:?}", other),
        };
        assert_eq!(kind, expected);
    }
}

#[test]
fn test_unknown_payload_tag_maps_to_valueless_event() {
    let message = sensor_message(json!({
        "id": "S1",
        "hubId": "H1",
        "timestamp": {"seconds": 1, "nanos": 0},
        "payload": {"type": "PRESSURE_SENSOR", "pascal": 101325}
    }));

    let event = map_sensor_event(&message).unwrap();
    assert!(event.payload.is_none());
}

#[test]
fn test_absent_payload_maps_to_valueless_event() {
    let message = sensor_message(json!({
        "id": "S1",
        "hubId": "H1",
        "timestamp": {"seconds": 1, "nanos": 0}
    }));

    let event = map_sensor_event(&message).unwrap();
    assert!(event.payload.is_none());
}

#[test]
fn test_missing_timestamp_fails() {
    let message = sensor_message(json!({"id": "S1", "hubId": "H1"}));
    assert_eq!(
        map_sensor_event(&message).unwrap_err(),
        MappingError::MissingTimestamp
    );
}

#[test]
fn test_missing_epoch_fields_fail() {
    let no_seconds = TimestampMessage {
        seconds: None,
        nanos: Some(0),
    };
    assert_eq!(
        map_timestamp(Some(&no_seconds)).unwrap_err(),
        MappingError::MissingTimestampField("seconds")
    );

    let no_nanos = TimestampMessage {
        seconds: Some(10),
        nanos: None,
    };
    assert_eq!(
        map_timestamp(Some(&no_nanos)).unwrap_err(),
        MappingError::MissingTimestampField("nanos")
    );
}

#[test]
fn test_out_of_range_nanos_fail() {
    let negative = TimestampMessage {
        seconds: Some(10),
        nanos: Some(-1),
    };
    assert_eq!(
        map_timestamp(Some(&negative)).unwrap_err(),
        MappingError::InvalidTimestamp {
            seconds: 10,
            nanos: -1
        }
    );

    let overflow = TimestampMessage {
        seconds: Some(10),
        nanos: Some(1_000_000_000),
    };
    assert!(map_timestamp(Some(&overflow)).is_err());
}

#[test]
fn test_timestamps_truncate_to_microseconds() {
    let earlier = TimestampMessage {
        seconds: Some(100),
        nanos: Some(123_456_100),
    };
    let later = TimestampMessage {
        seconds: Some(100),
        nanos: Some(123_456_900),
    };

    let earlier = map_timestamp(Some(&earlier)).unwrap();
    let later = map_timestamp(Some(&later)).unwrap();

    assert_eq!(earlier, Utc.timestamp_opt(100, 123_456_000).unwrap());
    assert_eq!(earlier, later);
}

/// A mapped event decodes back with the exact timestamp it was mapped with.
#[test]
fn test_mapped_timestamp_survives_encoding() {
    let message = sensor_message(json!({
        "id": "S1",
        "hubId": "H1",
        "timestamp": {"seconds": 100, "nanos": 987_654_321},
        "payload": {"type": "SWITCH_SENSOR", "state": true}
    }));
    let event = map_sensor_event(&message).unwrap();

    let codec = crate::codec::AvroCodec::new().unwrap();
    let decoded = codec
        .decode_sensor_event(&codec.encode_sensor_event(&event).unwrap())
        .unwrap();

    assert_eq!(decoded.timestamp, event.timestamp);
}

#[test]
fn test_scenario_added_maps_conditions_and_actions() {
    let message = hub_message(json!({
        "hubId": "hubA",
        "timestamp": {"seconds": 200, "nanos": 0},
        "payload": {
            "type": "SCENARIO_ADDED",
            "name": "s1",
            "conditions": [
                {"sensorId": "X", "type": "MOTION", "operation": "EQUALS", "value": true},
                {"sensorId": "Y", "type": "TEMPERATURE", "operation": "GREATER_THAN", "value": 25},
                {"sensorId": "Z", "type": "CO2LEVEL", "operation": "LOWER_THAN"}
            ],
            "actions": [
                {"sensorId": "L", "type": "SET_VALUE", "value": 70},
                {"sensorId": "M", "type": "DEACTIVATE"}
            ]
        }
    }));

    let event = map_hub_event(&message).unwrap();
    let Some(HubPayload::ScenarioAdded(scenario)) = event.payload else {
        panic!("expected ScenarioAdded payload");
    };

    assert_eq!(scenario.name, "s1");
    assert_eq!(scenario.conditions.len(), 3);
    assert_eq!(scenario.conditions[0].value, Some(1));
    assert_eq!(scenario.conditions[1].condition_type, ConditionType::Temperature);
    assert_eq!(scenario.conditions[1].operation, ConditionOperation::GreaterThan);
    assert_eq!(scenario.conditions[1].value, Some(25));
    assert_eq!(scenario.conditions[2].value, None);
    assert_eq!(scenario.actions[0].action_type, ActionType::SetValue);
    assert_eq!(scenario.actions[0].value, Some(70));
    assert_eq!(scenario.actions[1].value, None);
}

#[test]
fn test_device_events_map() {
    let added = map_hub_event(&hub_message(json!({
        "hubId": "H1",
        "timestamp": {"seconds": 1, "nanos": 0},
        "payload": {"type": "DEVICE_ADDED", "id": "S1", "deviceType": "SWITCH_SENSOR"}
    })))
    .unwrap();
    match added.payload {
        Some(HubPayload::DeviceAdded(d)) => {
            assert_eq!(d.id, "S1");
            assert_eq!(d.device_type, DeviceType::SwitchSensor);
        }
        other => panic!("unexpected payload {:?}", other),
    }

    let removed = map_hub_event(&hub_message(json!({
        "hubId": "H1",
        "timestamp": {"seconds": 2, "nanos": 0},
        "payload": {"type": "DEVICE_REMOVED", "id": "S1"}
    })))
    .unwrap();
    assert!(matches!(removed.payload, Some(HubPayload::DeviceRemoved(ref d)) if d.id == "S1"));
}

#[test]
fn test_unknown_hub_payload_is_valueless() {
    let event = map_hub_event(&hub_message(json!({
        "hubId": "H1",
        "timestamp": {"seconds": 1, "nanos": 0},
        "payload": {"type": "HUB_REBOOTED"}
    })))
    .unwrap();
    assert!(event.payload.is_none());
}
