//! Avro schemas for the three log topics.
//!
//! Evolution rule: fields may only be added, and only with a default, so
//! readers on either side of a deploy can resolve each other's records.
//!
//! Timestamps are `timestamp-micros`. The mapper truncates incoming
//! timestamps to whole microseconds, so nothing finer ever reaches the log.

/// Sensor payload record definitions, shared by the sensor-event and
/// snapshot schemas. The order here is the union branch order.
macro_rules! sensor_payload_types {
    () => {
        r#"
        {"type": "record", "name": "MotionSensorAvro", "fields": [
            {"name": "link_quality", "type": "int"},
            {"name": "motion", "type": "boolean"},
            {"name": "voltage", "type": "int"}
        ]},
        {"type": "record", "name": "TemperatureSensorAvro", "fields": [
            {"name": "temperature_c", "type": "int"},
            {"name": "temperature_f", "type": "int"}
        ]},
        {"type": "record", "name": "LightSensorAvro", "fields": [
            {"name": "link_quality", "type": "int"},
            {"name": "luminosity", "type": "int"}
        ]},
        {"type": "record", "name": "ClimateSensorAvro", "fields": [
            {"name": "temperature_c", "type": "int"},
            {"name": "humidity", "type": "int"},
            {"name": "co2_level", "type": "int"}
        ]},
        {"type": "record", "name": "SwitchSensorAvro", "fields": [
            {"name": "state", "type": "boolean"}
        ]}
        "#
    };
}

pub const SENSOR_EVENT_SCHEMA: &str = concat!(
    r#"{"type": "record", "name": "SensorEventAvro", "namespace": "telemetry.event.avro", "fields": [
        {"name": "id", "type": "string"},
        {"name": "hub_id", "type": "string"},
        {"name": "timestamp", "type": {"type": "long", "logicalType": "timestamp-micros"}},
        {"name": "payload", "default": null, "type": ["null", "#,
    sensor_payload_types!(),
    r#"]}
    ]}"#
);

pub const SNAPSHOT_SCHEMA: &str = concat!(
    r#"{"type": "record", "name": "SensorsSnapshotAvro", "namespace": "telemetry.event.avro", "fields": [
        {"name": "hub_id", "type": "string"},
        {"name": "timestamp", "type": {"type": "long", "logicalType": "timestamp-micros"}},
        {"name": "sensors_state", "type": {"type": "map", "values": {
            "type": "record", "name": "SensorStateAvro", "fields": [
                {"name": "timestamp", "type": {"type": "long", "logicalType": "timestamp-micros"}},
                {"name": "data", "type": ["#,
    sensor_payload_types!(),
    r#"]}
            ]
        }}}
    ]}"#
);

pub const HUB_EVENT_SCHEMA: &str = r#"{"type": "record", "name": "HubEventAvro", "namespace": "telemetry.event.avro", "fields": [
    {"name": "hub_id", "type": "string"},
    {"name": "timestamp", "type": {"type": "long", "logicalType": "timestamp-micros"}},
    {"name": "payload", "type": [
        {"type": "record", "name": "DeviceAddedEventAvro", "fields": [
            {"name": "id", "type": "string"},
            {"name": "type", "type": {"type": "enum", "name": "DeviceTypeAvro", "symbols": [
                "MOTION_SENSOR", "TEMPERATURE_SENSOR", "LIGHT_SENSOR", "CLIMATE_SENSOR", "SWITCH_SENSOR"
            ]}}
        ]},
        {"type": "record", "name": "DeviceRemovedEventAvro", "fields": [
            {"name": "id", "type": "string"}
        ]},
        {"type": "record", "name": "ScenarioAddedEventAvro", "fields": [
            {"name": "name", "type": "string"},
            {"name": "conditions", "type": {"type": "array", "items": {
                "type": "record", "name": "ScenarioConditionAvro", "fields": [
                    {"name": "sensor_id", "type": "string"},
                    {"name": "type", "type": {"type": "enum", "name": "ConditionTypeAvro", "symbols": [
                        "MOTION", "LUMINOSITY", "SWITCH", "TEMPERATURE", "CO2LEVEL", "HUMIDITY"
                    ]}},
                    {"name": "operation", "type": {"type": "enum", "name": "ConditionOperationAvro", "symbols": [
                        "EQUALS", "GREATER_THAN", "LOWER_THAN"
                    ]}},
                    {"name": "value", "type": ["null", "int"], "default": null}
                ]
            }}},
            {"name": "actions", "type": {"type": "array", "items": {
                "type": "record", "name": "DeviceActionAvro", "fields": [
                    {"name": "sensor_id", "type": "string"},
                    {"name": "type", "type": {"type": "enum", "name": "ActionTypeAvro", "symbols": [
                        "ACTIVATE", "DEACTIVATE", "INVERSE", "SET_VALUE"
                    ]}},
                    {"name": "value", "type": ["null", "int"], "default": null}
                ]
            }}}
        ]},
        {"type": "record", "name": "ScenarioRemovedEventAvro", "fields": [
            {"name": "name", "type": "string"}
        ]}
    ]}
]}"#;
