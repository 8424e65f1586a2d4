//! Binary encoding of log records.
//!
//! Every record is an Avro object container holding a single datum, so the
//! writer schema travels with the bytes and readers resolve it against their
//! own schema.

use crate::event::{
    ActionType, ClimateSensor, ConditionOperation, ConditionType, DeviceAction, DeviceAdded,
    DeviceRemoved, DeviceType, HubEvent, HubPayload, HubSnapshot, LightSensor, MotionSensor,
    ScenarioAdded, ScenarioCondition, ScenarioRemoved, SensorEvent, SensorPayload, SensorState,
    SwitchSensor, TemperatureSensor, UnknownSymbol,
};
use apache_avro::types::Value;
use apache_avro::{Codec, Reader, Schema, Writer};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;

pub mod schema;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("avro error: {0}")]
    Avro(#[from] apache_avro::Error),

    #[error("record contains no datum")]
    Empty,

    #[error("field '{0}' missing from record")]
    MissingField(&'static str),

    #[error("field '{field}' has unexpected shape, expected {expected}")]
    UnexpectedValue {
        field: &'static str,
        expected: &'static str,
    },

    #[error(transparent)]
    UnknownSymbol(#[from] UnknownSymbol),

    #[error("hub event for '{0}' has no payload")]
    MissingPayload(String),

    #[error("timestamp out of range: {0} micros")]
    TimestampOutOfRange(i64),
}

/// Parsed schemas for every topic, built once per process.
pub struct AvroCodec {
    sensor_event: Schema,
    hub_event: Schema,
    snapshot: Schema,
}

impl AvroCodec {
    pub fn new() -> Result<Self, CodecError> {
        Ok(Self {
            sensor_event: Schema::parse_str(schema::SENSOR_EVENT_SCHEMA)?,
            hub_event: Schema::parse_str(schema::HUB_EVENT_SCHEMA)?,
            snapshot: Schema::parse_str(schema::SNAPSHOT_SCHEMA)?,
        })
    }

    pub fn encode_sensor_event(&self, event: &SensorEvent) -> Result<Vec<u8>, CodecError> {
        let payload = match &event.payload {
            None => Value::Union(0, Box::new(Value::Null)),
            // branch 0 is null, sensor kinds follow
            Some(p) => Value::Union(payload_branch(p) + 1, Box::new(payload_value(p))),
        };
        let value = Value::Record(vec![
            ("id".to_string(), Value::String(event.id.clone())),
            ("hub_id".to_string(), Value::String(event.hub_id.clone())),
            ("timestamp".to_string(), timestamp_value(&event.timestamp)),
            ("payload".to_string(), payload),
        ]);
        write(&self.sensor_event, value)
    }

    pub fn decode_sensor_event(&self, bytes: &[u8]) -> Result<SensorEvent, CodecError> {
        let value = read(&self.sensor_event, bytes)?;
        let fields = Fields::of(&value, "sensor event")?;

        let payload = match fields.get("payload")? {
            Value::Union(_, inner) if matches!(**inner, Value::Null) => None,
            Value::Union(_, inner) => Some(payload_from(inner)?),
            Value::Null => None,
            _ => {
                return Err(CodecError::UnexpectedValue {
                    field: "payload",
                    expected: "union",
                })
            }
        };

        Ok(SensorEvent {
            id: fields.string("id")?,
            hub_id: fields.string("hub_id")?,
            timestamp: fields.timestamp("timestamp")?,
            payload,
        })
    }

    /// Hub events always carry a payload; a valueless event is refused here
    /// rather than written to the log.
    pub fn encode_hub_event(&self, event: &HubEvent) -> Result<Vec<u8>, CodecError> {
        let payload = event
            .payload
            .as_ref()
            .ok_or_else(|| CodecError::MissingPayload(event.hub_id.clone()))?;

        let value = Value::Record(vec![
            ("hub_id".to_string(), Value::String(event.hub_id.clone())),
            ("timestamp".to_string(), timestamp_value(&event.timestamp)),
            ("payload".to_string(), hub_payload_value(payload)),
        ]);
        write(&self.hub_event, value)
    }

    pub fn decode_hub_event(&self, bytes: &[u8]) -> Result<HubEvent, CodecError> {
        let value = read(&self.hub_event, bytes)?;
        let fields = Fields::of(&value, "hub event")?;

        let payload = match fields.get("payload")? {
            Value::Union(branch, inner) => hub_payload_from(*branch, inner)?,
            _ => {
                return Err(CodecError::UnexpectedValue {
                    field: "payload",
                    expected: "union",
                })
            }
        };

        Ok(HubEvent {
            hub_id: fields.string("hub_id")?,
            timestamp: fields.timestamp("timestamp")?,
            payload: Some(payload),
        })
    }

    pub fn encode_snapshot(&self, snapshot: &HubSnapshot) -> Result<Vec<u8>, CodecError> {
        let states = snapshot
            .sensors_state
            .iter()
            .map(|(sensor_id, state)| {
                let data = Value::Union(payload_branch(&state.data), Box::new(payload_value(&state.data)));
                let state = Value::Record(vec![
                    ("timestamp".to_string(), timestamp_value(&state.timestamp)),
                    ("data".to_string(), data),
                ]);
                (sensor_id.clone(), state)
            })
            .collect::<HashMap<_, _>>();

        let value = Value::Record(vec![
            ("hub_id".to_string(), Value::String(snapshot.hub_id.clone())),
            ("timestamp".to_string(), timestamp_value(&snapshot.timestamp)),
            ("sensors_state".to_string(), Value::Map(states)),
        ]);
        write(&self.snapshot, value)
    }

    pub fn decode_snapshot(&self, bytes: &[u8]) -> Result<HubSnapshot, CodecError> {
        let value = read(&self.snapshot, bytes)?;
        let fields = Fields::of(&value, "snapshot")?;

        let states = match fields.get("sensors_state")? {
            Value::Map(states) => states,
            _ => {
                return Err(CodecError::UnexpectedValue {
                    field: "sensors_state",
                    expected: "map",
                })
            }
        };

        let mut sensors_state = HashMap::with_capacity(states.len());
        for (sensor_id, state) in states {
            let state = Fields::of(state, "sensor state")?;
            let data = match state.get("data")? {
                Value::Union(_, inner) => payload_from(inner)?,
                _ => {
                    return Err(CodecError::UnexpectedValue {
                        field: "data",
                        expected: "union",
                    })
                }
            };
            sensors_state.insert(
                sensor_id.clone(),
                SensorState {
                    timestamp: state.timestamp("timestamp")?,
                    data,
                },
            );
        }

        Ok(HubSnapshot {
            hub_id: fields.string("hub_id")?,
            timestamp: fields.timestamp("timestamp")?,
            sensors_state,
        })
    }
}

fn write(schema: &Schema, value: Value) -> Result<Vec<u8>, CodecError> {
    let mut writer = Writer::with_codec(schema, Vec::new(), Codec::Null);
    writer.append(value)?;
    Ok(writer.into_inner()?)
}

/// Reads the first datum, resolved against our own schema.
fn read(schema: &Schema, bytes: &[u8]) -> Result<Value, CodecError> {
    let reader = Reader::with_schema(schema, bytes)?;
    match reader.into_iter().next() {
        Some(value) => Ok(value?),
        None => Err(CodecError::Empty),
    }
}

fn timestamp_value(timestamp: &DateTime<Utc>) -> Value {
    Value::TimestampMicros(timestamp.timestamp_micros())
}

fn payload_branch(payload: &SensorPayload) -> u32 {
    match payload {
        SensorPayload::Motion(_) => 0,
        SensorPayload::Temperature(_) => 1,
        SensorPayload::Light(_) => 2,
        SensorPayload::Climate(_) => 3,
        SensorPayload::Switch(_) => 4,
    }
}

fn payload_value(payload: &SensorPayload) -> Value {
    match payload {
        SensorPayload::Motion(m) => Value::Record(vec![
            ("link_quality".to_string(), Value::Int(m.link_quality)),
            ("motion".to_string(), Value::Boolean(m.motion)),
            ("voltage".to_string(), Value::Int(m.voltage)),
        ]),
        SensorPayload::Temperature(t) => Value::Record(vec![
            ("temperature_c".to_string(), Value::Int(t.temperature_c)),
            ("temperature_f".to_string(), Value::Int(t.temperature_f)),
        ]),
        SensorPayload::Light(l) => Value::Record(vec![
            ("link_quality".to_string(), Value::Int(l.link_quality)),
            ("luminosity".to_string(), Value::Int(l.luminosity)),
        ]),
        SensorPayload::Climate(c) => Value::Record(vec![
            ("temperature_c".to_string(), Value::Int(c.temperature_c)),
            ("humidity".to_string(), Value::Int(c.humidity)),
            ("co2_level".to_string(), Value::Int(c.co2_level)),
        ]),
        SensorPayload::Switch(s) => {
            Value::Record(vec![("state".to_string(), Value::Boolean(s.state))])
        }
    }
}

/// Branches are told apart by field set: no two sensor kinds share a shape.
fn payload_from(value: &Value) -> Result<SensorPayload, CodecError> {
    let fields = Fields::of(value, "sensor payload")?;

    if fields.has("motion") {
        Ok(SensorPayload::Motion(MotionSensor {
            link_quality: fields.int("link_quality")?,
            motion: fields.boolean("motion")?,
            voltage: fields.int("voltage")?,
        }))
    } else if fields.has("temperature_f") {
        Ok(SensorPayload::Temperature(TemperatureSensor {
            temperature_c: fields.int("temperature_c")?,
            temperature_f: fields.int("temperature_f")?,
        }))
    } else if fields.has("luminosity") {
        Ok(SensorPayload::Light(LightSensor {
            link_quality: fields.int("link_quality")?,
            luminosity: fields.int("luminosity")?,
        }))
    } else if fields.has("co2_level") {
        Ok(SensorPayload::Climate(ClimateSensor {
            temperature_c: fields.int("temperature_c")?,
            humidity: fields.int("humidity")?,
            co2_level: fields.int("co2_level")?,
        }))
    } else if fields.has("state") {
        Ok(SensorPayload::Switch(SwitchSensor {
            state: fields.boolean("state")?,
        }))
    } else {
        Err(CodecError::UnexpectedValue {
            field: "payload",
            expected: "sensor record",
        })
    }
}

fn hub_payload_value(payload: &HubPayload) -> Value {
    match payload {
        HubPayload::DeviceAdded(d) => Value::Union(
            0,
            Box::new(Value::Record(vec![
                ("id".to_string(), Value::String(d.id.clone())),
                ("type".to_string(), enum_value(d.device_type.index(), d.device_type.as_str())),
            ])),
        ),
        HubPayload::DeviceRemoved(d) => Value::Union(
            1,
            Box::new(Value::Record(vec![(
                "id".to_string(),
                Value::String(d.id.clone()),
            )])),
        ),
        HubPayload::ScenarioAdded(s) => {
            let conditions = s
                .conditions
                .iter()
                .map(|c| {
                    Value::Record(vec![
                        ("sensor_id".to_string(), Value::String(c.sensor_id.clone())),
                        (
                            "type".to_string(),
                            enum_value(c.condition_type.index(), c.condition_type.as_str()),
                        ),
                        (
                            "operation".to_string(),
                            enum_value(c.operation.index(), c.operation.as_str()),
                        ),
                        ("value".to_string(), optional_int(c.value)),
                    ])
                })
                .collect();
            let actions = s
                .actions
                .iter()
                .map(|a| {
                    Value::Record(vec![
                        ("sensor_id".to_string(), Value::String(a.sensor_id.clone())),
                        (
                            "type".to_string(),
                            enum_value(a.action_type.index(), a.action_type.as_str()),
                        ),
                        ("value".to_string(), optional_int(a.value)),
                    ])
                })
                .collect();
            Value::Union(
                2,
                Box::new(Value::Record(vec![
                    ("name".to_string(), Value::String(s.name.clone())),
                    ("conditions".to_string(), Value::Array(conditions)),
                    ("actions".to_string(), Value::Array(actions)),
                ])),
            )
        }
        HubPayload::ScenarioRemoved(s) => Value::Union(
            3,
            Box::new(Value::Record(vec![(
                "name".to_string(),
                Value::String(s.name.clone()),
            )])),
        ),
    }
}

fn hub_payload_from(branch: u32, value: &Value) -> Result<HubPayload, CodecError> {
    let fields = Fields::of(value, "hub payload")?;
    match branch {
        0 => Ok(HubPayload::DeviceAdded(DeviceAdded {
            id: fields.string("id")?,
            device_type: fields.symbol::<DeviceType>("type")?,
        })),
        1 => Ok(HubPayload::DeviceRemoved(DeviceRemoved {
            id: fields.string("id")?,
        })),
        2 => {
            let conditions = fields
                .array("conditions")?
                .iter()
                .map(|c| {
                    let c = Fields::of(c, "scenario condition")?;
                    Ok(ScenarioCondition {
                        sensor_id: c.string("sensor_id")?,
                        condition_type: c.symbol::<ConditionType>("type")?,
                        operation: c.symbol::<ConditionOperation>("operation")?,
                        value: c.optional_int("value")?,
                    })
                })
                .collect::<Result<Vec<_>, CodecError>>()?;
            let actions = fields
                .array("actions")?
                .iter()
                .map(|a| {
                    let a = Fields::of(a, "device action")?;
                    Ok(DeviceAction {
                        sensor_id: a.string("sensor_id")?,
                        action_type: a.symbol::<ActionType>("type")?,
                        value: a.optional_int("value")?,
                    })
                })
                .collect::<Result<Vec<_>, CodecError>>()?;
            Ok(HubPayload::ScenarioAdded(ScenarioAdded {
                name: fields.string("name")?,
                conditions,
                actions,
            }))
        }
        3 => Ok(HubPayload::ScenarioRemoved(ScenarioRemoved {
            name: fields.string("name")?,
        })),
        _ => Err(CodecError::UnexpectedValue {
            field: "payload",
            expected: "known hub payload branch",
        }),
    }
}

fn enum_value(index: u32, symbol: &str) -> Value {
    Value::Enum(index, symbol.to_string())
}

fn optional_int(value: Option<i32>) -> Value {
    match value {
        Some(v) => Value::Union(1, Box::new(Value::Int(v))),
        None => Value::Union(0, Box::new(Value::Null)),
    }
}

/// Field access over a decoded Avro record.
struct Fields<'a> {
    fields: &'a [(String, Value)],
}

impl<'a> Fields<'a> {
    fn of(value: &'a Value, expected: &'static str) -> Result<Self, CodecError> {
        match value {
            Value::Record(fields) => Ok(Self { fields }),
            _ => Err(CodecError::UnexpectedValue {
                field: expected,
                expected: "record",
            }),
        }
    }

    fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    fn get(&self, name: &'static str) -> Result<&'a Value, CodecError> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or(CodecError::MissingField(name))
    }

    fn string(&self, name: &'static str) -> Result<String, CodecError> {
        match self.get(name)? {
            Value::String(s) => Ok(s.clone()),
            _ => Err(unexpected(name, "string")),
        }
    }

    fn int(&self, name: &'static str) -> Result<i32, CodecError> {
        match self.get(name)? {
            Value::Int(v) => Ok(*v),
            _ => Err(unexpected(name, "int")),
        }
    }

    fn boolean(&self, name: &'static str) -> Result<bool, CodecError> {
        match self.get(name)? {
            Value::Boolean(v) => Ok(*v),
            _ => Err(unexpected(name, "boolean")),
        }
    }

    fn optional_int(&self, name: &'static str) -> Result<Option<i32>, CodecError> {
        match self.get(name)? {
            Value::Union(_, inner) => match **inner {
                Value::Null => Ok(None),
                Value::Int(v) => Ok(Some(v)),
                _ => Err(unexpected(name, "null or int")),
            },
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(*v)),
            _ => Err(unexpected(name, "null or int")),
        }
    }

    fn array(&self, name: &'static str) -> Result<&'a [Value], CodecError> {
        match self.get(name)? {
            Value::Array(items) => Ok(items),
            _ => Err(unexpected(name, "array")),
        }
    }

    fn symbol<T>(&self, name: &'static str) -> Result<T, CodecError>
    where
        T: FromStr<Err = UnknownSymbol>,
    {
        match self.get(name)? {
            Value::Enum(_, symbol) => Ok(symbol.parse::<T>()?),
            _ => Err(unexpected(name, "enum")),
        }
    }

    fn timestamp(&self, name: &'static str) -> Result<DateTime<Utc>, CodecError> {
        let micros = match self.get(name)? {
            Value::TimestampMicros(v) | Value::Long(v) => *v,
            _ => return Err(unexpected(name, "timestamp-micros")),
        };
        let seconds = micros.div_euclid(1_000_000);
        let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
        DateTime::from_timestamp(seconds, nanos).ok_or(CodecError::TimestampOutOfRange(micros))
    }
}

fn unexpected(field: &'static str, expected: &'static str) -> CodecError {
    CodecError::UnexpectedValue { field, expected }
}
