// Ingestion Mapper: raw wire messages -> canonical events

mod mapper;
pub mod message;
#[cfg(test)]
mod tests;

pub use mapper::{map_hub_event, map_sensor_event};
pub use message::{HubEventMessage, SensorEventMessage, TimestampMessage};

/// Validation failures surfaced to the ingestion caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MappingError {
    #[error("timestamp is required")]
    MissingTimestamp,

    #[error("timestamp field '{0}' is required")]
    MissingTimestampField(&'static str),

    #[error("timestamp out of range: seconds={seconds}, nanos={nanos}")]
    InvalidTimestamp { seconds: i64, nanos: i32 },
}
