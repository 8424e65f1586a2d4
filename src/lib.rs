// Canonical event model
pub mod event;

// Wire messages and mapping into the event model
pub mod ingest;

// Avro encoding of log records
pub mod codec;

// Partitioned log (NATS JetStream, in-memory) and event publishing
pub mod log;

// HTTP ingestion API
pub mod api;

// Per-hub snapshot aggregation
pub mod aggregator;

// Hub event dispatch and device/scenario registry
pub mod analyzer;

// Service configuration
pub mod config;

// Lifecycle of the consumption loops
pub mod supervisor;
