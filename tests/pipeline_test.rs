// End-to-end tests: ingestion API -> in-memory log -> consumption loops

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use telemetry::aggregator::AggregationLoop;
use telemetry::analyzer::{default_handlers, HubEventDispatcher, HubEventLoop, SqliteHubRegistry};
use telemetry::api::{create_router, AppState};
use telemetry::codec::AvroCodec;
use telemetry::config::{AggregatorConfig, AnalyzerConfig};
use telemetry::event::{HubSnapshot, MotionSensor, SensorPayload, SensorState};
use telemetry::log::{EventLog, EventPublisher, MemoryLog, StartPosition, TopicsConfig};
use telemetry::supervisor::LoopSupervisor;
use tokio::sync::watch;
use tower::ServiceExt;

struct Pipeline {
    log: MemoryLog,
    codec: Arc<AvroCodec>,
    publisher: EventPublisher,
    topics: TopicsConfig,
}

impl Pipeline {
    fn new() -> Self {
        let log = MemoryLog::new();
        let codec = Arc::new(AvroCodec::new().unwrap());
        let topics = TopicsConfig::default();
        let publisher = EventPublisher::new(Arc::new(log.clone()), codec.clone(), topics.clone());
        Self {
            log,
            codec,
            publisher,
            topics,
        }
    }

    fn app(&self) -> Router {
        create_router(AppState {
            event_publisher: self.publisher.clone(),
        })
    }

    async fn post(&self, uri: &str, body: serde_json::Value) {
        let response = self
            .app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn run_aggregator(&self) {
        let config = AggregatorConfig {
            poll_timeout_ms: 20,
            ..AggregatorConfig::default()
        };
        let consumer = self
            .log
            .subscribe(&self.topics.sensors, &config.consumer_name, StartPosition::Beginning)
            .await
            .unwrap();
        let runner = AggregationLoop::new(
            consumer,
            self.codec.clone(),
            self.publisher.clone(),
            &config,
        );
        run_briefly(|shutdown| runner.run(shutdown)).await.unwrap();
    }

    async fn analyzer(&self, registry: Arc<SqliteHubRegistry>) -> HubEventLoop {
        let config = AnalyzerConfig {
            poll_timeout_ms: 20,
            ..AnalyzerConfig::default()
        };
        let consumer = self
            .log
            .subscribe(&self.topics.hubs, &config.consumer_name, StartPosition::Committed)
            .await
            .unwrap();
        HubEventLoop::new(
            consumer,
            self.codec.clone(),
            HubEventDispatcher::with_handlers(default_handlers(registry)),
            &config,
        )
    }

    async fn run_analyzer(&self, registry: Arc<SqliteHubRegistry>) {
        let runner = self.analyzer(registry).await;
        run_briefly(|shutdown| runner.run(shutdown)).await.unwrap();
    }

    async fn snapshots(&self) -> Vec<HubSnapshot> {
        self.log
            .records(&self.topics.snapshots)
            .await
            .iter()
            .map(|r| self.codec.decode_snapshot(&r.payload).unwrap())
            .collect()
    }
}

/// Runs a loop for a short while, then signals stop and waits for it.
async fn run_briefly<F, Fut>(start: F) -> anyhow::Result<()>
where
    F: FnOnce(watch::Receiver<bool>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (stop, shutdown) = watch::channel(false);
    let handle = tokio::spawn(start(shutdown));
    tokio::time::sleep(Duration::from_millis(150)).await;
    let _ = stop.send(true);
    handle.await.unwrap()
}

fn motion_reading(seconds: i64) -> serde_json::Value {
    serde_json::json!({
        "id": "S1",
        "hubId": "H1",
        "timestamp": {"seconds": seconds, "nanos": 0},
        "payload": {"type": "MOTION_SENSOR", "linkQuality": 80, "motion": true, "voltage": 3000}
    })
}

fn motion_state(seconds: i64) -> SensorState {
    SensorState {
        timestamp: chrono::DateTime::from_timestamp(seconds, 0).unwrap(),
        data: SensorPayload::Motion(MotionSensor {
            link_quality: 80,
            motion: true,
            voltage: 3000,
        }),
    }
}

/// The same reading ingested twice yields exactly one snapshot.
#[tokio::test]
async fn test_duplicate_reading_emits_single_snapshot() {
    let pipeline = Pipeline::new();

    pipeline.post("/api/events/sensors", motion_reading(100)).await;
    pipeline.run_aggregator().await;

    let snapshots = pipeline.snapshots().await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].hub_id, "H1");
    assert_eq!(snapshots[0].sensor("S1"), Some(&motion_state(100)));

    // Redelivery of the identical event after a restart
    pipeline.post("/api/events/sensors", motion_reading(100)).await;
    pipeline.run_aggregator().await;

    assert_eq!(pipeline.snapshots().await.len(), 1);
}

/// Snapshots are keyed by hub on the snapshot log.
#[tokio::test]
async fn test_snapshots_are_partitioned_by_hub() {
    let pipeline = Pipeline::new();

    pipeline.post("/api/events/sensors", motion_reading(100)).await;
    let mut other_hub = motion_reading(100);
    other_hub["hubId"] = serde_json::json!("H2");
    pipeline.post("/api/events/sensors", other_hub).await;
    pipeline.run_aggregator().await;

    let keys: Vec<_> = pipeline
        .log
        .records(&pipeline.topics.snapshots)
        .await
        .into_iter()
        .map(|r| r.key)
        .collect();
    assert_eq!(keys, vec!["H1".to_string(), "H2".to_string()]);
}

/// Device and scenario lifecycle events end up in the registry in order.
#[tokio::test]
async fn test_hub_events_maintain_registry() {
    let pipeline = Pipeline::new();
    let registry = Arc::new(SqliteHubRegistry::in_memory().unwrap());

    let hub_event = |payload: serde_json::Value| {
        serde_json::json!({
            "hubId": "hubA",
            "timestamp": {"seconds": 100, "nanos": 0},
            "payload": payload
        })
    };

    pipeline
        .post(
            "/api/events/hubs",
            hub_event(serde_json::json!({"type": "DEVICE_ADDED", "id": "X", "deviceType": "CLIMATE_SENSOR"})),
        )
        .await;
    pipeline
        .post(
            "/api/events/hubs",
            hub_event(serde_json::json!({
                "type": "SCENARIO_ADDED",
                "name": "s1",
                "conditions": [{"sensorId": "X", "type": "CO2LEVEL", "operation": "GREATER_THAN", "value": 900}],
                "actions": [{"sensorId": "X", "type": "DEACTIVATE"}]
            })),
        )
        .await;
    pipeline
        .post(
            "/api/events/hubs",
            hub_event(serde_json::json!({
                "type": "SCENARIO_ADDED",
                "name": "s1",
                "conditions": [{"sensorId": "X", "type": "HUMIDITY", "operation": "LOWER_THAN", "value": 30}],
                "actions": []
            })),
        )
        .await;
    pipeline
        .post(
            "/api/events/hubs",
            hub_event(serde_json::json!({
                "type": "SCENARIO_ADDED",
                "name": "s2",
                "conditions": [{"sensorId": "ghost", "type": "MOTION", "operation": "EQUALS", "value": true}],
                "actions": []
            })),
        )
        .await;

    pipeline.run_analyzer(registry.clone()).await;

    let scenarios = registry.scenarios_for_hub("hubA").unwrap();
    assert_eq!(scenarios.len(), 1);
    assert_eq!(scenarios[0].name, "s1");
    assert_eq!(scenarios[0].conditions.len(), 1);
    assert_eq!(scenarios[0].conditions[0].value, Some(30));
    assert!(scenarios[0].actions.is_empty());
    assert_eq!(
        pipeline
            .log
            .committed("hub-event-analyzer", &pipeline.topics.hubs)
            .await,
        4
    );
}

/// A hub record the analyzer cannot decode takes the whole pipeline down
/// instead of leaving ingestion running with no consumer.
#[tokio::test]
async fn test_dead_analyzer_stops_the_pipeline() {
    let pipeline = Pipeline::new();
    let registry = Arc::new(SqliteHubRegistry::in_memory().unwrap());
    pipeline
        .log
        .append(&pipeline.topics.hubs, "hubA", b"not avro".to_vec())
        .await
        .unwrap();

    let mut supervisor = LoopSupervisor::new();
    let collector_stop = supervisor.shutdown_signal();
    let analyzer = pipeline.analyzer(registry).await;
    supervisor.spawn("analyzer", analyzer.run(supervisor.shutdown_signal()));

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        supervisor.run_until(std::future::pending()),
    )
    .await
    .expect("pipeline kept running after the analyzer died");

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("analyzer loop failed"));
    assert!(*collector_stop.borrow());
    assert_eq!(
        pipeline
            .log
            .committed("hub-event-analyzer", &pipeline.topics.hubs)
            .await,
        0
    );
}
