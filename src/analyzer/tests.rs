use super::*;
use crate::codec::AvroCodec;
use crate::config::AnalyzerConfig;
use crate::event::{
    ActionType, ConditionOperation, ConditionType, DeviceAction, DeviceAdded, DeviceRemoved,
    DeviceType, HubEvent, HubPayload, ScenarioAdded, ScenarioCondition, ScenarioRemoved,
};
use crate::log::{EventLog, MemoryLog, StartPosition};
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

fn hub_event(hub_id: &str, payload: HubPayload) -> HubEvent {
    HubEvent {
        hub_id: hub_id.to_string(),
        timestamp: Utc.timestamp_opt(100, 0).unwrap(),
        payload: Some(payload),
    }
}

fn device_added(id: &str) -> HubPayload {
    HubPayload::DeviceAdded(DeviceAdded {
        id: id.to_string(),
        device_type: DeviceType::TemperatureSensor,
    })
}

fn scenario_added(name: &str, sensor_id: &str, threshold: i32) -> HubPayload {
    HubPayload::ScenarioAdded(ScenarioAdded {
        name: name.to_string(),
        conditions: vec![ScenarioCondition {
            sensor_id: sensor_id.to_string(),
            condition_type: ConditionType::Temperature,
            operation: ConditionOperation::LowerThan,
            value: Some(threshold),
        }],
        actions: vec![DeviceAction {
            sensor_id: sensor_id.to_string(),
            action_type: ActionType::SetValue,
            value: Some(21),
        }],
    })
}

fn registry_dispatcher() -> (Arc<SqliteHubRegistry>, HubEventDispatcher) {
    let registry = Arc::new(SqliteHubRegistry::in_memory().unwrap());
    let dispatcher = HubEventDispatcher::with_handlers(default_handlers(registry.clone()));
    (registry, dispatcher)
}

struct RecordingHandler {
    event_type: HubEventType,
    seen: Arc<Mutex<Vec<String>>>,
}

impl HubEventHandler for RecordingHandler {
    fn event_type(&self) -> HubEventType {
        self.event_type
    }

    fn handle(&self, event: &HubEvent) -> Result<(), DispatchError> {
        self.seen.lock().unwrap().push(event.hub_id.clone());
        Ok(())
    }
}

#[test]
fn test_dispatch_routes_by_payload_type() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = HubEventDispatcher::new();
    dispatcher.register(Box::new(RecordingHandler {
        event_type: HubEventType::DeviceRemoved,
        seen: seen.clone(),
    }));

    dispatcher
        .dispatch(&hub_event(
            "H1",
            HubPayload::DeviceRemoved(DeviceRemoved {
                id: "S1".to_string(),
            }),
        ))
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["H1".to_string()]);
    assert!(dispatcher.handles(HubEventType::DeviceRemoved));
    assert!(!dispatcher.handles(HubEventType::DeviceAdded));
}

#[test]
fn test_missing_handler_is_fatal() {
    let dispatcher = HubEventDispatcher::new();

    let err = dispatcher
        .dispatch(&hub_event("H1", device_added("S1")))
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::NoHandler(HubEventType::DeviceAdded)
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_valueless_hub_event_is_an_error() {
    let (_, dispatcher) = registry_dispatcher();
    let event = HubEvent {
        payload: None,
        ..hub_event("H1", device_added("S1"))
    };

    assert!(matches!(
        dispatcher.dispatch(&event),
        Err(DispatchError::MissingPayload(hub)) if hub == "H1"
    ));
}

#[test]
fn test_later_registration_replaces_handler() {
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = HubEventDispatcher::new();
    for seen in [&first, &second] {
        dispatcher.register(Box::new(RecordingHandler {
            event_type: HubEventType::DeviceAdded,
            seen: seen.clone(),
        }));
    }

    dispatcher
        .dispatch(&hub_event("H1", device_added("S1")))
        .unwrap();
    assert!(first.lock().unwrap().is_empty());
    assert_eq!(second.lock().unwrap().len(), 1);
}

#[test]
fn test_handler_refuses_foreign_payload() {
    let registry = Arc::new(SqliteHubRegistry::in_memory().unwrap());
    let handler = DeviceRemovedHandler::new(registry);

    let err = handler
        .handle(&hub_event("H1", device_added("S1")))
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::UnexpectedPayload {
            expected: HubEventType::DeviceRemoved,
            received: Some(HubEventType::DeviceAdded),
        }
    ));
}

#[test]
fn test_scenario_replace_on_conflict() {
    let (registry, dispatcher) = registry_dispatcher();
    dispatcher
        .dispatch(&hub_event("hubA", device_added("X")))
        .unwrap();

    dispatcher
        .dispatch(&hub_event("hubA", scenario_added("s1", "X", 18)))
        .unwrap();
    dispatcher
        .dispatch(&hub_event("hubA", scenario_added("s1", "X", 25)))
        .unwrap();

    let stored = registry.scenarios_for_hub("hubA").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "s1");
    assert_eq!(stored[0].conditions[0].value, Some(25));
}

#[test]
fn test_scenario_with_unknown_sensor_is_rejected() {
    let (registry, dispatcher) = registry_dispatcher();
    dispatcher
        .dispatch(&hub_event("hubA", device_added("X")))
        .unwrap();

    let err = dispatcher
        .dispatch(&hub_event("hubA", scenario_added("s1", "ghost", 18)))
        .unwrap_err();

    assert!(!err.is_fatal());
    assert!(registry.scenario("hubA", "s1").unwrap().is_none());
    assert!(registry.scenarios_for_hub("hubA").unwrap().is_empty());
}

#[test]
fn test_device_removal_is_idempotent() {
    let (registry, dispatcher) = registry_dispatcher();
    let removal = hub_event(
        "H",
        HubPayload::DeviceRemoved(DeviceRemoved {
            id: "X".to_string(),
        }),
    );
    dispatcher.dispatch(&hub_event("H", device_added("X"))).unwrap();

    dispatcher.dispatch(&removal).unwrap();
    dispatcher.dispatch(&removal).unwrap();
    assert!(!registry.device_exists("H", "X").unwrap());
}

#[test]
fn test_removing_absent_scenario_is_noop() {
    let (_, dispatcher) = registry_dispatcher();

    dispatcher
        .dispatch(&hub_event(
            "H",
            HubPayload::ScenarioRemoved(ScenarioRemoved {
                name: "never-added".to_string(),
            }),
        ))
        .unwrap();
}

#[test]
fn test_device_removal_then_scenario_add_is_rejected() {
    let (registry, dispatcher) = registry_dispatcher();
    dispatcher.dispatch(&hub_event("H", device_added("X"))).unwrap();
    dispatcher
        .dispatch(&hub_event(
            "H",
            HubPayload::DeviceRemoved(DeviceRemoved {
                id: "X".to_string(),
            }),
        ))
        .unwrap();

    assert!(dispatcher
        .dispatch(&hub_event("H", scenario_added("s1", "X", 1)))
        .is_err());
    assert!(registry.scenario("H", "s1").unwrap().is_none());
}

const HUBS: &str = "telemetry.hubs.v1";

fn loop_config() -> AnalyzerConfig {
    AnalyzerConfig {
        batch_size: 10,
        poll_timeout_ms: 20,
        ..AnalyzerConfig::default()
    }
}

async fn append(log: &MemoryLog, event: &HubEvent) {
    let codec = AvroCodec::new().unwrap();
    log.append(HUBS, &event.hub_id, codec.encode_hub_event(event).unwrap())
        .await
        .unwrap();
}

async fn run_loop(
    log: &MemoryLog,
    dispatcher: HubEventDispatcher,
) -> anyhow::Result<()> {
    let consumer = log
        .subscribe(HUBS, "analyzer", StartPosition::Committed)
        .await
        .unwrap();
    let runner = HubEventLoop::new(
        consumer,
        Arc::new(AvroCodec::new().unwrap()),
        dispatcher,
        &loop_config(),
    );

    let (stop, shutdown) = watch::channel(false);
    let handle = tokio::spawn(runner.run(shutdown));
    tokio::time::sleep(Duration::from_millis(150)).await;
    let _ = stop.send(true);
    handle.await.unwrap()
}

#[tokio::test]
async fn test_loop_applies_events_and_consumes_rejections() {
    let log = MemoryLog::new();
    append(&log, &hub_event("H", device_added("X"))).await;
    append(&log, &hub_event("H", scenario_added("bad", "ghost", 1))).await;
    append(&log, &hub_event("H", scenario_added("good", "X", 1))).await;

    let (registry, dispatcher) = registry_dispatcher();
    run_loop(&log, dispatcher).await.unwrap();

    assert!(registry.scenario("H", "good").unwrap().is_some());
    assert!(registry.scenario("H", "bad").unwrap().is_none());
    assert_eq!(log.committed("analyzer", HUBS).await, 3);
}

#[tokio::test]
async fn test_loop_stops_without_commit_on_missing_handler() {
    let log = MemoryLog::new();
    append(&log, &hub_event("H", device_added("X"))).await;

    let result = run_loop(&log, HubEventDispatcher::new()).await;

    assert!(result.is_err());
    assert_eq!(log.committed("analyzer", HUBS).await, 0);
}

#[tokio::test]
async fn test_loop_stops_on_undecodable_record() {
    let log = MemoryLog::new();
    log.append(HUBS, "H", b"garbage".to_vec()).await.unwrap();

    let (_, dispatcher) = registry_dispatcher();
    assert!(run_loop(&log, dispatcher).await.is_err());
    assert_eq!(log.committed("analyzer", HUBS).await, 0);
}
