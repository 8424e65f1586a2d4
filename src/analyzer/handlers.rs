use super::{DispatchError, SqliteHubRegistry};
use crate::event::{HubEvent, HubEventType, HubPayload, Scenario};
use std::sync::Arc;
use tracing::{debug, info};

/// Handles one hub event payload type.
pub trait HubEventHandler: Send + Sync {
    /// Payload type this handler is registered under
    fn event_type(&self) -> HubEventType;

    fn handle(&self, event: &HubEvent) -> Result<(), DispatchError>;
}

/// The four registry handlers, sharing one registry.
pub fn default_handlers(registry: Arc<SqliteHubRegistry>) -> Vec<Box<dyn HubEventHandler>> {
    vec![
        Box::new(DeviceAddedHandler::new(registry.clone())),
        Box::new(DeviceRemovedHandler::new(registry.clone())),
        Box::new(ScenarioAddedHandler::new(registry.clone())),
        Box::new(ScenarioRemovedHandler::new(registry)),
    ]
}

fn unexpected(expected: HubEventType, event: &HubEvent) -> DispatchError {
    DispatchError::UnexpectedPayload {
        expected,
        received: event.event_type(),
    }
}

pub struct DeviceAddedHandler {
    registry: Arc<SqliteHubRegistry>,
}

impl DeviceAddedHandler {
    pub fn new(registry: Arc<SqliteHubRegistry>) -> Self {
        Self { registry }
    }
}

impl HubEventHandler for DeviceAddedHandler {
    fn event_type(&self) -> HubEventType {
        HubEventType::DeviceAdded
    }

    fn handle(&self, event: &HubEvent) -> Result<(), DispatchError> {
        let Some(HubPayload::DeviceAdded(added)) = &event.payload else {
            return Err(unexpected(self.event_type(), event));
        };

        self.registry
            .add_device(&event.hub_id, &added.id, added.device_type)?;
        info!(
            hub_id = %event.hub_id,
            sensor_id = %added.id,
            device_type = %added.device_type,
            "Device registered"
        );
        Ok(())
    }
}

pub struct DeviceRemovedHandler {
    registry: Arc<SqliteHubRegistry>,
}

impl DeviceRemovedHandler {
    pub fn new(registry: Arc<SqliteHubRegistry>) -> Self {
        Self { registry }
    }
}

impl HubEventHandler for DeviceRemovedHandler {
    fn event_type(&self) -> HubEventType {
        HubEventType::DeviceRemoved
    }

    fn handle(&self, event: &HubEvent) -> Result<(), DispatchError> {
        let Some(HubPayload::DeviceRemoved(removed)) = &event.payload else {
            return Err(unexpected(self.event_type(), event));
        };

        if self.registry.remove_device(&event.hub_id, &removed.id)? {
            info!(hub_id = %event.hub_id, sensor_id = %removed.id, "Device removed");
        } else {
            debug!(hub_id = %event.hub_id, sensor_id = %removed.id, "Device already absent");
        }
        Ok(())
    }
}

pub struct ScenarioAddedHandler {
    registry: Arc<SqliteHubRegistry>,
}

impl ScenarioAddedHandler {
    pub fn new(registry: Arc<SqliteHubRegistry>) -> Self {
        Self { registry }
    }
}

impl HubEventHandler for ScenarioAddedHandler {
    fn event_type(&self) -> HubEventType {
        HubEventType::ScenarioAdded
    }

    fn handle(&self, event: &HubEvent) -> Result<(), DispatchError> {
        let Some(HubPayload::ScenarioAdded(added)) = &event.payload else {
            return Err(unexpected(self.event_type(), event));
        };

        self.registry
            .add_scenario(&Scenario::from_event(&event.hub_id, added))?;
        info!(
            hub_id = %event.hub_id,
            scenario = %added.name,
            conditions = added.conditions.len(),
            actions = added.actions.len(),
            "Scenario stored"
        );
        Ok(())
    }
}

pub struct ScenarioRemovedHandler {
    registry: Arc<SqliteHubRegistry>,
}

impl ScenarioRemovedHandler {
    pub fn new(registry: Arc<SqliteHubRegistry>) -> Self {
        Self { registry }
    }
}

impl HubEventHandler for ScenarioRemovedHandler {
    fn event_type(&self) -> HubEventType {
        HubEventType::ScenarioRemoved
    }

    fn handle(&self, event: &HubEvent) -> Result<(), DispatchError> {
        let Some(HubPayload::ScenarioRemoved(removed)) = &event.payload else {
            return Err(unexpected(self.event_type(), event));
        };

        if self.registry.remove_scenario(&event.hub_id, &removed.name)? {
            info!(hub_id = %event.hub_id, scenario = %removed.name, "Scenario removed");
        } else {
            debug!(hub_id = %event.hub_id, scenario = %removed.name, "Scenario already absent");
        }
        Ok(())
    }
}
