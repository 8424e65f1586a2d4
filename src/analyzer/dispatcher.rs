use super::{DispatchError, HubEventHandler};
use crate::event::{HubEvent, HubEventType};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Routes each hub event to the handler registered for its payload type.
#[derive(Default)]
pub struct HubEventDispatcher {
    handlers: HashMap<HubEventType, Box<dyn HubEventHandler>>,
}

impl HubEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handlers(handlers: impl IntoIterator<Item = Box<dyn HubEventHandler>>) -> Self {
        let mut dispatcher = Self::new();
        for handler in handlers {
            dispatcher.register(handler);
        }
        dispatcher
    }

    /// Registers `handler` under its event type, replacing any previous one.
    pub fn register(&mut self, handler: Box<dyn HubEventHandler>) {
        let event_type = handler.event_type();
        if self.handlers.insert(event_type, handler).is_some() {
            warn!(event_type = %event_type, "Replaced existing hub event handler");
        }
    }

    pub fn handles(&self, event_type: HubEventType) -> bool {
        self.handlers.contains_key(&event_type)
    }

    /// Hands `event` to its handler.
    ///
    /// An event type with no registered handler is an error, never a skip.
    pub fn dispatch(&self, event: &HubEvent) -> Result<(), DispatchError> {
        let event_type = event
            .event_type()
            .ok_or_else(|| DispatchError::MissingPayload(event.hub_id.clone()))?;

        let handler = self
            .handlers
            .get(&event_type)
            .ok_or(DispatchError::NoHandler(event_type))?;

        debug!(hub_id = %event.hub_id, event_type = %event_type, "Dispatching hub event");
        handler.handle(event)
    }
}
