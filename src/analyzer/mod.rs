// Hub Event Dispatcher: routes hub lifecycle events to registry handlers

use crate::event::{HubEventType, UnknownSymbol};
use thiserror::Error;

mod dispatcher;
mod handlers;
mod registry;
mod runner;
#[cfg(test)]
mod tests;

pub use dispatcher::HubEventDispatcher;
pub use handlers::{
    default_handlers, DeviceAddedHandler, DeviceRemovedHandler, HubEventHandler,
    ScenarioAddedHandler, ScenarioRemovedHandler,
};
pub use registry::SqliteHubRegistry;
pub use runner::HubEventLoop;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("registry connection lock poisoned")]
    LockPoisoned,

    #[error("stored value is not a known symbol: {0}")]
    Corrupt(#[from] UnknownSymbol),

    #[error("scenario '{scenario}' on hub '{hub_id}' references unknown sensors: {missing:?}")]
    UnknownSensors {
        hub_id: String,
        scenario: String,
        missing: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler registered for {0}")]
    NoHandler(HubEventType),

    #[error("hub event from hub '{0}' has no payload")]
    MissingPayload(String),

    #[error("handler for {expected} received {received:?}")]
    UnexpectedPayload {
        expected: HubEventType,
        received: Option<HubEventType>,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl DispatchError {
    /// Whether the consumption loop must stop without committing.
    ///
    /// A scenario rejected for referencing unknown sensors is a bad input,
    /// not a broken pipeline: it is logged and the message is consumed.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DispatchError::Registry(RegistryError::UnknownSensors { .. })
        )
    }
}
