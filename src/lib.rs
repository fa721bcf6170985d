// MyEvents - event messaging core for the MyEvents services
//
// Typed event contracts, a reconnecting topic-exchange emitter and listener,
// and the processor each service runs to apply events to its database.

// Re-export core functionality
pub use myevents_contracts as contracts;
pub use myevents_messaging as messaging;
pub use myevents_persistence as persistence;

pub use myevents_contracts::{
    ContractError, ContractRegistry, EVENT_NAME_HEADER, Event, EventBooked, EventContract,
    EventCreated, EventKind, LocationCreated, UserCreated,
};
pub use myevents_messaging::{
    BrokerEventEmitter, BrokerEventListener, ConnectionManager, EventEmitter, EventListener,
    MessagingConfig, MessagingError,
};

// Re-export optional crates
#[cfg(feature = "config")]
pub use myevents_config as config;

#[cfg(feature = "log")]
pub use myevents_log as log;

#[cfg(feature = "service")]
pub use myevents_service as service;

// Prelude for common imports
pub mod prelude {
    pub use myevents_contracts::{Event, EventKind};
    pub use myevents_messaging::prelude::*;
    pub use myevents_persistence::DatabaseHandler;

    #[cfg(feature = "service")]
    pub use myevents_service::{EventProcessor, ServiceKind, ServiceRuntime};
}
