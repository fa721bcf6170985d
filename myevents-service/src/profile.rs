//! Queue and bindings of each MyEvents service

use clap::ValueEnum;
use myevents_contracts::{EventBooked, EventContract, EventCreated, UserCreated};

/// The services that consume from the shared exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceKind {
    Events,
    Bookings,
    Users,
}

const EVENTS_BINDINGS: &[&str] = &[EventCreated::NAME, UserCreated::NAME];
const BOOKINGS_BINDINGS: &[&str] = &[EventCreated::NAME, EventBooked::NAME];
const USERS_BINDINGS: &[&str] = &[EventCreated::NAME, UserCreated::NAME, EventBooked::NAME];

impl ServiceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Events => "events",
            ServiceKind::Bookings => "bookings",
            ServiceKind::Users => "users",
        }
    }

    /// Durable queue owned by the service
    pub fn queue(&self) -> &'static str {
        self.name()
    }

    /// Event names the queue is bound to
    pub fn bindings(&self) -> &'static [&'static str] {
        match self {
            ServiceKind::Events => EVENTS_BINDINGS,
            ServiceKind::Bookings => BOOKINGS_BINDINGS,
            ServiceKind::Users => USERS_BINDINGS,
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
