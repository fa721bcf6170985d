//! # MyEvents Contracts
//!
//! The typed events that MyEvents services broadcast to each other, and the
//! registry that turns an event name plus a JSON body back into one of them.
//!
//! Producers and consumers never share a type registry at runtime. The only
//! thing that travels is the event name (as routing key and `x-event-name`
//! header) and the JSON payload, so every process that listens for a name must
//! register the same shape under it.
//!
//! ## Example
//!
//! ```rust
//! use myevents_contracts::{ContractRegistry, Event, EventKind, UserCreated};
//!
//! let user = UserCreated {
//!     id: "1".to_string(),
//!     first: "Ann".to_string(),
//!     last: "Lee".to_string(),
//!     age: 30,
//! };
//! let body = serde_json::to_vec(&user).unwrap();
//!
//! let decoded = ContractRegistry::standard()
//!     .decode(user.event_name(), &body)
//!     .unwrap();
//! assert_eq!(decoded, EventKind::UserCreated(user));
//! ```

pub mod contracts;
pub mod error;
pub mod event;
pub mod registry;

pub use contracts::{EventBooked, EventCreated, Hall, LocationCreated, UserCreated};
pub use error::ContractError;
pub use event::{Event, EventContract, EventKind};
pub use registry::ContractRegistry;

/// Header that carries the event name next to the JSON body.
pub const EVENT_NAME_HEADER: &str = "x-event-name";
