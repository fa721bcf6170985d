//! Event definitions and traits

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::contracts::{EventBooked, EventCreated, LocationCreated, UserCreated};

/// Event trait
///
/// Anything that can be emitted: a JSON-serializable payload that knows the
/// stable name it travels under.
pub trait Event: Serialize + Send + Sync + Debug {
    /// Get event name
    fn event_name(&self) -> &'static str;
}

/// A concrete event shape that can be registered for decoding.
pub trait EventContract: Event + DeserializeOwned + Default + Into<EventKind> + 'static {
    /// Routing key and `x-event-name` value for this shape.
    const NAME: &'static str;
}

/// Every event variant known to the system.
///
/// Serializes as the inner payload, so an `EventKind` can be emitted directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventKind {
    EventCreated(EventCreated),
    EventBooked(EventBooked),
    UserCreated(UserCreated),
    LocationCreated(LocationCreated),
}

impl EventKind {
    /// Name of the wrapped variant.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::EventCreated(_) => EventCreated::NAME,
            EventKind::EventBooked(_) => EventBooked::NAME,
            EventKind::UserCreated(_) => UserCreated::NAME,
            EventKind::LocationCreated(_) => LocationCreated::NAME,
        }
    }

    /// Identifier carried by the wrapped payload.
    pub fn id(&self) -> &str {
        match self {
            EventKind::EventCreated(e) => &e.id,
            EventKind::EventBooked(e) => &e.id,
            EventKind::UserCreated(e) => &e.id,
            EventKind::LocationCreated(e) => &e.id,
        }
    }
}

impl Event for EventKind {
    fn event_name(&self) -> &'static str {
        self.name()
    }
}

impl From<EventCreated> for EventKind {
    fn from(event: EventCreated) -> Self {
        EventKind::EventCreated(event)
    }
}

impl From<EventBooked> for EventKind {
    fn from(event: EventBooked) -> Self {
        EventKind::EventBooked(event)
    }
}

impl From<UserCreated> for EventKind {
    fn from(event: UserCreated) -> Self {
        EventKind::UserCreated(event)
    }
}

impl From<LocationCreated> for EventKind {
    fn from(event: LocationCreated) -> Self {
        EventKind::LocationCreated(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_contracts() {
        assert_eq!(
            EventKind::from(EventCreated::default()).name(),
            "event.created"
        );
        assert_eq!(EventKind::from(EventBooked::default()).name(), "event.booked");
        assert_eq!(EventKind::from(UserCreated::default()).name(), "user.created");
        assert_eq!(
            EventKind::from(LocationCreated::default()).name(),
            "location.created"
        );
    }

    #[test]
    fn test_kind_serializes_as_payload() {
        let user = UserCreated {
            id: "42".to_string(),
            first: "Ann".to_string(),
            last: "Lee".to_string(),
            age: 30,
        };

        let direct = serde_json::to_value(&user).unwrap();
        let wrapped = serde_json::to_value(EventKind::from(user)).unwrap();

        assert_eq!(direct, wrapped);
        assert!(wrapped.get("UserCreated").is_none());
    }

    #[test]
    fn test_kind_id() {
        let kind = EventKind::from(EventBooked {
            id: "b-1".to_string(),
            ..Default::default()
        });
        assert_eq!(kind.id(), "b-1");
        assert_eq!(kind.event_name(), "event.booked");
    }
}
