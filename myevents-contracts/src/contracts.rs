//! Payload shapes for every event exchanged between services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, EventContract};

/// Emitted by the events service after a new event has been stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventCreated {
    pub id: String,
    pub name: String,
    pub location_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Emitted whenever a user books seats for an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventBooked {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub seats: i64,
    /// Travels as unix seconds.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserCreated {
    pub id: String,
    pub first: String,
    pub last: String,
    pub age: i64,
}

/// Emitted whenever a location is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationCreated {
    pub id: String,
    pub name: String,
    pub address: String,
    pub country: String,
    pub halls: Vec<Hall>,
}

/// A hall inside a location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hall {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub location: String,
    pub capacity: i64,
}

macro_rules! impl_contract {
    ($ty:ty, $name:literal) => {
        impl Event for $ty {
            fn event_name(&self) -> &'static str {
                <$ty as EventContract>::NAME
            }
        }

        impl EventContract for $ty {
            const NAME: &'static str = $name;
        }
    };
}

impl_contract!(EventCreated, "event.created");
impl_contract!(EventBooked, "event.booked");
impl_contract!(UserCreated, "user.created");
impl_contract!(LocationCreated, "location.created");
