//! Records kept by the services' local stores

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub first: String,
    pub last: String,
    pub age: i64,
    pub email: String,
    pub username: String,
    pub bookings: Vec<Booking>,
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "id: {}, first_name: {}, last_name: {}, age: {}, bookings: {}",
            self.id,
            self.first,
            self.last,
            self.age,
            self.bookings.len()
        )
    }
}

/// Seats a user holds for an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    /// Unix seconds
    pub date: i64,
    pub event_id: String,
    pub seats: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    /// Hours
    pub duration: i64,
    /// Unix seconds
    pub start_date: i64,
    /// Unix seconds
    pub end_date: i64,
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub address: String,
    pub country: String,
    pub open_time: i64,
    pub close_time: i64,
    pub halls: Vec<Hall>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hall {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    pub capacity: i64,
}
