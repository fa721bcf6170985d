//! Database handler abstraction and layer selection

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PersistenceError;
use crate::memory::InMemoryDatabase;
use crate::models::{Booking, Event, User};

/// Storage operations the services rely on.
///
/// Ids are opaque strings; adders return the id the record was stored under,
/// generating one when the record carries none.
#[async_trait]
pub trait DatabaseHandler: Send + Sync {
    async fn add_user(&self, user: User) -> Result<String, PersistenceError>;

    async fn find_user(&self, id: &str) -> Result<User, PersistenceError>;

    /// First user whose first name matches
    async fn find_user_by_name(&self, name: &str) -> Result<User, PersistenceError>;

    async fn find_all_users(&self) -> Result<Vec<User>, PersistenceError>;

    async fn add_event(&self, event: Event) -> Result<String, PersistenceError>;

    async fn find_event(&self, id: &str) -> Result<Event, PersistenceError>;

    async fn find_event_by_name(&self, name: &str) -> Result<Event, PersistenceError>;

    async fn find_all_events(&self) -> Result<Vec<Event>, PersistenceError>;

    /// Attach a booking to an existing user. Adding the same booking twice
    /// keeps a single copy.
    async fn add_booking_for_user(
        &self,
        user_id: &str,
        booking: Booking,
    ) -> Result<String, PersistenceError>;

    async fn find_booking(
        &self,
        user_id: &str,
        booking_id: &str,
    ) -> Result<Booking, PersistenceError>;

    async fn find_bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, PersistenceError>;
}

/// Supported `databasetype` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    MongoDb,
    DynamoDb,
    Memory,
}

impl FromStr for DatabaseType {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mongodb" => Ok(DatabaseType::MongoDb),
            "dynamodb" => Ok(DatabaseType::DynamoDb),
            "memory" => Ok(DatabaseType::Memory),
            other => Err(PersistenceError::Unsupported(other.to_string())),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::MongoDb => write!(f, "mongodb"),
            DatabaseType::DynamoDb => write!(f, "dynamodb"),
            DatabaseType::Memory => write!(f, "memory"),
        }
    }
}

/// Build the persistence layer for a configured database type.
///
/// Only the in-memory store is compiled in; document-store types fall back to
/// it with a warning.
pub fn new_persistence_layer(
    kind: DatabaseType,
    connection: &str,
) -> Arc<dyn DatabaseHandler> {
    if kind != DatabaseType::Memory {
        warn!(
            database = %kind,
            connection = connection,
            "No adapter for database type, using in-memory storage"
        );
    }

    Arc::new(InMemoryDatabase::new())
}
