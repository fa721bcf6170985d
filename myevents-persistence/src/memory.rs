//! In-memory database (for testing/development)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::handler::DatabaseHandler;
use crate::models::{Booking, Event, User};

/// Fresh 24 character hex id
fn new_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(24);
    id
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    events: HashMap<String, Event>,
}

/// In-memory database
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn event_count(&self) -> usize {
        self.tables.read().await.events.len()
    }

    /// Drop every record
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.users.clear();
        tables.events.clear();
    }
}

impl std::fmt::Debug for InMemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDatabase").finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseHandler for InMemoryDatabase {
    async fn add_user(&self, mut user: User) -> Result<String, PersistenceError> {
        if user.id.is_empty() {
            user.id = new_id();
        }

        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) {
            return Err(PersistenceError::duplicate("user", user.id));
        }

        let id = user.id.clone();
        tables.users.insert(id.clone(), user);
        debug!(user_id = %id, "Stored user");
        Ok(id)
    }

    async fn find_user(&self, id: &str) -> Result<User, PersistenceError> {
        self.tables
            .read()
            .await
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::not_found("user", id))
    }

    async fn find_user_by_name(&self, name: &str) -> Result<User, PersistenceError> {
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|user| user.first == name)
            .cloned()
            .ok_or_else(|| PersistenceError::not_found("user", name))
    }

    async fn find_all_users(&self) -> Result<Vec<User>, PersistenceError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn add_event(&self, mut event: Event) -> Result<String, PersistenceError> {
        if event.id.is_empty() {
            event.id = new_id();
        }
        if event.location.id.is_empty() {
            event.location.id = new_id();
        }

        let mut tables = self.tables.write().await;
        if tables.events.contains_key(&event.id) {
            return Err(PersistenceError::duplicate("event", event.id));
        }

        let id = event.id.clone();
        tables.events.insert(id.clone(), event);
        debug!(event_id = %id, "Stored event");
        Ok(id)
    }

    async fn find_event(&self, id: &str) -> Result<Event, PersistenceError> {
        self.tables
            .read()
            .await
            .events
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::not_found("event", id))
    }

    async fn find_event_by_name(&self, name: &str) -> Result<Event, PersistenceError> {
        self.tables
            .read()
            .await
            .events
            .values()
            .find(|event| event.name == name)
            .cloned()
            .ok_or_else(|| PersistenceError::not_found("event", name))
    }

    async fn find_all_events(&self) -> Result<Vec<Event>, PersistenceError> {
        let tables = self.tables.read().await;
        let mut events: Vec<Event> = tables.events.values().cloned().collect();
        events.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(events)
    }

    async fn add_booking_for_user(
        &self,
        user_id: &str,
        mut booking: Booking,
    ) -> Result<String, PersistenceError> {
        if booking.id.is_empty() {
            booking.id = new_id();
        }

        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| PersistenceError::not_found("user", user_id))?;

        let id = booking.id.clone();
        if !user.bookings.contains(&booking) {
            user.bookings.push(booking);
        }

        debug!(user_id, booking_id = %id, "Stored booking");
        Ok(id)
    }

    async fn find_booking(
        &self,
        user_id: &str,
        booking_id: &str,
    ) -> Result<Booking, PersistenceError> {
        let user = self.find_user(user_id).await?;
        user.bookings
            .into_iter()
            .find(|booking| booking.id == booking_id)
            .ok_or_else(|| PersistenceError::not_found("booking", booking_id))
    }

    async fn find_bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, PersistenceError> {
        Ok(self.find_user(user_id).await?.bookings)
    }
}
