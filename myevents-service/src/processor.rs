//! Applies received events to the local database

use std::sync::Arc;

use myevents_contracts::{EventBooked, EventCreated, EventKind, UserCreated};
use myevents_messaging::{EventListener, MessagingError};
use myevents_persistence::{Booking, DatabaseHandler, Event, Location, PersistenceError, User};
use tracing::{debug, error, info, warn};

/// Listens on a service's bindings and stores what arrives.
pub struct EventProcessor<L> {
    listener: L,
    database: Arc<dyn DatabaseHandler>,
    bindings: Vec<String>,
}

impl<L: EventListener> EventProcessor<L> {
    pub fn new(listener: L, database: Arc<dyn DatabaseHandler>, bindings: &[&str]) -> Self {
        Self {
            listener,
            database,
            bindings: bindings.iter().map(|name| name.to_string()).collect(),
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Listen and apply events until both channels close.
    ///
    /// Returns the listener's setup error, if any. Storage failures and
    /// per-message errors are logged and do not stop processing.
    pub async fn process_events(&self) -> Result<(), MessagingError> {
        let names: Vec<&str> = self.bindings.iter().map(String::as_str).collect();
        info!(bindings = ?names, "Listening to events");

        let (mut events, mut errors) = self.listener.listen(&names).await?.into_parts();
        let mut events_open = true;
        let mut errors_open = true;

        while events_open || errors_open {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        let name = event.name();
                        if let Err(e) = self.handle_event(event).await {
                            error!(event = name, error = %e, "Could not store event");
                        }
                    }
                    None => events_open = false,
                },
                err = errors.recv(), if errors_open => match err {
                    Some(err) => warn!(error = %err, "Received error while processing message"),
                    None => errors_open = false,
                },
            }
        }

        info!("Event channels closed, stopping processor");
        Ok(())
    }

    /// Store a single event.
    pub async fn handle_event(&self, event: EventKind) -> Result<(), PersistenceError> {
        match event {
            EventKind::EventCreated(e) => {
                info!(id = %e.id, name = %e.name, "Event created");
                let id = self.database.add_event(stored_event(&e)).await?;
                debug!(id = %id, "Stored event");
            }
            EventKind::UserCreated(e) => {
                info!(id = %e.id, "User created");
                let id = self.database.add_user(stored_user(e)).await?;
                debug!(id = %id, "Stored user");
            }
            EventKind::EventBooked(e) => {
                info!(id = %e.id, user = %e.user_id, event = %e.event_id, "Booking created");
                let user_id = e.user_id.clone();
                let id = self
                    .database
                    .add_booking_for_user(&user_id, stored_booking(e))
                    .await?;
                debug!(id = %id, user = %user_id, "Stored booking");
            }
            EventKind::LocationCreated(e) => {
                info!(id = %e.id, name = %e.name, halls = e.halls.len(), "Location created");
            }
        }
        Ok(())
    }
}

fn stored_event(e: &EventCreated) -> Event {
    Event {
        id: e.id.clone(),
        name: e.name.clone(),
        duration: (e.end - e.start).num_hours(),
        start_date: e.start.timestamp(),
        end_date: e.end.timestamp(),
        location: Location {
            id: e.location_id.clone(),
            ..Default::default()
        },
    }
}

fn stored_user(e: UserCreated) -> User {
    User {
        id: e.id,
        first: e.first,
        last: e.last,
        age: e.age,
        bookings: Vec::new(),
        ..Default::default()
    }
}

fn stored_booking(e: EventBooked) -> Booking {
    Booking {
        id: e.id,
        date: e.date.timestamp(),
        event_id: e.event_id,
        seats: e.seats,
    }
}
