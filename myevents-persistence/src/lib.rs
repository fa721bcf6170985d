//! # MyEvents Persistence
//!
//! Records the services keep locally and the [`DatabaseHandler`] they are
//! stored through. [`InMemoryDatabase`] is the bundled adapter.
//!
//! ```rust
//! use myevents_persistence::{DatabaseHandler, InMemoryDatabase, User};
//!
//! # tokio_test::block_on(async {
//! let db = InMemoryDatabase::new();
//! let id = db.add_user(User { first: "Ann".into(), ..Default::default() }).await.unwrap();
//! assert_eq!(db.find_user(&id).await.unwrap().first, "Ann");
//! # });
//! ```

pub mod error;
pub mod handler;
pub mod memory;
pub mod models;

pub use error::PersistenceError;
pub use handler::{DatabaseHandler, DatabaseType, new_persistence_layer};
pub use memory::InMemoryDatabase;
pub use models::{Booking, Event, Hall, Location, User};
