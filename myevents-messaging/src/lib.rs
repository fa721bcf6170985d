//! # MyEvents Messaging
//!
//! Publish/subscribe between MyEvents services over a shared topic exchange.
//!
//! - [`ConnectionManager`] owns the broker session and redials it when lost
//! - [`BrokerEventEmitter`] publishes events under their own name
//! - [`BrokerEventListener`] binds a durable queue to event names and streams
//!   decoded events, acknowledging each one once it has been handed over
//!
//! ## Features
//!
//! - `rabbitmq` (default) - RabbitMQ transport via `lapin`
//!
//! The [`memory`] transport is always available and is what the tests run on.
//!
//! ## Example
//!
//! ```rust,no_run
//! use myevents_contracts::UserCreated;
//! use myevents_messaging::prelude::*;
//! use myevents_messaging::memory::InMemoryBroker;
//!
//! # async fn example() -> Result<(), MessagingError> {
//! let broker = InMemoryBroker::new();
//! let config = MessagingConfig::default();
//! let connection = ConnectionManager::connect(broker.connector(), config.reconnect_delay).await?;
//!
//! let listener = BrokerEventListener::new(connection.clone(), config.exchange_config(), "users");
//! let (mut events, _errors) = listener.listen(&["user.created"]).await?.into_parts();
//!
//! let emitter = BrokerEventEmitter::new(connection, config.exchange_config()).await?;
//! emitter.emit(&UserCreated::default()).await?;
//!
//! let event = events.recv().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod emitter;
pub mod error;
pub mod listener;
pub mod memory;
pub mod message;
pub mod traits;

#[cfg(feature = "rabbitmq")]
pub mod rabbitmq;

pub use config::*;
pub use connection::ConnectionManager;
pub use emitter::BrokerEventEmitter;
pub use error::MessagingError;
pub use listener::{BrokerEventListener, ListenerState, decode_envelope};
pub use message::{Acker, Delivery, Envelope, HeaderValue};
pub use traits::*;

#[cfg(feature = "rabbitmq")]
pub use rabbitmq::RabbitMqConnector;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::config::{ExchangeConfig, MessagingConfig, QueueConfig};
    pub use crate::connection::ConnectionManager;
    pub use crate::emitter::BrokerEventEmitter;
    pub use crate::error::MessagingError;
    pub use crate::listener::{BrokerEventListener, ListenerState};
    pub use crate::traits::{EventChannels, EventEmitter, EventListener};
}
