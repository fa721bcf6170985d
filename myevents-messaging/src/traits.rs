//! Traits for message broker implementations.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use myevents_contracts::{Event, EventKind};
use tokio::sync::mpsc;

use crate::config::{ExchangeConfig, QueueConfig};
use crate::error::MessagingError;
use crate::message::{Delivery, Envelope};

/// A stream of deliveries from a consumed queue.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, MessagingError>> + Send>>;

/// Opens broker sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    /// Open a new session with the broker.
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, MessagingError>;

    /// Address used for logging.
    fn address(&self) -> &str;
}

/// Trait for message broker connections.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Get a channel for publishing and consuming messages.
    async fn channel(&self) -> Result<Box<dyn BrokerChannel>, MessagingError>;

    /// Whether the session is still usable.
    fn is_connected(&self) -> bool;

    /// Resolves once the session has been lost or closed.
    async fn closed(&self);
}

/// Trait for message broker channels.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare an exchange. Idempotent for identical declarations.
    async fn declare_exchange(&self, config: &ExchangeConfig) -> Result<(), MessagingError>;

    /// Declare a queue. Idempotent for identical declarations.
    async fn declare_queue(&self, config: &QueueConfig) -> Result<(), MessagingError>;

    /// Bind a queue to an exchange.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError>;

    /// Publish a message to an exchange.
    async fn publish(&self, exchange: &str, envelope: &Envelope) -> Result<(), MessagingError>;

    /// Start consuming a queue with manual acknowledgement.
    async fn consume(&self, queue: &str, consumer_tag: &str)
    -> Result<DeliveryStream, MessagingError>;

    /// Close the channel.
    async fn close(&self) -> Result<(), MessagingError>;
}

/// Publishes events to the shared exchange.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    /// Publish one event under its own name.
    async fn emit<E: Event + ?Sized>(&self, event: &E) -> Result<(), MessagingError>;
}

/// Decoded events and per-message errors produced by a listener.
#[derive(Debug)]
pub struct EventChannels {
    pub events: mpsc::Receiver<EventKind>,
    pub errors: mpsc::Receiver<MessagingError>,
}

impl EventChannels {
    pub fn into_parts(self) -> (mpsc::Receiver<EventKind>, mpsc::Receiver<MessagingError>) {
        (self.events, self.errors)
    }
}

/// Subscribes a queue to event names and streams what arrives.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Start listening for the given event names.
    ///
    /// Returns once the first setup attempt has been made; delivery continues
    /// in the background, surviving reconnects.
    async fn listen(&self, event_names: &[&str]) -> Result<EventChannels, MessagingError>;
}
