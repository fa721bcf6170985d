//! Event publishing over the shared connection

use std::sync::Arc;

use async_trait::async_trait;
use myevents_contracts::Event;
use tracing::{debug, warn};

use crate::config::ExchangeConfig;
use crate::connection::ConnectionManager;
use crate::error::MessagingError;
use crate::message::Envelope;
use crate::traits::{BrokerChannel, BrokerConnection, EventEmitter};

/// Publishes events to a topic exchange, one short-lived channel per emit.
#[derive(Debug, Clone)]
pub struct BrokerEventEmitter {
    connection: ConnectionManager,
    exchange: ExchangeConfig,
}

impl BrokerEventEmitter {
    /// Create an emitter, declaring the exchange if a session is up.
    pub async fn new(
        connection: ConnectionManager,
        exchange: ExchangeConfig,
    ) -> Result<Self, MessagingError> {
        let emitter = Self {
            connection,
            exchange,
        };

        if let Some(connection) = emitter.connection.current().filter(|c| c.is_connected()) {
            let channel = connection.channel().await?;
            let declared = emitter.declare(channel.as_ref()).await;
            close_quietly(channel).await;
            declared?;
        } else {
            debug!(exchange = %emitter.exchange.name, "Not connected, exchange will be declared on first emit");
        }

        Ok(emitter)
    }

    pub fn exchange(&self) -> &str {
        &self.exchange.name
    }

    fn live_connection(&self) -> Result<Arc<dyn BrokerConnection>, MessagingError> {
        let connection = self
            .connection
            .current()
            .ok_or_else(|| MessagingError::Connection("connection not established".to_string()))?;

        if !connection.is_connected() {
            return Err(MessagingError::Connection("connection is closed".to_string()));
        }

        Ok(connection)
    }

    async fn declare(&self, channel: &dyn BrokerChannel) -> Result<(), MessagingError> {
        channel.declare_exchange(&self.exchange).await.map_err(|e| {
            MessagingError::setup(format!("could not declare exchange {}", self.exchange.name), e)
        })
    }

    async fn publish(
        &self,
        channel: &dyn BrokerChannel,
        envelope: &Envelope,
    ) -> Result<(), MessagingError> {
        self.declare(channel).await?;
        channel.publish(&self.exchange.name, envelope).await
    }
}

#[async_trait]
impl EventEmitter for BrokerEventEmitter {
    async fn emit<E: Event + ?Sized>(&self, event: &E) -> Result<(), MessagingError> {
        let connection = self.live_connection()?;
        let envelope = Envelope::for_event(event)?;

        let channel = connection.channel().await?;
        let result = self.publish(channel.as_ref(), &envelope).await;
        close_quietly(channel).await;

        match &result {
            Ok(()) => debug!(
                exchange = %self.exchange.name,
                event = %envelope.routing_key,
                bytes = envelope.body.len(),
                "Emitted event"
            ),
            Err(e) => warn!(
                exchange = %self.exchange.name,
                event = %envelope.routing_key,
                error = %e,
                "Failed to emit event"
            ),
        }

        result
    }
}

pub(crate) async fn close_quietly(channel: Box<dyn BrokerChannel>) {
    if let Err(e) = channel.close().await {
        debug!(error = %e, "Failed to close channel");
    }
}
