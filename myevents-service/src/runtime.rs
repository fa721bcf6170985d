//! Wiring of one service: connection, emitter, database and processor

use std::future::Future;
use std::sync::Arc;

use myevents_config::ServiceConfig;
use myevents_messaging::{
    BrokerConnector, BrokerEventEmitter, BrokerEventListener, ConnectionManager, MessagingConfig,
};
use myevents_persistence::{DatabaseHandler, DatabaseType, new_persistence_layer};
use tracing::info;

use crate::error::Result;
use crate::processor::EventProcessor;
use crate::profile::ServiceKind;

/// A running MyEvents service.
pub struct ServiceRuntime {
    kind: ServiceKind,
    connection: ConnectionManager,
    emitter: BrokerEventEmitter,
    database: Arc<dyn DatabaseHandler>,
    processor: EventProcessor<BrokerEventListener>,
}

impl ServiceRuntime {
    /// Connect to the broker (waiting until it is reachable) and build the
    /// service components.
    pub async fn start(
        kind: ServiceKind,
        config: &ServiceConfig,
        connector: Arc<dyn BrokerConnector>,
    ) -> Result<Self> {
        let database_type: DatabaseType = config.databasetype.parse()?;

        let messaging = MessagingConfig::new(config.amqp_message_broker.clone())
            .with_exchange(config.amqp_exchange.clone())
            .with_reconnect_delay(config.reconnect_delay());

        info!(service = %kind, broker = connector.address(), "Connecting to the message broker");
        let connection = ConnectionManager::connect(connector, messaging.reconnect_delay).await?;
        info!(service = %kind, broker = connection.address(), "Connected to the message broker");

        let emitter = BrokerEventEmitter::new(connection.clone(), messaging.exchange_config()).await?;
        let listener =
            BrokerEventListener::new(connection.clone(), messaging.exchange_config(), kind.queue())
                .with_retry_delay(messaging.reconnect_delay);

        let database = new_persistence_layer(database_type, &config.dbconnection);
        let processor = EventProcessor::new(listener, database.clone(), kind.bindings());

        Ok(Self {
            kind,
            connection,
            emitter,
            database,
            processor,
        })
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Publisher for events produced by this service
    pub fn emitter(&self) -> &BrokerEventEmitter {
        &self.emitter
    }

    pub fn database(&self) -> Arc<dyn DatabaseHandler> {
        self.database.clone()
    }

    pub fn listener(&self) -> &BrokerEventListener {
        self.processor.listener()
    }

    /// Process events until `shutdown` resolves or the processor stops.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) -> Result<()> {
        info!(service = %self.kind, queue = self.kind.queue(), "Service running");

        tokio::select! {
            result = self.processor.process_events() => result?,
            _ = shutdown => info!(service = %self.kind, "Shutdown requested"),
        }
        Ok(())
    }
}
