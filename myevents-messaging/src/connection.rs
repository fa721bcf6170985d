//! Shared, self-healing broker connection

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::MessagingError;
use crate::traits::{BrokerConnection, BrokerConnector};

type Slot = Option<Arc<dyn BrokerConnection>>;

/// Holds the current broker session and replaces it when it is lost.
///
/// Cloning is cheap; every clone observes the same session. A background task
/// redials with a fixed delay whenever the session closes, and stops once the
/// last clone is dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    address: Arc<str>,
    current: watch::Receiver<Slot>,
}

impl ConnectionManager {
    /// Dial the broker, retrying with `reconnect_delay` until it succeeds.
    pub async fn connect(
        connector: Arc<dyn BrokerConnector>,
        reconnect_delay: Duration,
    ) -> Result<Self, MessagingError> {
        let manager = Self::spawn(connector, reconnect_delay);
        manager.wait_connected().await?;
        Ok(manager)
    }

    /// Start the dial loop without waiting for the first session.
    pub fn spawn(connector: Arc<dyn BrokerConnector>, reconnect_delay: Duration) -> Self {
        let (tx, rx) = watch::channel(None);
        let address: Arc<str> = Arc::from(connector.address());

        tokio::spawn(supervise(connector, tx, reconnect_delay));

        Self {
            address,
            current: rx,
        }
    }

    /// The current session, if any.
    pub fn current(&self) -> Option<Arc<dyn BrokerConnection>> {
        self.current.borrow().clone()
    }

    /// Whether a usable session is held right now.
    pub fn is_connected(&self) -> bool {
        self.current()
            .map(|connection| connection.is_connected())
            .unwrap_or(false)
    }

    /// Watch session replacements.
    pub fn subscribe(&self) -> watch::Receiver<Slot> {
        self.current.clone()
    }

    /// Wait until a session is held.
    pub async fn wait_connected(&self) -> Result<(), MessagingError> {
        let mut rx = self.current.clone();
        rx.wait_for(|slot| slot.is_some())
            .await
            .map(|_| ())
            .map_err(|_| {
                MessagingError::Connection(format!(
                    "connection supervisor for {} stopped",
                    self.address
                ))
            })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("address", &self.address)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn supervise(connector: Arc<dyn BrokerConnector>, tx: watch::Sender<Slot>, delay: Duration) {
    loop {
        let connection = tokio::select! {
            connection = dial(connector.as_ref(), delay) => connection,
            _ = tx.closed() => break,
        };

        info!(address = %connector.address(), "Connected to message broker");
        tx.send_replace(Some(connection.clone()));

        tokio::select! {
            _ = connection.closed() => {}
            _ = tx.closed() => break,
        }

        warn!(address = %connector.address(), "Broker connection closed, reconnecting");
        tx.send_replace(None);
    }

    debug!(address = %connector.address(), "Connection supervisor stopped");
}

async fn dial(connector: &dyn BrokerConnector, delay: Duration) -> Arc<dyn BrokerConnection> {
    let mut attempt: u64 = 0;

    loop {
        attempt += 1;

        match connector.connect().await {
            Ok(connection) => return connection,
            Err(e) => {
                warn!(
                    address = %connector.address(),
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Failed to connect to message broker, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBroker;

    const DELAY: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_connect_when_available() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::connect(broker.connector(), DELAY)
            .await
            .unwrap();

        assert!(manager.is_connected());
        assert!(manager.current().is_some());
        assert_eq!(manager.address(), "memory://");
    }

    #[tokio::test]
    async fn test_connect_retries_until_available() {
        let broker = InMemoryBroker::new();
        broker.set_available(false);

        let pending = tokio::spawn(ConnectionManager::connect(broker.connector(), DELAY));

        tokio::time::sleep(DELAY * 3).await;
        assert!(!pending.is_finished());
        assert!(broker.failed_connects() >= 2);

        broker.set_available(true);
        let manager = pending.await.unwrap().unwrap();
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn test_spawn_starts_disconnected() {
        let broker = InMemoryBroker::new();
        broker.set_available(false);

        let manager = ConnectionManager::spawn(broker.connector(), DELAY);
        assert!(manager.current().is_none());
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_reconnects_after_session_loss() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::connect(broker.connector(), DELAY)
            .await
            .unwrap();
        let first = manager.current().unwrap();

        let mut updates = manager.subscribe();
        broker.disconnect_all().await;

        assert!(!first.is_connected());
        updates
            .wait_for(|slot| slot.as_ref().is_some_and(|c| !Arc::ptr_eq(c, &first)))
            .await
            .unwrap();

        assert!(manager.is_connected());
        assert_eq!(broker.connection_count(), 2);
    }
}
