//! Queue consumer that turns deliveries into events and survives reconnects

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use myevents_contracts::{ContractRegistry, EVENT_NAME_HEADER, EventKind};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DEFAULT_RECONNECT_DELAY, ExchangeConfig, QueueConfig};
use crate::connection::ConnectionManager;
use crate::emitter::close_quietly;
use crate::error::MessagingError;
use crate::message::{Delivery, Envelope};
use crate::traits::{BrokerChannel, BrokerConnection, EventChannels, EventListener};

/// Where a listener's background loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Waiting for a usable session
    Disconnected,
    /// Declaring, binding and registering the consumer
    SettingUp,
    /// Receiving deliveries
    Consuming,
    /// The event receiver was dropped; nothing more will be delivered
    Stopped,
}

/// Consumes one durable queue bound to a topic exchange.
///
/// Clones share the loop state, so at most one background worker runs per
/// listener and its clones.
#[derive(Debug, Clone)]
pub struct BrokerEventListener {
    connection: ConnectionManager,
    exchange: ExchangeConfig,
    queue: QueueConfig,
    registry: Arc<ContractRegistry>,
    retry_delay: Duration,
    state: Arc<watch::Sender<ListenerState>>,
    running: Arc<AtomicBool>,
}

impl BrokerEventListener {
    /// Listener for `queue`, decoding with the standard contracts.
    pub fn new(connection: ConnectionManager, exchange: ExchangeConfig, queue: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ListenerState::Disconnected);

        Self {
            connection,
            exchange,
            queue: QueueConfig::durable(queue),
            registry: Arc::new(ContractRegistry::standard().clone()),
            retry_delay: DEFAULT_RECONNECT_DELAY,
            state: Arc::new(state),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Decode with a custom registry
    pub fn with_registry(mut self, registry: ContractRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Delay before retrying after the session is lost or setup fails
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue.name
    }

    /// Current loop state
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Watch loop state changes
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Whether a background worker is running for this listener
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn setup(&self, connection: &dyn BrokerConnection) -> Result<(), MessagingError> {
        let channel = connection
            .channel()
            .await
            .map_err(|e| MessagingError::setup("could not open channel", e))?;
        let declared = declare(channel.as_ref(), &self.exchange, &self.queue).await;
        close_quietly(channel).await;
        declared
    }
}

#[async_trait]
impl EventListener for BrokerEventListener {
    /// Start the background worker.
    ///
    /// Fails with [`MessagingError::Configuration`] while a worker started by
    /// this listener (or a clone) is still running. Once that worker has
    /// stopped, `listen` may be called again.
    async fn listen(&self, event_names: &[&str]) -> Result<EventChannels, MessagingError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MessagingError::Configuration(format!(
                "listener for queue {} is already running",
                self.queue.name
            )));
        }

        match self.connection.current().filter(|c| c.is_connected()) {
            Some(connection) => {
                if let Err(e) = self.setup(connection.as_ref()).await {
                    self.running.store(false, Ordering::Release);
                    return Err(e);
                }
            }
            None => debug!(queue = %self.queue.name, "Not connected, deferring queue setup"),
        }

        let (events_tx, events) = mpsc::channel(1);
        let (errors_tx, errors) = mpsc::channel(1);

        let worker = Worker {
            connection: self.connection.clone(),
            exchange: self.exchange.clone(),
            queue: self.queue.clone(),
            event_names: event_names.iter().map(|name| name.to_string()).collect(),
            registry: self.registry.clone(),
            retry_delay: self.retry_delay,
            state: self.state.clone(),
            running: self.running.clone(),
            events: events_tx,
            errors: errors_tx,
        };

        info!(
            queue = %self.queue.name,
            exchange = %self.exchange.name,
            events = ?event_names,
            "Starting event listener"
        );
        tokio::spawn(worker.run());

        Ok(EventChannels { events, errors })
    }
}

/// Decode a delivery into an event using its `x-event-name` header.
pub fn decode_envelope(
    registry: &ContractRegistry,
    envelope: &Envelope,
) -> Result<EventKind, MessagingError> {
    let header = envelope.header(EVENT_NAME_HEADER).ok_or_else(|| {
        MessagingError::Decode(format!("msg did not contain {} header", EVENT_NAME_HEADER))
    })?;

    let name = header.as_str().ok_or_else(|| {
        MessagingError::Decode(format!(
            "{} header is not string, but {}",
            EVENT_NAME_HEADER,
            header.type_name()
        ))
    })?;

    registry
        .decode(name, &envelope.body)
        .map_err(MessagingError::from)
}

async fn declare(
    channel: &dyn BrokerChannel,
    exchange: &ExchangeConfig,
    queue: &QueueConfig,
) -> Result<(), MessagingError> {
    channel
        .declare_exchange(exchange)
        .await
        .map_err(|e| MessagingError::setup(format!("could not declare exchange {}", exchange.name), e))?;
    channel
        .declare_queue(queue)
        .await
        .map_err(|e| MessagingError::setup(format!("could not declare queue {}", queue.name), e))
}

enum Flow {
    /// The delivery stream ended, go back to waiting for a session
    Resume,
    /// The event receiver is gone
    Stop,
}

struct Worker {
    connection: ConnectionManager,
    exchange: ExchangeConfig,
    queue: QueueConfig,
    event_names: Vec<String>,
    registry: Arc<ContractRegistry>,
    retry_delay: Duration,
    state: Arc<watch::Sender<ListenerState>>,
    running: Arc<AtomicBool>,
    events: mpsc::Sender<EventKind>,
    errors: mpsc::Sender<MessagingError>,
}

impl Worker {
    fn set_state(&self, state: ListenerState) {
        self.state.send_replace(state);
    }

    async fn run(self) {
        loop {
            if self.events.is_closed() {
                break;
            }

            match self.connection.current() {
                Some(connection) if connection.is_connected() => {
                    match self.consume(connection.as_ref()).await {
                        Ok(Flow::Stop) => break,
                        Ok(Flow::Resume) => {
                            info!(queue = %self.queue.name, "Delivery stream ended, resubscribing")
                        }
                        Err(e) => warn!(
                            queue = %self.queue.name,
                            error = %e,
                            "Listener setup failed"
                        ),
                    }
                }
                Some(_) => debug!(queue = %self.queue.name, "Connection is closed"),
                None => debug!(queue = %self.queue.name, "Connection not established"),
            }

            self.set_state(ListenerState::Disconnected);
            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = self.events.closed() => break,
            }
        }

        self.running.store(false, Ordering::Release);
        self.set_state(ListenerState::Stopped);
        info!(queue = %self.queue.name, "Event listener stopped");
    }

    async fn consume(&self, connection: &dyn BrokerConnection) -> Result<Flow, MessagingError> {
        self.set_state(ListenerState::SettingUp);

        let channel = connection
            .channel()
            .await
            .map_err(|e| MessagingError::setup("could not open channel", e))?;
        let flow = self.consume_on(channel.as_ref()).await;
        close_quietly(channel).await;
        flow
    }

    async fn consume_on(&self, channel: &dyn BrokerChannel) -> Result<Flow, MessagingError> {
        declare(channel, &self.exchange, &self.queue).await?;

        for name in &self.event_names {
            channel
                .bind_queue(&self.queue.name, &self.exchange.name, name)
                .await
                .map_err(|e| {
                    MessagingError::setup(
                        format!("could not bind queue {} to {}", self.queue.name, name),
                        e,
                    )
                })?;
        }

        let tag = format!("{}-{}", self.queue.name, Uuid::new_v4());
        let mut deliveries = channel
            .consume(&self.queue.name, &tag)
            .await
            .map_err(|e| MessagingError::setup(format!("could not consume {}", self.queue.name), e))?;

        self.set_state(ListenerState::Consuming);
        info!(queue = %self.queue.name, consumer_tag = %tag, "Listening for events");

        loop {
            let item = tokio::select! {
                item = deliveries.next() => item,
                _ = self.events.closed() => {
                    debug!(queue = %self.queue.name, "Event receiver dropped, cancelling consumer");
                    return Ok(Flow::Stop);
                }
            };
            let Some(item) = item else { break };

            match item {
                Ok(delivery) => {
                    if let Flow::Stop = self.handle(delivery).await {
                        return Ok(Flow::Stop);
                    }
                }
                Err(e) => {
                    warn!(queue = %self.queue.name, error = %e, "Delivery stream failed");
                    break;
                }
            }
        }

        Ok(Flow::Resume)
    }

    async fn handle(&self, delivery: Delivery) -> Flow {
        match decode_envelope(&self.registry, &delivery.envelope) {
            Ok(event) => {
                let name = event.name();

                if self.events.send(event).await.is_err() {
                    debug!(queue = %self.queue.name, event = name, "Event receiver dropped, requeueing");
                    if let Err(e) = delivery.reject(true).await {
                        warn!(error = %e, "Failed to requeue delivery");
                    }
                    return Flow::Stop;
                }

                if let Err(e) = delivery.ack().await {
                    warn!(queue = %self.queue.name, event = name, error = %e, "Failed to ack delivery");
                }
                Flow::Resume
            }
            Err(err) => {
                warn!(
                    queue = %self.queue.name,
                    routing_key = %delivery.envelope.routing_key,
                    error = %err,
                    "Rejecting undecodable message"
                );

                if self.errors.send(err).await.is_err() {
                    debug!(queue = %self.queue.name, "Error receiver dropped");
                }
                if let Err(e) = delivery.reject(false).await {
                    warn!(error = %e, "Failed to reject delivery");
                }
                Flow::Resume
            }
        }
    }
}
