//! In-process broker with AMQP-style exchanges, queues and acknowledgements.
//!
//! Routing follows topic exchange rules (`*` matches one word, `#` matches
//! zero or more). Deliveries stay unacknowledged until settled, and go back
//! to the head of their queue when the owning channel or session closes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, trace};

use crate::config::{ExchangeConfig, ExchangeKind, QueueConfig};
use crate::error::MessagingError;
use crate::message::{Acker, Delivery, Envelope};
use crate::traits::{BrokerChannel, BrokerConnection, BrokerConnector, DeliveryStream};

const ADDRESS: &str = "memory://";

/// How many published messages [`InMemoryBroker::published`] keeps.
pub const PUBLISHED_LOG_LIMIT: usize = 1024;

/// Handle to an in-process broker. Clones share the same broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<BrokerState>,
    unavailable: AtomicBool,
    connects: AtomicU64,
    failed_connects: AtomicU64,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeConfig>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<Binding>,
    sessions: HashMap<u64, Session>,
    /// channel id -> session id
    channels: HashMap<u64, u64>,
    published: VecDeque<Envelope>,
    next_id: u64,
    next_tag: u64,
}

struct Binding {
    queue: String,
    exchange: String,
    pattern: String,
}

struct Session {
    open: Arc<AtomicBool>,
    closed: watch::Sender<bool>,
}

struct QueueState {
    config: QueueConfig,
    ready: VecDeque<Stored>,
    consumers: Vec<Consumer>,
    unacked: HashMap<u64, Unacked>,
    cursor: usize,
}

struct Stored {
    envelope: Envelope,
    redelivered: bool,
}

struct Consumer {
    channel: u64,
    tag: String,
    tx: mpsc::UnboundedSender<Result<Delivery, MessagingError>>,
}

struct Unacked {
    channel: u64,
    message: Stored,
}

impl QueueState {
    fn new(config: QueueConfig) -> Self {
        Self {
            config,
            ready: VecDeque::new(),
            consumers: Vec::new(),
            unacked: HashMap::new(),
            cursor: 0,
        }
    }
}

fn channel_closed() -> MessagingError {
    MessagingError::Channel("channel is closed".to_string())
}

impl BrokerState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_channel(&self, channel: u64) -> Result<(), MessagingError> {
        if self.channels.contains_key(&channel) {
            Ok(())
        } else {
            Err(channel_closed())
        }
    }

    fn route(
        &mut self,
        exchange: &str,
        envelope: &Envelope,
        broker: &InMemoryBroker,
    ) -> Result<usize, MessagingError> {
        let targets: Vec<String> = if exchange.is_empty() {
            self.queues
                .contains_key(&envelope.routing_key)
                .then(|| envelope.routing_key.clone())
                .into_iter()
                .collect()
        } else {
            let kind = self
                .exchanges
                .get(exchange)
                .map(|config| config.kind)
                .ok_or_else(|| {
                    MessagingError::Publish(format!("NOT_FOUND - no exchange '{}'", exchange))
                })?;

            let mut targets = Vec::new();
            for binding in self.bindings.iter().filter(|b| b.exchange == exchange) {
                let routed = match kind {
                    ExchangeKind::Topic => topic_matches(&binding.pattern, &envelope.routing_key),
                    ExchangeKind::Direct => binding.pattern == envelope.routing_key,
                    ExchangeKind::Fanout => true,
                };
                if routed && !targets.contains(&binding.queue) {
                    targets.push(binding.queue.clone());
                }
            }
            targets
        };

        if self.published.len() == PUBLISHED_LOG_LIMIT {
            self.published.pop_front();
        }
        self.published.push_back(envelope.clone());

        for name in &targets {
            if let Some(queue) = self.queues.get_mut(name) {
                queue.ready.push_back(Stored {
                    envelope: envelope.clone(),
                    redelivered: false,
                });
            }
            self.dispatch(name, broker);
        }

        trace!(
            exchange,
            routing_key = %envelope.routing_key,
            queues = targets.len(),
            "Routed message"
        );

        Ok(targets.len())
    }

    /// Hand ready messages to live consumers, round robin.
    fn dispatch(&mut self, name: &str, broker: &InMemoryBroker) {
        let Some(queue) = self.queues.get_mut(name) else {
            return;
        };

        queue.consumers.retain(|consumer| !consumer.tx.is_closed());

        while !queue.consumers.is_empty() {
            let Some(message) = queue.ready.pop_front() else {
                break;
            };

            let index = queue.cursor % queue.consumers.len();
            queue.cursor = queue.cursor.wrapping_add(1);

            self.next_tag += 1;
            let tag = self.next_tag;

            let acker = MemoryAcker {
                broker: broker.clone(),
                queue: name.to_string(),
                tag,
            };
            let delivery = Delivery::new(
                message.envelope.clone(),
                tag,
                message.redelivered,
                Box::new(acker),
            );

            let consumer = &queue.consumers[index];
            match consumer.tx.send(Ok(delivery)) {
                Ok(()) => {
                    trace!(queue = name, consumer = %consumer.tag, tag, "Delivered message");
                    let channel = consumer.channel;
                    queue.unacked.insert(tag, Unacked { channel, message });
                }
                Err(_) => {
                    queue.consumers.remove(index);
                    queue.ready.push_front(message);
                }
            }
        }
    }

    /// Cancel the channel's consumers and requeue what it left unacknowledged.
    fn close_channel(&mut self, channel: u64, broker: &InMemoryBroker) {
        if self.channels.remove(&channel).is_none() {
            return;
        }

        let names: Vec<String> = self.queues.keys().cloned().collect();
        for name in names {
            let Some(queue) = self.queues.get_mut(&name) else {
                continue;
            };

            queue.consumers.retain(|consumer| consumer.channel != channel);

            let mut tags: Vec<u64> = queue
                .unacked
                .iter()
                .filter(|(_, pending)| pending.channel == channel)
                .map(|(tag, _)| *tag)
                .collect();
            tags.sort_unstable();

            if !tags.is_empty() {
                debug!(queue = %name, count = tags.len(), "Requeueing unacknowledged messages");
            }

            for tag in tags.into_iter().rev() {
                if let Some(pending) = queue.unacked.remove(&tag) {
                    queue.ready.push_front(Stored {
                        envelope: pending.message.envelope,
                        redelivered: true,
                    });
                }
            }

            self.dispatch(&name, broker);
        }
    }

    fn close_session(&mut self, session: u64, broker: &InMemoryBroker) {
        let Some(handle) = self.sessions.remove(&session) else {
            return;
        };
        handle.open.store(false, Ordering::SeqCst);

        let channels: Vec<u64> = self
            .channels
            .iter()
            .filter(|(_, owner)| **owner == session)
            .map(|(channel, _)| *channel)
            .collect();
        for channel in channels {
            self.close_channel(channel, broker);
        }

        handle.closed.send_replace(true);
    }
}

/// AMQP topic matching over dot-separated words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&head, tail)) => (word == "*" || word == head) && match_words(rest, tail),
            None => false,
        },
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector that opens sessions on this broker.
    pub fn connector(&self) -> Arc<dyn BrokerConnector> {
        Arc::new(InMemoryConnector {
            broker: self.clone(),
        })
    }

    /// Refuse (or accept again) new sessions. Open sessions are unaffected.
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Drop every open session, as if the broker restarted.
    pub async fn disconnect_all(&self) {
        let mut state = self.inner.state.lock().await;
        let sessions: Vec<u64> = state.sessions.keys().copied().collect();
        debug!(sessions = sessions.len(), "Closing all broker sessions");
        for session in sessions {
            state.close_session(session, self);
        }
    }

    /// Publish without a session.
    pub async fn publish(&self, exchange: &str, envelope: Envelope) -> Result<usize, MessagingError> {
        let mut state = self.inner.state.lock().await;
        state.route(exchange, &envelope, self)
    }

    /// Successful connects so far
    pub fn connection_count(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Refused connects so far
    pub fn failed_connects(&self) -> u64 {
        self.inner.failed_connects.load(Ordering::SeqCst)
    }

    pub async fn open_sessions(&self) -> usize {
        self.inner.state.lock().await.sessions.len()
    }

    pub async fn open_channels(&self) -> usize {
        self.inner.state.lock().await.channels.len()
    }

    /// Messages accepted for routing, oldest first. Only the last
    /// [`PUBLISHED_LOG_LIMIT`] are kept.
    pub async fn published(&self) -> Vec<Envelope> {
        self.inner.state.lock().await.published.iter().cloned().collect()
    }

    /// Messages waiting in a queue.
    pub async fn ready(&self, queue: &str) -> Vec<Envelope> {
        let state = self.inner.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|m| m.envelope.clone()).collect())
            .unwrap_or_default()
    }

    /// Deliveries handed out but not yet settled.
    pub async fn unacked(&self, queue: &str) -> usize {
        let state = self.inner.state.lock().await;
        state.queues.get(queue).map(|q| q.unacked.len()).unwrap_or(0)
    }

    pub async fn consumer_count(&self, queue: &str) -> usize {
        let state = self.inner.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| q.consumers.iter().filter(|c| !c.tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Binding patterns from `exchange` to `queue`.
    pub async fn bindings(&self, queue: &str, exchange: &str) -> Vec<String> {
        let state = self.inner.state.lock().await;
        state
            .bindings
            .iter()
            .filter(|b| b.queue == queue && b.exchange == exchange)
            .map(|b| b.pattern.clone())
            .collect()
    }

    pub async fn exchange(&self, name: &str) -> Option<ExchangeConfig> {
        self.inner.state.lock().await.exchanges.get(name).cloned()
    }

    pub async fn queue(&self, name: &str) -> Option<QueueConfig> {
        let state = self.inner.state.lock().await;
        state.queues.get(name).map(|q| q.config.clone())
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("connects", &self.connection_count())
            .field("available", &!self.inner.unavailable.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

struct InMemoryConnector {
    broker: InMemoryBroker,
}

#[async_trait]
impl BrokerConnector for InMemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, MessagingError> {
        let shared = &self.broker.inner;
        if shared.unavailable.load(Ordering::SeqCst) {
            shared.failed_connects.fetch_add(1, Ordering::SeqCst);
            return Err(MessagingError::Connection(format!(
                "broker {} is unavailable",
                ADDRESS
            )));
        }

        let mut state = shared.state.lock().await;
        let id = state.next_id();
        let open = Arc::new(AtomicBool::new(true));
        let (closed_tx, closed_rx) = watch::channel(false);
        state.sessions.insert(
            id,
            Session {
                open: open.clone(),
                closed: closed_tx,
            },
        );
        shared.connects.fetch_add(1, Ordering::SeqCst);

        debug!(session = id, "Opened broker session");

        Ok(Arc::new(MemoryConnection {
            id,
            broker: self.broker.clone(),
            open,
            closed: closed_rx,
        }))
    }

    fn address(&self) -> &str {
        ADDRESS
    }
}

struct MemoryConnection {
    id: u64,
    broker: InMemoryBroker,
    open: Arc<AtomicBool>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn channel(&self) -> Result<Box<dyn BrokerChannel>, MessagingError> {
        let mut state = self.broker.inner.state.lock().await;
        if !state.sessions.contains_key(&self.id) {
            return Err(MessagingError::Connection("connection is closed".to_string()));
        }

        let id = state.next_id();
        state.channels.insert(id, self.id);

        Ok(Box::new(MemoryChannel {
            id,
            broker: self.broker.clone(),
        }))
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn closed(&self) {
        let mut closed = self.closed.clone();
        // A dropped sender means the broker itself is gone.
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

struct MemoryChannel {
    id: u64,
    broker: InMemoryBroker,
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_exchange(&self, config: &ExchangeConfig) -> Result<(), MessagingError> {
        let mut state = self.broker.inner.state.lock().await;
        state.check_channel(self.id)?;

        match state.exchanges.get(&config.name) {
            Some(existing) if existing != config => Err(MessagingError::Setup(format!(
                "PRECONDITION_FAILED - inequivalent arg for exchange '{}'",
                config.name
            ))),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(config.name.clone(), config.clone());
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, config: &QueueConfig) -> Result<(), MessagingError> {
        let mut state = self.broker.inner.state.lock().await;
        state.check_channel(self.id)?;

        match state.queues.get(&config.name) {
            Some(existing) if existing.config != *config => Err(MessagingError::Setup(format!(
                "PRECONDITION_FAILED - inequivalent arg for queue '{}'",
                config.name
            ))),
            Some(_) => Ok(()),
            None => {
                state
                    .queues
                    .insert(config.name.clone(), QueueState::new(config.clone()));
                Ok(())
            }
        }
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError> {
        let mut state = self.broker.inner.state.lock().await;
        state.check_channel(self.id)?;

        if !state.exchanges.contains_key(exchange) {
            return Err(MessagingError::Setup(format!(
                "NOT_FOUND - no exchange '{}'",
                exchange
            )));
        }
        if !state.queues.contains_key(queue) {
            return Err(MessagingError::Setup(format!(
                "NOT_FOUND - no queue '{}'",
                queue
            )));
        }

        let exists = state
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.exchange == exchange && b.pattern == routing_key);
        if !exists {
            state.bindings.push(Binding {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                pattern: routing_key.to_string(),
            });
        }

        Ok(())
    }

    async fn publish(&self, exchange: &str, envelope: &Envelope) -> Result<(), MessagingError> {
        let mut state = self.broker.inner.state.lock().await;
        state.check_channel(self.id)?;
        state.route(exchange, envelope, &self.broker).map(|_| ())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, MessagingError> {
        let mut state = self.broker.inner.state.lock().await;
        state.check_channel(self.id)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let target = state.queues.get_mut(queue).ok_or_else(|| {
            MessagingError::Setup(format!("NOT_FOUND - no queue '{}'", queue))
        })?;
        target.consumers.push(Consumer {
            channel: self.id,
            tag: consumer_tag.to_string(),
            tx,
        });
        debug!(queue, consumer_tag, "Registered consumer");

        state.dispatch(queue, &self.broker);

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    async fn close(&self) -> Result<(), MessagingError> {
        let mut state = self.broker.inner.state.lock().await;
        state.check_channel(self.id)?;
        state.close_channel(self.id, &self.broker);
        Ok(())
    }
}

struct MemoryAcker {
    broker: InMemoryBroker,
    queue: String,
    tag: u64,
}

impl MemoryAcker {
    async fn settle(&self, requeue: Option<bool>) -> Result<(), MessagingError> {
        let mut guard = self.broker.inner.state.lock().await;
        let state = &mut *guard;

        let pending = state
            .queues
            .get_mut(&self.queue)
            .and_then(|queue| queue.unacked.remove(&self.tag))
            .ok_or_else(|| {
                MessagingError::Acknowledge(format!(
                    "unknown delivery tag {} on queue {}",
                    self.tag, self.queue
                ))
            })?;

        if requeue == Some(true) {
            if let Some(queue) = state.queues.get_mut(&self.queue) {
                queue.ready.push_front(Stored {
                    envelope: pending.message.envelope,
                    redelivered: true,
                });
            }
            state.dispatch(&self.queue, &self.broker);
        } else if requeue == Some(false) {
            trace!(queue = %self.queue, tag = self.tag, "Discarded rejected message");
        }

        Ok(())
    }
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(&self) -> Result<(), MessagingError> {
        self.settle(None).await
    }

    async fn reject(&self, requeue: bool) -> Result<(), MessagingError> {
        self.settle(Some(requeue)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;

    async fn open_channel(broker: &InMemoryBroker) -> (Arc<dyn BrokerConnection>, Box<dyn BrokerChannel>) {
        let connection = broker.connector().connect().await.unwrap();
        let channel = connection.channel().await.unwrap();
        (connection, channel)
    }

    async fn setup_queue(channel: &dyn BrokerChannel, queue: &str, keys: &[&str]) {
        channel
            .declare_exchange(&ExchangeConfig::topic("myevents"))
            .await
            .unwrap();
        channel
            .declare_queue(&QueueConfig::durable(queue))
            .await
            .unwrap();
        for key in keys {
            channel.bind_queue(queue, "myevents", key).await.unwrap();
        }
    }

    async fn next(stream: &mut DeliveryStream) -> Delivery {
        tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("delivery timed out")
            .expect("stream ended")
            .unwrap()
    }

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("event.created", "event.created"));
        assert!(!topic_matches("event.created", "event.booked"));
        assert!(topic_matches("event.*", "event.booked"));
        assert!(!topic_matches("event.*", "event.booked.late"));
        assert!(topic_matches("#", "user.created"));
        assert!(topic_matches("event.#", "event"));
        assert!(topic_matches("event.#", "event.booked.late"));
        assert!(topic_matches("*.created", "location.created"));
        assert!(!topic_matches("*.created", "created"));
    }

    #[tokio::test]
    async fn test_routes_by_binding() {
        let broker = InMemoryBroker::new();
        let (_conn, channel) = open_channel(&broker).await;
        setup_queue(channel.as_ref(), "bookings", &["event.created", "event.booked"]).await;
        setup_queue(channel.as_ref(), "users", &["user.*"]).await;

        channel
            .publish("myevents", &Envelope::new("event.created", b"{}".to_vec()))
            .await
            .unwrap();
        channel
            .publish("myevents", &Envelope::new("user.created", b"{}".to_vec()))
            .await
            .unwrap();
        channel
            .publish("myevents", &Envelope::new("location.created", b"{}".to_vec()))
            .await
            .unwrap();

        assert_eq!(broker.ready("bookings").await.len(), 1);
        assert_eq!(broker.ready("users").await[0].routing_key, "user.created");
        assert_eq!(broker.published().await.len(), 3);
    }

    #[tokio::test]
    async fn test_published_log_keeps_latest() {
        let broker = InMemoryBroker::new();
        let (_conn, channel) = open_channel(&broker).await;
        setup_queue(channel.as_ref(), "users", &["user.created"]).await;

        let total = PUBLISHED_LOG_LIMIT + 5;
        for i in 0..total {
            broker
                .publish("myevents", Envelope::new(format!("location.{i}"), b"{}".to_vec()))
                .await
                .unwrap();
        }

        let published = broker.published().await;
        assert_eq!(published.len(), PUBLISHED_LOG_LIMIT);
        assert_eq!(published[0].routing_key, "location.5");
        assert_eq!(
            published[PUBLISHED_LOG_LIMIT - 1].routing_key,
            format!("location.{}", total - 1)
        );
        assert!(broker.ready("users").await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_to_missing_exchange_fails() {
        let broker = InMemoryBroker::new();
        let (_conn, channel) = open_channel(&broker).await;

        let err = channel
            .publish("nowhere", &Envelope::new("a", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Publish(_)));
    }

    #[tokio::test]
    async fn test_declarations_are_idempotent() {
        let broker = InMemoryBroker::new();
        let (_conn, channel) = open_channel(&broker).await;
        setup_queue(channel.as_ref(), "events", &["event.created"]).await;
        setup_queue(channel.as_ref(), "events", &["event.created"]).await;

        assert_eq!(broker.bindings("events", "myevents").await, vec!["event.created"]);
        assert_eq!(broker.queue("events").await, Some(QueueConfig::durable("events")));

        let mut other = ExchangeConfig::topic("myevents");
        other.kind = ExchangeKind::Fanout;
        let err = channel.declare_exchange(&other).await.unwrap_err();
        assert!(matches!(err, MessagingError::Setup(_)));
    }

    #[tokio::test]
    async fn test_bind_requires_declarations() {
        let broker = InMemoryBroker::new();
        let (_conn, channel) = open_channel(&broker).await;

        let err = channel
            .bind_queue("events", "myevents", "event.created")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no exchange"));
    }

    #[tokio::test]
    async fn test_ack_and_reject() {
        let broker = InMemoryBroker::new();
        let (_conn, channel) = open_channel(&broker).await;
        setup_queue(channel.as_ref(), "events", &["#"]).await;

        for key in ["a", "b", "c"] {
            broker
                .publish("myevents", Envelope::new(key, Vec::new()))
                .await
                .unwrap();
        }

        let mut deliveries = channel.consume("events", "test").await.unwrap();
        let first = next(&mut deliveries).await;
        let second = next(&mut deliveries).await;
        let third = next(&mut deliveries).await;
        assert_eq!(broker.unacked("events").await, 3);

        first.ack().await.unwrap();
        second.reject(false).await.unwrap();
        third.reject(true).await.unwrap();

        let again = next(&mut deliveries).await;
        assert_eq!(again.envelope.routing_key, "c");
        assert!(again.redelivered);

        assert!(first.ack().await.is_err());
        again.ack().await.unwrap();
        assert_eq!(broker.unacked("events").await, 0);
        assert!(broker.ready("events").await.is_empty());
    }

    #[tokio::test]
    async fn test_unacked_requeued_on_disconnect() {
        let broker = InMemoryBroker::new();
        let (connection, channel) = open_channel(&broker).await;
        setup_queue(channel.as_ref(), "events", &["event.created"]).await;

        broker
            .publish("myevents", Envelope::new("event.created", b"1".to_vec()))
            .await
            .unwrap();

        let mut deliveries = channel.consume("events", "test").await.unwrap();
        let delivery = next(&mut deliveries).await;
        assert!(!delivery.redelivered);

        broker.disconnect_all().await;

        assert!(!connection.is_connected());
        connection.closed().await;
        assert!(deliveries.next().await.is_none());
        assert!(delivery.ack().await.is_err());
        assert!(channel.publish("myevents", &Envelope::new("x", Vec::new())).await.is_err());
        assert!(connection.channel().await.is_err());

        let (_conn, channel) = open_channel(&broker).await;
        let mut deliveries = channel.consume("events", "test").await.unwrap();
        let again = next(&mut deliveries).await;
        assert_eq!(again.envelope.body, b"1".to_vec());
        assert!(again.redelivered);
    }

    #[tokio::test]
    async fn test_round_robin_between_consumers() {
        let broker = InMemoryBroker::new();
        let (_c1, first) = open_channel(&broker).await;
        let (_c2, second) = open_channel(&broker).await;
        setup_queue(first.as_ref(), "events", &["#"]).await;

        let mut a = first.consume("events", "a").await.unwrap();
        let mut b = second.consume("events", "b").await.unwrap();
        assert_eq!(broker.consumer_count("events").await, 2);

        broker
            .publish("myevents", Envelope::new("one", Vec::new()))
            .await
            .unwrap();
        broker
            .publish("myevents", Envelope::new("two", Vec::new()))
            .await
            .unwrap();

        assert_eq!(next(&mut a).await.envelope.routing_key, "one");
        assert_eq!(next(&mut b).await.envelope.routing_key, "two");
    }

    #[tokio::test]
    async fn test_unavailable_broker_refuses_connects() {
        let broker = InMemoryBroker::new();
        broker.set_available(false);

        let err = broker.connector().connect().await.err().unwrap();
        assert!(err.is_connection_error());
        assert_eq!(broker.failed_connects(), 1);
        assert_eq!(broker.connection_count(), 0);

        broker.set_available(true);
        assert!(broker.connector().connect().await.is_ok());
        assert_eq!(broker.open_sessions().await, 1);
    }
}
