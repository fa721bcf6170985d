//! RabbitMQ transport over AMQP 0.9.1

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, options::*};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{ExchangeConfig, ExchangeKind, QueueConfig};
use crate::error::MessagingError;
use crate::message::{Acker, Delivery, Envelope, HeaderValue};
use crate::traits::{BrokerChannel, BrokerConnection, BrokerConnector, DeliveryStream};

/// How often a session's status is polled while waiting for it to close.
const STATUS_POLL: Duration = Duration::from_secs(1);

/// Opens AMQP connections to a RabbitMQ broker
pub struct RabbitMqConnector {
    url: String,
    address: String,
}

impl RabbitMqConnector {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let address = redact(&url);
        Self { url, address }
    }

    /// Shared connector for a [`ConnectionManager`](crate::ConnectionManager)
    pub fn shared(url: impl Into<String>) -> Arc<dyn BrokerConnector> {
        Arc::new(Self::new(url))
    }
}

/// Hide credentials in an AMQP URL
fn redact(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, host)) => format!("{}://***@{}", scheme, host),
            None => url.to_string(),
        },
        None => url.to_string(),
    }
}

#[async_trait]
impl BrokerConnector for RabbitMqConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, MessagingError> {
        debug!(address = %self.address, "Connecting to RabbitMQ");

        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        let (closed_tx, closed_rx) = watch::channel(false);
        connection.on_error(move |err| {
            warn!(error = %err, "RabbitMQ connection error");
            closed_tx.send_replace(true);
        });

        info!(address = %self.address, "Connected to RabbitMQ");

        Ok(Arc::new(RabbitMqConnection {
            connection,
            closed: closed_rx,
        }))
    }

    fn address(&self) -> &str {
        &self.address
    }
}

struct RabbitMqConnection {
    connection: Connection,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl BrokerConnection for RabbitMqConnection {
    async fn channel(&self) -> Result<Box<dyn BrokerChannel>, MessagingError> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| MessagingError::Channel(e.to_string()))?;
        Ok(Box::new(RabbitMqChannel { channel }))
    }

    fn is_connected(&self) -> bool {
        !*self.closed.borrow() && self.connection.status().connected()
    }

    async fn closed(&self) {
        let mut closed = self.closed.clone();
        let mut ticker = tokio::time::interval(STATUS_POLL);

        loop {
            tokio::select! {
                _ = closed.wait_for(|closed| *closed) => return,
                _ = ticker.tick() => {
                    if !self.connection.status().connected() {
                        return;
                    }
                }
            }
        }
    }
}

struct RabbitMqChannel {
    channel: Channel,
}

impl RabbitMqChannel {
    fn build_properties(envelope: &Envelope) -> BasicProperties {
        let mut props =
            BasicProperties::default().with_timestamp(envelope.timestamp.timestamp() as u64);

        if let Some(ref content_type) = envelope.content_type {
            props = props.with_content_type(content_type.clone().into());
        }

        if !envelope.headers.is_empty() {
            let mut headers = FieldTable::default();
            for (key, value) in &envelope.headers {
                headers.insert(key.clone().into(), to_amqp(value));
            }
            props = props.with_headers(headers);
        }

        props
    }
}

fn to_amqp(value: &HeaderValue) -> AMQPValue {
    match value {
        HeaderValue::String(s) => AMQPValue::LongString(s.clone().into()),
        HeaderValue::Bool(b) => AMQPValue::Boolean(*b),
        HeaderValue::Int(i) => AMQPValue::LongLongInt(*i),
        HeaderValue::Float(f) => AMQPValue::Double(*f),
        HeaderValue::Other(s) => AMQPValue::LongString(s.clone().into()),
    }
}

fn from_amqp(value: &AMQPValue) -> HeaderValue {
    match value {
        AMQPValue::LongString(s) => HeaderValue::String(s.to_string()),
        AMQPValue::ShortString(s) => HeaderValue::String(s.to_string()),
        AMQPValue::Boolean(b) => HeaderValue::Bool(*b),
        AMQPValue::ShortShortInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortShortUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongLongInt(i) => HeaderValue::Int(*i),
        AMQPValue::Float(f) => HeaderValue::Float(f64::from(*f)),
        AMQPValue::Double(f) => HeaderValue::Float(*f),
        AMQPValue::FieldArray(_) => HeaderValue::Other("array".to_string()),
        AMQPValue::FieldTable(_) => HeaderValue::Other("table".to_string()),
        AMQPValue::ByteArray(_) => HeaderValue::Other("byte array".to_string()),
        AMQPValue::Timestamp(_) => HeaderValue::Other("timestamp".to_string()),
        AMQPValue::Void => HeaderValue::Other("void".to_string()),
        _ => HeaderValue::Other("unsupported".to_string()),
    }
}

fn delivery_to_envelope(delivery: &lapin::message::Delivery) -> Envelope {
    let props = &delivery.properties;
    let mut headers = HashMap::new();

    if let Some(amqp_headers) = props.headers() {
        for (key, value) in amqp_headers.inner() {
            headers.insert(key.to_string(), from_amqp(value));
        }
    }

    Envelope {
        routing_key: delivery.routing_key.to_string(),
        headers,
        body: delivery.data.clone(),
        content_type: props.content_type().as_ref().map(|s| s.to_string()),
        timestamp: props
            .timestamp()
            .and_then(|ts| chrono::DateTime::from_timestamp(ts as i64, 0))
            .unwrap_or_else(chrono::Utc::now),
    }
}

#[async_trait]
impl BrokerChannel for RabbitMqChannel {
    async fn declare_exchange(&self, config: &ExchangeConfig) -> Result<(), MessagingError> {
        let kind = match config.kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        };
        let options = ExchangeDeclareOptions {
            durable: config.durable,
            auto_delete: config.auto_delete,
            internal: config.internal,
            ..Default::default()
        };

        self.channel
            .exchange_declare(&config.name, kind, options, FieldTable::default())
            .await
            .map_err(|e| MessagingError::Setup(e.to_string()))?;

        debug!(exchange = %config.name, kind = %config.kind, "Exchange declared");
        Ok(())
    }

    async fn declare_queue(&self, config: &QueueConfig) -> Result<(), MessagingError> {
        let options = QueueDeclareOptions {
            durable: config.durable,
            auto_delete: config.auto_delete,
            exclusive: config.exclusive,
            ..Default::default()
        };

        self.channel
            .queue_declare(&config.name, options, FieldTable::default())
            .await
            .map_err(|e| MessagingError::Setup(e.to_string()))?;

        debug!(queue = %config.name, "Queue declared");
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), MessagingError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Setup(e.to_string()))?;

        debug!(
            queue = queue,
            exchange = exchange,
            routing_key = routing_key,
            "Queue bound to exchange"
        );
        Ok(())
    }

    async fn publish(&self, exchange: &str, envelope: &Envelope) -> Result<(), MessagingError> {
        let props = Self::build_properties(envelope);

        self.channel
            .basic_publish(
                exchange,
                &envelope.routing_key,
                BasicPublishOptions::default(),
                &envelope.body,
                props,
            )
            .await
            .map_err(|e| MessagingError::Publish(e.to_string()))?;

        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, MessagingError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Setup(e.to_string()))?;

        let channel = self.channel.clone();
        let deliveries = consumer.map(move |item| {
            item.map(|delivery| {
                let envelope = delivery_to_envelope(&delivery);
                let acker = RabbitMqAcker {
                    channel: channel.clone(),
                    delivery_tag: delivery.delivery_tag,
                };
                Delivery::new(
                    envelope,
                    delivery.delivery_tag,
                    delivery.redelivered,
                    Box::new(acker),
                )
            })
            .map_err(|e| MessagingError::Channel(e.to_string()))
        });

        Ok(Box::pin(deliveries))
    }

    async fn close(&self) -> Result<(), MessagingError> {
        self.channel
            .close(200, "Normal shutdown")
            .await
            .map_err(|e| MessagingError::Channel(e.to_string()))
    }
}

struct RabbitMqAcker {
    channel: Channel,
    delivery_tag: u64,
}

#[async_trait]
impl Acker for RabbitMqAcker {
    async fn ack(&self) -> Result<(), MessagingError> {
        self.channel
            .basic_ack(self.delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| MessagingError::Acknowledge(e.to_string()))
    }

    async fn reject(&self, requeue: bool) -> Result<(), MessagingError> {
        self.channel
            .basic_reject(self.delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| MessagingError::Acknowledge(e.to_string()))
    }
}
