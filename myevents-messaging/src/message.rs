//! Messages as they travel through the broker

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use myevents_contracts::{EVENT_NAME_HEADER, Event};

use crate::error::MessagingError;

/// A header value carried alongside a message body
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Anything else, described by its wire type
    Other(String),
}

impl HeaderValue {
    /// The string payload, if this is a string header
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Human readable name of the value's type
    pub fn type_name(&self) -> &str {
        match self {
            HeaderValue::String(_) => "string",
            HeaderValue::Bool(_) => "bool",
            HeaderValue::Int(_) => "int",
            HeaderValue::Float(_) => "float",
            HeaderValue::Other(kind) => kind,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::String(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

/// An outgoing or incoming message
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Routing key the message was published with
    pub routing_key: String,
    /// Message headers
    pub headers: HashMap<String, HeaderValue>,
    /// Raw body
    pub body: Vec<u8>,
    /// Content type of the body
    pub content_type: Option<String>,
    /// Time the message was created
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Create an envelope with a raw body
    pub fn new(routing_key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            routing_key: routing_key.into(),
            headers: HashMap::new(),
            body: body.into(),
            content_type: None,
            timestamp: Utc::now(),
        }
    }

    /// JSON envelope for an event: body is the bare payload, routing key and
    /// `x-event-name` header are the event name.
    pub fn for_event<E: Event + ?Sized>(event: &E) -> Result<Self, MessagingError> {
        let name = event.event_name();
        let body = serde_json::to_vec(event)?;

        Ok(Self::new(name, body)
            .with_header(EVENT_NAME_HEADER, name)
            .with_content_type("application/json"))
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Get a header value
    pub fn header(&self, key: &str) -> Option<&HeaderValue> {
        self.headers.get(key)
    }

    /// The `x-event-name` header, if present
    pub fn event_name(&self) -> Option<&HeaderValue> {
        self.header(EVENT_NAME_HEADER)
    }
}

/// Settles a delivery with the broker.
#[async_trait]
pub trait Acker: Send + Sync {
    /// Positively acknowledge the delivery
    async fn ack(&self) -> Result<(), MessagingError>;

    /// Reject the delivery, optionally putting it back on the queue
    async fn reject(&self, requeue: bool) -> Result<(), MessagingError>;
}

/// A message handed to a consumer, pending acknowledgement
pub struct Delivery {
    pub envelope: Envelope,
    pub delivery_tag: u64,
    pub redelivered: bool,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(
        envelope: Envelope,
        delivery_tag: u64,
        redelivered: bool,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            envelope,
            delivery_tag,
            redelivered,
            acker,
        }
    }

    /// Acknowledge the delivery
    pub async fn ack(&self) -> Result<(), MessagingError> {
        self.acker.ack().await
    }

    /// Reject the delivery
    pub async fn reject(&self, requeue: bool) -> Result<(), MessagingError> {
        self.acker.reject(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("envelope", &self.envelope)
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}
