//! Error types for messaging operations

use myevents_contracts::ContractError;
use thiserror::Error;

/// Errors that can occur during messaging operations
#[derive(Error, Debug)]
pub enum MessagingError {
    /// Broker unreachable, or the connection is known to be down
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Declaring or binding an exchange/queue failed
    #[error("Setup failed: {0}")]
    Setup(String),

    /// A delivery could not be turned into an event
    #[error("{0}")]
    Decode(String),

    /// A delivery named an event that is not registered
    #[error("event type {0} is unknown")]
    UnknownEvent(String),

    /// Failed to serialize an outgoing payload
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Failed to publish a message
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Failed to acknowledge or reject a delivery
    #[error("Acknowledge failed: {0}")]
    Acknowledge(String),

    /// Channel is closed or could not be opened
    #[error("Channel closed: {0}")]
    Channel(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Internal broker error
    #[error("Broker error: {0}")]
    Broker(String),
}

impl MessagingError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MessagingError::Connection(_)
                | MessagingError::Setup(_)
                | MessagingError::Channel(_)
                | MessagingError::Broker(_)
        )
    }

    /// Check if this error indicates a connection issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            MessagingError::Connection(_) | MessagingError::Channel(_)
        )
    }

    /// Check if this error was produced by a bad delivery
    pub fn is_message_error(&self) -> bool {
        matches!(
            self,
            MessagingError::Decode(_) | MessagingError::UnknownEvent(_)
        )
    }

    pub(crate) fn setup(context: impl std::fmt::Display, err: MessagingError) -> Self {
        match err {
            MessagingError::Setup(_) => err,
            other => MessagingError::Setup(format!("{}: {}", context, other)),
        }
    }
}

impl From<ContractError> for MessagingError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::UnknownEvent(name) => MessagingError::UnknownEvent(name),
            ContractError::Decode { .. } => MessagingError::Decode(err.to_string()),
            ContractError::Duplicate(_) => MessagingError::Configuration(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::Serialization(err.to_string())
    }
}

#[cfg(feature = "rabbitmq")]
impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        MessagingError::Broker(err.to_string())
    }
}
