//! Service runtime errors

use myevents_config::ConfigError;
use myevents_messaging::MessagingError;
use myevents_persistence::PersistenceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
