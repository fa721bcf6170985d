//! Error types for contract resolution

use thiserror::Error;

/// Errors raised while turning a named payload into an [`EventKind`](crate::EventKind)
#[derive(Error, Debug)]
pub enum ContractError {
    /// No contract is registered under the name
    #[error("event type {0} is unknown")]
    UnknownEvent(String),

    /// The body is not valid JSON for the registered shape
    #[error("could not decode event {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A second shape was registered under an existing name
    #[error("event type {0} is already registered")]
    Duplicate(String),
}

impl ContractError {
    /// Whether the error means the name itself was not recognized
    pub fn is_unknown_event(&self) -> bool {
        matches!(self, ContractError::UnknownEvent(_))
    }
}
