//! Persistence errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// No record of `kind` with this id
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// A record of `kind` with this id already exists
    #[error("{kind} {id} already exists")]
    Duplicate { kind: &'static str, id: String },

    /// The database type has no adapter in this build
    #[error("unsupported database type: {0}")]
    Unsupported(String),

    /// Storage backend failure
    #[error("database error: {0}")]
    Backend(String),
}

impl PersistenceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PersistenceError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn duplicate(kind: &'static str, id: impl Into<String>) -> Self {
        PersistenceError::Duplicate {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::NotFound { .. })
    }
}
