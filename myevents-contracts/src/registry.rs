//! Name-to-shape registry used by listeners to decode incoming payloads.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::contracts::{EventBooked, EventCreated, LocationCreated, UserCreated};
use crate::error::ContractError;
use crate::event::{EventContract, EventKind};

type DecodeFn = fn(&[u8]) -> Result<EventKind, serde_json::Error>;
type EmptyFn = fn() -> EventKind;

/// Process-wide registry of every contract shipped with this crate.
static STANDARD: Lazy<ContractRegistry> = Lazy::new(|| {
    let mut registry = ContractRegistry::new();
    registry.insert::<EventCreated>();
    registry.insert::<EventBooked>();
    registry.insert::<UserCreated>();
    registry.insert::<LocationCreated>();
    registry
});

#[derive(Clone, Copy)]
struct Contract {
    empty: EmptyFn,
    decode: DecodeFn,
}

fn empty_of<E: EventContract>() -> EventKind {
    E::default().into()
}

fn decode_as<E: EventContract>(body: &[u8]) -> Result<EventKind, serde_json::Error> {
    serde_json::from_slice::<E>(body).map(Into::into)
}

/// Maps event names to the concrete shape used to decode them.
#[derive(Clone, Default)]
pub struct ContractRegistry {
    contracts: HashMap<&'static str, Contract>,
}

impl ContractRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `event.created`, `event.booked`, `user.created` and
    /// `location.created`.
    pub fn standard() -> &'static ContractRegistry {
        &STANDARD
    }

    /// Register a contract under its name.
    ///
    /// A name maps to exactly one shape, so registering a second shape under
    /// an existing name fails.
    pub fn register<E: EventContract>(&mut self) -> Result<(), ContractError> {
        if self.contracts.contains_key(E::NAME) {
            return Err(ContractError::Duplicate(E::NAME.to_string()));
        }
        self.insert::<E>();
        Ok(())
    }

    fn insert<E: EventContract>(&mut self) {
        self.contracts.insert(
            E::NAME,
            Contract {
                empty: empty_of::<E>,
                decode: decode_as::<E>,
            },
        );
    }

    /// Zero-value instance of the variant registered under `name`.
    pub fn resolve(&self, name: &str) -> Option<EventKind> {
        self.contracts.get(name).map(|contract| (contract.empty)())
    }

    /// Decode `body` into the variant registered under `name`.
    pub fn decode(&self, name: &str, body: &[u8]) -> Result<EventKind, ContractError> {
        let contract = self
            .contracts
            .get(name)
            .ok_or_else(|| ContractError::UnknownEvent(name.to_string()))?;

        (contract.decode)(body).map_err(|source| ContractError::Decode {
            name: name.to_string(),
            source,
        })
    }

    /// Check whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.contracts.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

impl std::fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("names", &self.names())
            .finish()
    }
}
