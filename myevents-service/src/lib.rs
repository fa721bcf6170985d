//! # MyEvents Service
//!
//! The event-processing half shared by the events, bookings and users
//! services. Each service owns a durable queue on the `myevents` exchange,
//! bound to the events it cares about, and writes what arrives to its
//! database.
//!
//! ```rust,no_run
//! use myevents_config::ServiceConfig;
//! use myevents_messaging::memory::InMemoryBroker;
//! use myevents_service::{ServiceKind, ServiceRuntime};
//!
//! # async fn example() -> myevents_service::Result<()> {
//! let broker = InMemoryBroker::new();
//! let runtime =
//!     ServiceRuntime::start(ServiceKind::Users, &ServiceConfig::default(), broker.connector())
//!         .await?;
//! runtime.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod processor;
pub mod profile;
pub mod runtime;

pub use error::{Result, ServiceError};
pub use processor::EventProcessor;
pub use profile::ServiceKind;
pub use runtime::ServiceRuntime;
