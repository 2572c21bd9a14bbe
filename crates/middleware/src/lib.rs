//! mdrelay-middleware: Pluggable transport for the relay link
//!
//! Provides a trait-based Transport abstraction with a NATS implementation
//! and an in-memory implementation for testing.

pub mod error;
pub mod factory;
pub mod memory;
pub mod nats;
pub mod transport;

pub use error::TransportError;
pub use factory::{FactoryError, MiddlewareFactory};
pub use memory::InMemoryTransport;
pub use nats::{sanitize_subject_token, NatsTransport, SubjectBuilder};
pub use transport::{Subscription, Transport, TransportMessage};
