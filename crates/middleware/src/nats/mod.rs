//! Relay link over a NATS server, optionally backed by a JetStream stream

pub mod subjects;
mod transport;

pub use subjects::{sanitize_subject_token, SubjectBuilder};
pub use transport::{NatsTransport, CONNECT_TIMEOUT};
