//! Process-local relay link, used by tests and the `memory` transport type
mod transport;

pub use transport::InMemoryTransport;
