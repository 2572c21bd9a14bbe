use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::error::TransportError;

/// A message as seen by a subscriber on the relay server
#[derive(Debug, Clone)]
pub struct TransportMessage {
    pub subject: String,
    pub payload: Bytes,
    pub headers: HashMap<String, String>,
    /// Publish order, when the transport assigns one
    pub sequence: Option<u64>,
}

impl TransportMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[async_trait]
pub trait Subscription: Send + Sync {
    /// Wait for the next message on the subscribed subject
    async fn next(&mut self) -> Result<TransportMessage, TransportError>;
}

/// Publishing side of the relay link
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Publish with headers, e.g. a JetStream dedup id
    async fn publish_with_headers(
        &self,
        subject: &str,
        payload: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<(), TransportError>;

    /// Subscribe to a subject or wildcard pattern
    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, TransportError>;

    /// Whether the underlying connection is currently usable
    fn is_connected(&self) -> bool {
        true
    }
}
