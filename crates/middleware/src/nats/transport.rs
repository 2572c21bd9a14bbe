use std::collections::HashMap;
use std::time::Duration;

use async_nats::connection::State;
use async_nats::jetstream::stream::{Config, RetentionPolicy, StorageType};
use async_nats::jetstream::{self, Context};
use async_nats::{Client, ConnectErrorKind, ConnectOptions, HeaderMap};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{Subscription, Transport, TransportMessage};

/// Limit on a single connect attempt; the supervisor retries on its own schedule
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long relayed events stay in the JetStream stream
const STREAM_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

fn to_headers(headers: Option<HeaderMap>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(headers) = headers {
        for (name, values) in headers.iter() {
            if let Some(value) = values.last() {
                out.insert(name.to_string(), value.to_string());
            }
        }
    }
    out
}

struct NatsSubscription {
    subscriber: async_nats::Subscriber,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next(&mut self) -> Result<TransportMessage, TransportError> {
        let msg = self
            .subscriber
            .next()
            .await
            .ok_or_else(|| TransportError::SubscribeFailed("subscription closed".to_string()))?;

        Ok(TransportMessage {
            subject: msg.subject.to_string(),
            payload: msg.payload,
            headers: to_headers(msg.headers),
            sequence: None,
        })
    }
}

/// Relay link to a NATS server
pub struct NatsTransport {
    client: Client,
    jetstream: Context,
}

impl NatsTransport {
    /// Connect once, without client-side retries. `name` shows up in the
    /// server's connection list.
    pub async fn connect(url: &str, name: &str) -> Result<Self, TransportError> {
        let client = ConnectOptions::new()
            .name(name)
            .connection_timeout(CONNECT_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| match e.kind() {
                ConnectErrorKind::TimedOut => TransportError::Timeout(CONNECT_TIMEOUT),
                _ => TransportError::ConnectionFailed(format!("{}: {}", url, e)),
            })?;
        debug!(url = %url, name = %name, "NATS connected");

        let jetstream = jetstream::new(client.clone());
        Ok(Self { client, jetstream })
    }

    /// Create the stream if it does not exist. Messages carrying the same
    /// `Nats-Msg-Id` within `duplicate_window` are stored once.
    pub async fn ensure_stream(
        &self,
        stream_name: &str,
        subjects: Vec<String>,
        duplicate_window: Duration,
    ) -> Result<(), TransportError> {
        let config = Config {
            name: stream_name.to_string(),
            subjects,
            retention: RetentionPolicy::Limits,
            storage: StorageType::File,
            max_age: STREAM_MAX_AGE,
            duplicate_window,
            ..Default::default()
        };

        self.jetstream
            .get_or_create_stream(config)
            .await
            .map_err(|e| TransportError::StreamFailed(format!("{}: {}", stream_name, e)))?;
        Ok(())
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))
    }

    async fn publish_with_headers(
        &self,
        subject: &str,
        payload: Bytes,
        headers: HashMap<String, String>,
    ) -> Result<(), TransportError> {
        let mut nats_headers = HeaderMap::new();
        for (k, v) in headers {
            nats_headers.insert(k.as_str(), v.as_str());
        }

        self.client
            .publish_with_headers(subject.to_string(), nats_headers, payload)
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))
    }

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>, TransportError> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;
        Ok(Box::new(NatsSubscription { subscriber }))
    }

    fn is_connected(&self) -> bool {
        matches!(self.client.connection_state(), State::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests marked #[ignore] need a local server:
    //   docker run -p 4222:4222 nats:latest -js

    #[tokio::test]
    #[ignore]
    async fn test_dedup_header_reaches_subscriber() {
        let transport = NatsTransport::connect("nats://localhost:4222", "mdrelay-test")
            .await
            .unwrap();
        assert!(transport.is_connected());

        let mut sub = transport.subscribe("test.Kraken-BTC-USD.trade").await.unwrap();
        let headers = HashMap::from([("Nats-Msg-Id".to_string(), "Kraken-BTC-USD-7".to_string())]);
        transport
            .publish_with_headers("test.Kraken-BTC-USD.trade", Bytes::from("{}"), headers)
            .await
            .unwrap();

        let msg = sub.next().await.unwrap();
        assert_eq!(msg.header("Nats-Msg-Id"), Some("Kraken-BTC-USD-7"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_ensure_stream_is_idempotent() {
        let transport = NatsTransport::connect("nats://localhost:4222", "mdrelay-test")
            .await
            .unwrap();
        for _ in 0..2 {
            transport
                .ensure_stream(
                    "MDRELAY_TEST",
                    vec!["test.>".to_string()],
                    Duration::from_secs(120),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Nothing listens on port 1
        let result = NatsTransport::connect("nats://127.0.0.1:1", "mdrelay-test").await;
        match result {
            Err(TransportError::ConnectionFailed(reason)) => {
                assert!(reason.starts_with("nats://127.0.0.1:1"))
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connect should fail"),
        }
    }

    #[test]
    fn test_headers_from_nats() {
        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", "a-1");
        let converted = to_headers(Some(headers));
        assert_eq!(converted.get("Nats-Msg-Id").map(String::as_str), Some("a-1"));
        assert!(to_headers(None).is_empty());
    }
}
