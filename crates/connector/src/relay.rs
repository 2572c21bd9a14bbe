//! NATS relay sink
//!
//! Publishes each event as JSON on `{prefix}.{channel}.trade|ticker|time`.
//! Trades carry a `Nats-Msg-Id` header so a JetStream stream drops the
//! trades an exchange replays after a reconnect.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mdrelay_metadata::RelayConfig;
use mdrelay_middleware::{MiddlewareFactory, SubjectBuilder, Transport};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::RelayError;
use crate::event::{ServerTime, Ticker, Trade};
use crate::traits::RelaySink;

/// JetStream deduplication header
pub const MSG_ID_HEADER: &str = "Nats-Msg-Id";

pub struct NatsRelay {
    config: RelayConfig,
    prefix: String,
    transport: Option<Arc<dyn Transport>>,
    subjects: Option<SubjectBuilder>,
    last_error: Option<String>,
}

impl NatsRelay {
    pub fn new(config: RelayConfig, prefix: impl Into<String>) -> Self {
        Self {
            config,
            prefix: prefix.into(),
            transport: None,
            subjects: None,
            last_error: None,
        }
    }

    /// A relay that is already open on `transport` for `channel_name`
    pub fn with_transport(
        config: RelayConfig,
        prefix: impl Into<String>,
        channel_name: &str,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let mut relay = Self::new(config, prefix);
        relay.subjects = Some(relay.subjects_for(channel_name));
        relay.transport = Some(transport);
        relay
    }

    pub fn subjects(&self) -> Option<&SubjectBuilder> {
        self.subjects.as_ref()
    }

    fn subjects_for(&self, channel_name: &str) -> SubjectBuilder {
        match &self.config.stream {
            Some(stream) => SubjectBuilder::with_stream(&self.prefix, channel_name, stream.as_str()),
            None => SubjectBuilder::new(&self.prefix, channel_name),
        }
    }

    async fn publish<T: Serialize + Sync>(
        &mut self,
        subject_of: fn(&SubjectBuilder) -> &str,
        event: &T,
        msg_id: Option<String>,
    ) -> Result<(), RelayError> {
        let payload = serde_json::to_vec(event).map_err(|e| RelayError::Encode(e.to_string()))?;

        let result = match (&self.transport, &self.subjects) {
            (Some(transport), Some(subjects)) if transport.is_connected() => {
                let subject = subject_of(subjects);
                let sent = match msg_id {
                    Some(id) => {
                        let headers = HashMap::from([(MSG_ID_HEADER.to_string(), id)]);
                        transport
                            .publish_with_headers(subject, payload.into(), headers)
                            .await
                    }
                    None => transport.publish(subject, payload.into()).await,
                };
                sent.map_err(|e| RelayError::SendFailed(e.to_string()))
            }
            _ => Err(RelayError::NotConnected),
        };

        if let Err(e) = &result {
            warn!(error = %e, "Relay link lost");
            self.last_error = Some(e.to_string());
            self.transport = None;
        }
        result
    }
}

#[async_trait]
impl RelaySink for NatsRelay {
    async fn connect(&mut self, port: u16, channel_name: &str) -> Result<(), RelayError> {
        let subjects = self.subjects_for(channel_name);
        match MiddlewareFactory::connect_transport(&self.config, port, &subjects).await {
            Ok(transport) => {
                info!(
                    url = %self.config.url(port),
                    subjects = %subjects.all(),
                    "Relay channel open"
                );
                self.transport = Some(transport);
                self.subjects = Some(subjects);
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.last_error = Some(reason.clone());
                self.transport = None;
                Err(RelayError::ConnectionFailed(reason))
            }
        }
    }

    fn is_open(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|transport| transport.is_connected())
    }

    async fn send_trade(&mut self, trade: &Trade) -> Result<(), RelayError> {
        let msg_id = self
            .subjects
            .as_ref()
            .map(|s| format!("{}-{}", s.channel_token(), trade.id));
        self.publish(SubjectBuilder::trade, trade, msg_id).await
    }

    async fn send_ticker(&mut self, ticker: &Ticker) -> Result<(), RelayError> {
        self.publish(SubjectBuilder::ticker, ticker, None).await
    }

    async fn send_server_time(&mut self, time: &ServerTime) -> Result<(), RelayError> {
        self.publish(SubjectBuilder::server_time, time, None).await
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Side;
    use mdrelay_metadata::TransportType;
    use mdrelay_middleware::{InMemoryTransport, Subscription};

    const CHANNEL: &str = "Kraken/BTC/USD";

    fn memory_config() -> RelayConfig {
        RelayConfig {
            transport_type: TransportType::Memory,
            host: "127.0.0.1".to_string(),
            port: 40123,
            subject_prefix: None,
            stream: None,
            duplicate_window_secs: 60,
        }
    }

    fn trade() -> Trade {
        Trade {
            id: 77,
            time: 1_770_379_200_000,
            price: 97000.0,
            amount: 0.1,
            side: Side::Buy,
        }
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let mut relay = NatsRelay::new(memory_config(), "dev");
        assert!(!relay.is_open());
        relay.connect(40123, CHANNEL).await.unwrap();
        assert!(relay.is_open());
        assert_eq!(relay.subjects().unwrap().trade(), "dev.Kraken-BTC-USD.trade");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let config = RelayConfig {
            transport_type: TransportType::Nats,
            ..memory_config()
        };
        let mut relay = NatsRelay::new(config, "dev");
        let result = relay.connect(1, CHANNEL).await;
        assert!(matches!(result, Err(RelayError::ConnectionFailed(_))));
        assert!(!relay.is_open());
        assert!(relay.last_error().is_some());
    }

    #[tokio::test]
    async fn test_trade_published_with_dedup_id() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut sub = transport.subscribe("dev.Kraken-BTC-USD.trade").await.unwrap();
        let mut relay = NatsRelay::with_transport(memory_config(), "dev", CHANNEL, transport);

        relay.send_trade(&trade()).await.unwrap();

        let msg = sub.next().await.unwrap();
        assert_eq!(
            msg.headers.get(MSG_ID_HEADER).map(String::as_str),
            Some("Kraken-BTC-USD-77")
        );
        let decoded: Trade = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(decoded, trade());
    }

    #[tokio::test]
    async fn test_ticker_and_time_subjects() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut tickers = transport.subscribe("dev.Kraken-BTC-USD.ticker").await.unwrap();
        let mut times = transport.subscribe("dev.Kraken-BTC-USD.time").await.unwrap();
        let mut relay = NatsRelay::with_transport(memory_config(), "dev", CHANNEL, transport);

        let ticker = Ticker {
            time: 5,
            bid: 1.0,
            ask: 2.0,
            last: 1.5,
        };
        relay.send_ticker(&ticker).await.unwrap();
        relay.send_server_time(&ServerTime { time: 9 }).await.unwrap();

        let msg = tickers.next().await.unwrap();
        assert!(msg.headers.is_empty());
        assert_eq!(serde_json::from_slice::<Ticker>(&msg.payload).unwrap(), ticker);

        let msg = times.next().await.unwrap();
        assert_eq!(
            serde_json::from_slice::<ServerTime>(&msg.payload).unwrap(),
            ServerTime { time: 9 }
        );
    }

    #[tokio::test]
    async fn test_send_failure_closes_relay() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut relay =
            NatsRelay::with_transport(memory_config(), "dev", CHANNEL, transport.clone());
        assert!(relay.is_open());

        transport.disconnect();
        assert!(!relay.is_open());

        let ticker = Ticker {
            time: 1,
            bid: 1.0,
            ask: 1.0,
            last: 1.0,
        };
        assert_eq!(
            relay.send_ticker(&ticker).await,
            Err(RelayError::NotConnected)
        );
        assert!(relay.last_error().is_some());

        // The link stays closed until the next connect
        transport.reconnect();
        assert!(!relay.is_open());
    }
}
