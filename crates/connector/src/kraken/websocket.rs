//! Kraken v2 WebSocket client
//!
//! Handles connection, subscription, and message receiving for Kraken's public v2 WebSocket API.
//! No authentication required for public channels (ticker, trade).

use std::collections::VecDeque;

use tracing::{debug, info, trace, warn};

use crate::kraken::messages::KrakenWsMessage;
use crate::websocket::{Keepalive, Step, WsError, WsLink, SUBSCRIPTION_TIMEOUT};

/// Kraken v2 public WebSocket URL
pub const KRAKEN_WS_URL: &str = "wss://ws.kraken.com/v2";

/// Kraken v2 WebSocket client
pub struct KrakenWebSocket {
    link: WsLink,
    /// Channel data that arrived while waiting for a subscription ack
    pending: VecDeque<KrakenWsMessage>,
}

impl KrakenWebSocket {
    pub async fn connect(url: &str) -> Result<Self, WsError> {
        Ok(Self {
            link: WsLink::connect(url).await?,
            pending: VecDeque::new(),
        })
    }

    /// Subscribe to a channel for one symbol
    ///
    /// Sends: `{"method":"subscribe","params":{"channel":"<channel>","symbol":["BTC/USD"],"snapshot":<bool>}}`
    pub async fn subscribe(
        &mut self,
        channel: &str,
        symbol: &str,
        snapshot: bool,
    ) -> Result<(), WsError> {
        let subscribe_msg = serde_json::json!({
            "method": "subscribe",
            "params": {
                "channel": channel,
                "symbol": [symbol],
                "snapshot": snapshot,
            }
        });
        debug!(channel = %channel, symbol = %symbol, "Sending Kraken subscribe command");
        self.link.send_json(&subscribe_msg).await?;

        match tokio::time::timeout(SUBSCRIPTION_TIMEOUT, self.wait_for_subscription(channel)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    channel = %channel,
                    timeout_secs = SUBSCRIPTION_TIMEOUT.as_secs(),
                    "Kraken subscription timeout"
                );
                Err(WsError::SubscriptionFailed(
                    "Timeout waiting for confirmation".into(),
                ))
            }
        }
    }

    async fn wait_for_subscription(&mut self, channel: &str) -> Result<(), WsError> {
        loop {
            let Some(text) = self.link.recv_text().await? else {
                continue;
            };
            match serde_json::from_str::<KrakenWsMessage>(&text) {
                Ok(KrakenWsMessage::SubscriptionResult { success, error, .. }) => {
                    if success {
                        info!(channel = %channel, "Kraken subscription confirmed");
                        return Ok(());
                    }
                    return Err(WsError::SubscriptionFailed(format!(
                        "Subscription to {} failed: {}",
                        channel,
                        error.unwrap_or_else(|| "no reason given".to_string())
                    )));
                }
                Ok(KrakenWsMessage::Heartbeat { .. }) => {
                    trace!("Received heartbeat while waiting for subscription");
                }
                Ok(msg @ KrakenWsMessage::ChannelMessage { .. }) => {
                    self.pending.push_back(msg);
                }
                Ok(_) => {
                    debug!(raw = %text, "Received non-subscription message while waiting");
                }
                Err(e) => {
                    warn!(error = %e, raw = %text, "Failed to parse message while waiting for subscription");
                }
            }
        }
    }

    /// Next message or ping deadline. Buffered channel data is returned first.
    pub async fn next_step(
        &mut self,
        keepalive: &Keepalive,
    ) -> Result<Step<KrakenWsMessage>, WsError> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Step::Frame(Some(msg)));
        }

        match self.link.next_step(keepalive).await? {
            Step::PingDue => Ok(Step::PingDue),
            Step::Frame(None) => Ok(Step::Frame(None)),
            Step::Frame(Some(text)) => match serde_json::from_str::<KrakenWsMessage>(&text) {
                Ok(msg) => {
                    trace!(msg = %text, "Received Kraken message");
                    Ok(Step::Frame(Some(msg)))
                }
                Err(e) => {
                    warn!(error = %e, text = %text, "Failed to parse Kraken message");
                    Ok(Step::Frame(None))
                }
            },
        }
    }

    /// Send app-level ping (not WS-level ping frame)
    ///
    /// Kraken v2 uses `{"method":"ping"}` for application-level keepalive. The
    /// pong carries the server clock in `time_out`.
    pub async fn ping(&mut self, req_id: u64) -> Result<(), WsError> {
        let ping_msg = serde_json::json!({"method": "ping", "req_id": req_id});
        self.link.send_json(&ping_msg).await
    }

    pub async fn close(&mut self) -> Result<(), WsError> {
        self.link.close().await
    }
}
