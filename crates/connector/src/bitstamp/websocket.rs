//! Bitstamp v2 WebSocket client

use std::collections::VecDeque;

use tracing::{debug, info, trace, warn};

use crate::bitstamp::messages::{BitstampMessage, EVENT_ERROR, EVENT_HEARTBEAT, EVENT_SUBSCRIBED};
use crate::websocket::{Keepalive, Step, WsError, WsLink, SUBSCRIPTION_TIMEOUT};

/// Bitstamp v2 public WebSocket URL
pub const BITSTAMP_WS_URL: &str = "wss://ws.bitstamp.net";

pub struct BitstampWebSocket {
    link: WsLink,
    /// Data that arrived while waiting for a subscription ack
    pending: VecDeque<BitstampMessage>,
}

impl BitstampWebSocket {
    pub async fn connect(url: &str) -> Result<Self, WsError> {
        Ok(Self {
            link: WsLink::connect(url).await?,
            pending: VecDeque::new(),
        })
    }

    /// Sends `{"event":"bts:subscribe","data":{"channel":"<channel>"}}` and
    /// waits for `bts:subscription_succeeded` on that channel.
    pub async fn subscribe(&mut self, channel: &str) -> Result<(), WsError> {
        let subscribe_msg = serde_json::json!({
            "event": "bts:subscribe",
            "data": { "channel": channel },
        });
        debug!(channel = %channel, "Sending Bitstamp subscribe command");
        self.link.send_json(&subscribe_msg).await?;

        match tokio::time::timeout(SUBSCRIPTION_TIMEOUT, self.wait_for_subscription(channel)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(channel = %channel, "Bitstamp subscription timeout");
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
            let msg = match serde_json::from_str::<BitstampMessage>(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, raw = %text, "Failed to parse message while waiting for subscription");
                    continue;
                }
            };

            match msg.event.as_str() {
                EVENT_SUBSCRIBED if msg.channel == channel => {
                    info!(channel = %channel, "Bitstamp subscription confirmed");
                    return Ok(());
                }
                EVENT_ERROR => {
                    return Err(WsError::SubscriptionFailed(format!(
                        "Subscription to {} failed: {}",
                        channel,
                        msg.error_message()
                    )));
                }
                EVENT_SUBSCRIBED | EVENT_HEARTBEAT => {
                    trace!(event = %msg.event, "Ignoring control message while waiting")
                }
                _ => self.pending.push_back(msg),
            }
        }
    }

    /// Next message or ping deadline. Buffered data is returned first.
    pub async fn next_step(
        &mut self,
        keepalive: &Keepalive,
    ) -> Result<Step<BitstampMessage>, WsError> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Step::Frame(Some(msg)));
        }

        match self.link.next_step(keepalive).await? {
            Step::PingDue => Ok(Step::PingDue),
            Step::Frame(None) => Ok(Step::Frame(None)),
            Step::Frame(Some(text)) => match serde_json::from_str::<BitstampMessage>(&text) {
                Ok(msg) => {
                    trace!(msg = %text, "Received Bitstamp message");
                    Ok(Step::Frame(Some(msg)))
                }
                Err(e) => {
                    warn!(error = %e, text = %text, "Failed to parse Bitstamp message");
                    Ok(Step::Frame(None))
                }
            },
        }
    }

    /// App-level keepalive, answered with a `bts:heartbeat` event
    pub async fn heartbeat(&mut self) -> Result<(), WsError> {
        self.link
            .send_json(&serde_json::json!({ "event": EVENT_HEARTBEAT }))
            .await
    }

    pub async fn close(&mut self) -> Result<(), WsError> {
        self.link.close().await
    }
}
