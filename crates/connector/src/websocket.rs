//! WebSocket plumbing shared by the exchange market sources.
//!
//! A market session reads one frame per pump call. [`Keepalive`] decides
//! when the next app-level ping is due and when a silent link is dead.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{self, protocol::WebSocketConfig, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{info, trace};
use url::Url;

const MAX_MESSAGE_SIZE: usize = 1024 * 1024; // 1 MiB

/// Timeout for subscription confirmation
pub const SUBSCRIPTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum WsError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("Read timeout after {0:?}")]
    ReadTimeout(Duration),
    #[error("Server requested reconnect")]
    ReconnectRequested,
    #[error("Server error: {0}")]
    Server(String),
}

/// Longest wait a keepalive deadline is allowed to be in the future
const MAX_KEEPALIVE_WAIT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn after(start: Instant, wait: Duration) -> Instant {
    start + wait.min(MAX_KEEPALIVE_WAIT)
}

/// Ping schedule and read deadline for one market session
#[derive(Debug, Clone)]
pub struct Keepalive {
    ping_interval: Duration,
    read_timeout: Duration,
    next_ping: Instant,
    last_activity: Instant,
}

impl Keepalive {
    pub fn new(ping_interval: Duration, read_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            ping_interval,
            read_timeout,
            next_ping: after(now, ping_interval),
            last_activity: now,
        }
    }

    /// Record inbound traffic
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn schedule_next_ping(&mut self) {
        self.next_ping = after(Instant::now(), self.ping_interval);
    }

    pub fn next_ping(&self) -> Instant {
        self.next_ping
    }

    /// The link is dead if nothing arrives before this instant
    pub fn read_deadline(&self) -> Instant {
        after(self.last_activity, self.read_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

/// What woke a pump call
#[derive(Debug)]
pub enum Step<T> {
    /// App-level ping is due
    PingDue,
    /// A frame arrived; `None` for frames that carry no market message
    Frame(Option<T>),
}

/// Thin JSON-over-WebSocket client
pub struct WsLink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsLink {
    pub async fn connect(url: &str) -> Result<Self, WsError> {
        Url::parse(url).map_err(|e| WsError::InvalidUrl(format!("{}: {}", url, e)))?;
        let config = WebSocketConfig {
            max_message_size: Some(MAX_MESSAGE_SIZE),
            ..Default::default()
        };

        info!(url = %url, "Connecting to market WebSocket");
        let (ws, response) = connect_async_with_config(url, Some(config), false).await?;
        info!(status = ?response.status(), "Market WebSocket connected");

        Ok(Self { ws })
    }

    pub async fn send_json(&mut self, value: &serde_json::Value) -> Result<(), WsError> {
        let msg = serde_json::to_string(value)?;
        trace!(msg = %msg, "Sending");
        self.ws.send(Message::Text(msg)).await?;
        Ok(())
    }

    /// Read one frame. Text frames are returned, WS pings are answered and
    /// other frames yield `None`.
    pub async fn recv_text(&mut self) -> Result<Option<String>, WsError> {
        match self.ws.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(text)),
            Some(Ok(Message::Ping(data))) => {
                trace!("Received WS ping, sending pong");
                self.ws.send(Message::Pong(data)).await?;
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                info!(frame = ?frame, "Market WebSocket closed by server");
                Err(WsError::ConnectionClosed)
            }
            Some(Ok(_)) => Ok(None),
            Some(Err(e)) => Err(e.into()),
            None => Err(WsError::ConnectionClosed),
        }
    }

    /// Wait for the next frame or the next ping, whichever comes first.
    /// Fails with `ReadTimeout` once the keepalive's read deadline passes.
    pub async fn next_step(&mut self, keepalive: &Keepalive) -> Result<Step<String>, WsError> {
        let deadline = keepalive.read_deadline();
        tokio::select! {
            _ = sleep_until(keepalive.next_ping()) => Ok(Step::PingDue),
            frame = timeout_at(deadline, self.recv_text()) => match frame {
                Ok(result) => result.map(Step::Frame),
                Err(_) => Err(WsError::ReadTimeout(keepalive.read_timeout())),
            },
        }
    }

    /// Close the connection gracefully
    pub async fn close(&mut self) -> Result<(), WsError> {
        self.ws.close(None).await?;
        Ok(())
    }
}
