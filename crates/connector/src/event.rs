//! Market events passed unchanged from a market source to the relay.
//!
//! Timestamps are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// A single executed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange-assigned id, used by the relay to drop trades replayed on reconnect
    pub id: u64,
    pub time: i64,
    pub price: f64,
    pub amount: f64,
    pub side: Side,
}

/// Best bid / best ask / last price snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub time: i64,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
}

/// Exchange-reported server clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTime {
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Trade(Trade),
    Ticker(Ticker),
    ServerTime(ServerTime),
}

impl MarketEvent {
    /// Metric/log label for the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            MarketEvent::Trade(_) => "trade",
            MarketEvent::Ticker(_) => "ticker",
            MarketEvent::ServerTime(_) => "server_time",
        }
    }
}

impl From<Trade> for MarketEvent {
    fn from(trade: Trade) -> Self {
        MarketEvent::Trade(trade)
    }
}

impl From<Ticker> for MarketEvent {
    fn from(ticker: Ticker) -> Self {
        MarketEvent::Ticker(ticker)
    }
}

impl From<ServerTime> for MarketEvent {
    fn from(time: ServerTime) -> Self {
        MarketEvent::ServerTime(time)
    }
}

/// Parse an RFC 3339 timestamp into epoch milliseconds
pub fn rfc3339_millis(raw: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.timestamp_millis())
}

/// Local wall clock in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
