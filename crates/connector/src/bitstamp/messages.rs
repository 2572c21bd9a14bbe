//! Bitstamp v2 WebSocket message types
//!
//! Every Bitstamp frame shares one envelope: `{"event", "channel", "data"}`.
//! The payload in `data` depends on the event.

use serde::Deserialize;

use crate::event::{Side, Trade};

pub const EVENT_TRADE: &str = "trade";
pub const EVENT_BOOK: &str = "data";
pub const EVENT_SUBSCRIBED: &str = "bts:subscription_succeeded";
pub const EVENT_HEARTBEAT: &str = "bts:heartbeat";
pub const EVENT_RECONNECT: &str = "bts:request_reconnect";
pub const EVENT_ERROR: &str = "bts:error";

#[derive(Debug, Clone, Deserialize)]
pub struct BitstampMessage {
    pub event: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl BitstampMessage {
    /// Human-readable reason carried by a `bts:error` frame
    pub fn error_message(&self) -> String {
        self.data
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.data.to_string())
    }
}

/// `live_trades_<pair>` payload
#[derive(Debug, Clone, Deserialize)]
pub struct BitstampTrade {
    pub id: u64,
    pub amount: f64,
    pub price: f64,
    /// 0 = buy, 1 = sell
    #[serde(rename = "type")]
    pub side: u8,
    pub microtimestamp: String,
}

impl BitstampTrade {
    /// Exchange clock at the trade, in epoch milliseconds
    pub fn time_millis(&self) -> Option<i64> {
        micros_to_millis(&self.microtimestamp)
    }

    pub fn to_trade(&self) -> Option<Trade> {
        let side = match self.side {
            0 => Side::Buy,
            1 => Side::Sell,
            _ => return None,
        };
        Some(Trade {
            id: self.id,
            time: self.time_millis()?,
            price: self.price,
            amount: self.amount,
            side,
        })
    }
}

/// `order_book_<pair>` payload, top 100 levels as `[price, amount]` strings
#[derive(Debug, Clone, Deserialize)]
pub struct BitstampOrderBook {
    pub microtimestamp: String,
    pub bids: Vec<[String; 2]>,
    pub asks: Vec<[String; 2]>,
}

impl BitstampOrderBook {
    pub fn time_millis(&self) -> Option<i64> {
        micros_to_millis(&self.microtimestamp)
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().and_then(|level| level[0].parse().ok())
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().and_then(|level| level[0].parse().ok())
    }
}

fn micros_to_millis(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().map(|us| us / 1000)
}
