//! Kraken v2 WebSocket message types
//!
//! Uses `#[serde(untagged)]` since Kraken messages don't have a single consistent tag field.

use serde::{Deserialize, Deserializer};

use crate::event::{rfc3339_millis, Side, Ticker, Trade};

/// Incoming WebSocket messages from Kraken v2 API
///
/// Variant order matters for `#[serde(untagged)]` - serde tries each in order.
/// ChannelMessage (has `data`) must come before Heartbeat (no `data`) since both
/// share `channel` and `type` fields. SubscriptionResult (has `success`) must
/// come before Pong.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KrakenWsMessage {
    /// Channel data message (ticker, trade, etc.)
    ChannelMessage {
        channel: String,
        #[serde(rename = "type")]
        msg_type: String,
        data: Vec<serde_json::Value>,
    },
    /// Subscription result
    SubscriptionResult {
        method: String,
        success: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
        time_in: Option<String>,
        time_out: Option<String>,
    },
    /// Pong response to app-level ping
    Pong {
        method: String,
        req_id: Option<u64>,
        time_in: Option<String>,
        time_out: Option<String>,
    },
    /// Heartbeat (channel=heartbeat, type=update, no data field)
    Heartbeat {
        channel: String,
        #[serde(rename = "type")]
        msg_type: String,
    },
}

impl KrakenWsMessage {
    /// Server clock carried by a pong, in epoch milliseconds
    pub fn pong_server_time(&self) -> Option<i64> {
        match self {
            KrakenWsMessage::Pong {
                method, time_out, ..
            } if method == "pong" => time_out.as_deref().and_then(rfc3339_millis),
            _ => None,
        }
    }
}

/// Kraken ticker data
#[derive(Debug, Clone, Deserialize)]
pub struct KrakenTickerData {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    #[serde(default)]
    pub volume: f64,
}

impl KrakenTickerData {
    /// Kraken ticker updates carry no timestamp; `time` is the receive time
    pub fn to_ticker(&self, time: i64) -> Ticker {
        Ticker {
            time,
            bid: self.bid,
            ask: self.ask,
            last: self.last,
        }
    }
}

/// Kraken trade data
#[derive(Debug, Clone, Deserialize)]
pub struct KrakenTradeData {
    pub symbol: String,
    pub side: String,
    pub price: f64,
    pub qty: f64,
    pub ord_type: String,
    #[serde(deserialize_with = "u64_from_number_or_string")]
    pub trade_id: u64,
    pub timestamp: String,
}

impl KrakenTradeData {
    /// Convert to a relay trade. `None` if the side or timestamp is malformed.
    pub fn to_trade(&self) -> Option<Trade> {
        let side = match self.side.as_str() {
            "buy" => Side::Buy,
            "sell" => Side::Sell,
            _ => return None,
        };
        Some(Trade {
            id: self.trade_id,
            time: rfc3339_millis(&self.timestamp)?,
            price: self.price,
            amount: self.qty,
            side,
        })
    }
}

/// Kraken sends trade ids as integers; older payloads quote them
fn u64_from_number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICKER_MESSAGE: &str = r#"{"channel":"ticker","type":"update","data":[{"symbol":"BTC/USD","bid":97000.0,"bid_qty":0.50000000,"ask":97000.1,"ask_qty":1.00000000,"last":97000.0,"volume":1234.56789012,"vwap":96500.0,"low":95000.0,"high":98000.0,"change":500.0,"change_pct":0.52}]}"#;
    const TRADE_MESSAGE: &str = r#"{"channel":"trade","type":"snapshot","data":[{"symbol":"BTC/USD","side":"buy","price":97000.0,"qty":0.001,"ord_type":"market","trade_id":12345,"timestamp":"2026-02-06T12:00:00.000000Z"}]}"#;
    const HEARTBEAT_MESSAGE: &str = r#"{"channel":"heartbeat","type":"update"}"#;
    const PONG_MESSAGE: &str = r#"{"method":"pong","req_id":7,"time_in":"2026-02-06T12:00:00.000000Z","time_out":"2026-02-06T12:00:00.250000Z"}"#;
    const SUBSCRIBE_RESULT: &str = r#"{"method":"subscribe","result":{"channel":"ticker","symbol":"BTC/USD"},"success":true,"time_in":"2026-02-06T12:00:00.000000Z","time_out":"2026-02-06T12:00:00.000001Z"}"#;

    #[test]
    fn test_parse_ticker_message() {
        let msg: KrakenWsMessage =
            serde_json::from_str(TICKER_MESSAGE).expect("Failed to parse ticker");

        match msg {
            KrakenWsMessage::ChannelMessage {
                channel,
                msg_type,
                data,
            } => {
                assert_eq!(channel, "ticker");
                assert_eq!(msg_type, "update");
                assert_eq!(data.len(), 1);

                let ticker: KrakenTickerData =
                    serde_json::from_value(data[0].clone()).expect("Failed to parse ticker data");
                assert_eq!(ticker.symbol, "BTC/USD");
                assert_eq!(ticker.volume, 1234.56789012);

                let ticker = ticker.to_ticker(1_000);
                assert_eq!(ticker.time, 1_000);
                assert_eq!(ticker.bid, 97000.0);
                assert_eq!(ticker.ask, 97000.1);
                assert_eq!(ticker.last, 97000.0);
            }
            _ => panic!("Expected ChannelMessage variant, got {:?}", msg),
        }
    }

    #[test]
    fn test_parse_trade_snapshot() {
        let msg: KrakenWsMessage =
            serde_json::from_str(TRADE_MESSAGE).expect("Failed to parse trade");

        match msg {
            KrakenWsMessage::ChannelMessage {
                channel,
                msg_type,
                data,
            } => {
                assert_eq!(channel, "trade");
                assert_eq!(msg_type, "snapshot");

                let data: KrakenTradeData =
                    serde_json::from_value(data[0].clone()).expect("Failed to parse trade data");
                let trade = data.to_trade().expect("valid trade");
                assert_eq!(trade.id, 12345);
                assert_eq!(trade.time, 1_770_379_200_000);
                assert_eq!(trade.price, 97000.0);
                assert_eq!(trade.amount, 0.001);
                assert_eq!(trade.side, Side::Buy);
            }
            _ => panic!("Expected ChannelMessage variant, got {:?}", msg),
        }
    }

    #[test]
    fn test_trade_id_as_string() {
        let json = r#"{"symbol":"ETH/USD","side":"sell","price":3200.5,"qty":1.5,"ord_type":"limit","trade_id":"67890","timestamp":"2026-02-06T12:30:00.000000Z"}"#;
        let data: KrakenTradeData =
            serde_json::from_str(json).expect("Failed to parse trade data");
        assert_eq!(data.trade_id, 67890);
        assert_eq!(data.to_trade().unwrap().side, Side::Sell);
    }

    #[test]
    fn test_malformed_trade_is_rejected() {
        let json = r#"{"symbol":"ETH/USD","side":"hold","price":1.0,"qty":1.0,"ord_type":"limit","trade_id":1,"timestamp":"2026-02-06T12:30:00Z"}"#;
        let data: KrakenTradeData = serde_json::from_str(json).unwrap();
        assert!(data.to_trade().is_none());

        let json = r#"{"symbol":"ETH/USD","side":"buy","price":1.0,"qty":1.0,"ord_type":"limit","trade_id":1,"timestamp":"yesterday"}"#;
        let data: KrakenTradeData = serde_json::from_str(json).unwrap();
        assert!(data.to_trade().is_none());
    }

    #[test]
    fn test_parse_heartbeat_message() {
        let msg: KrakenWsMessage =
            serde_json::from_str(HEARTBEAT_MESSAGE).expect("Failed to parse heartbeat");
        assert!(matches!(msg, KrakenWsMessage::Heartbeat { ref channel, .. } if channel == "heartbeat"));
        assert_eq!(msg.pong_server_time(), None);
    }

    #[test]
    fn test_pong_server_time() {
        let msg: KrakenWsMessage =
            serde_json::from_str(PONG_MESSAGE).expect("Failed to parse pong");

        match &msg {
            KrakenWsMessage::Pong { req_id, .. } => assert_eq!(*req_id, Some(7)),
            _ => panic!("Expected Pong variant, got {:?}", msg),
        }
        assert_eq!(msg.pong_server_time(), Some(1_770_379_200_250));
    }

    #[test]
    fn test_parse_subscribe_result() {
        let msg: KrakenWsMessage =
            serde_json::from_str(SUBSCRIBE_RESULT).expect("Failed to parse subscribe result");

        match msg {
            KrakenWsMessage::SubscriptionResult {
                method,
                success,
                result,
                ..
            } => {
                assert_eq!(method, "subscribe");
                assert!(success);
                assert!(result.is_some());
            }
            _ => panic!("Expected SubscriptionResult variant, got {:?}", msg),
        }
    }

    #[test]
    fn test_subscribe_failure_result() {
        let json = r#"{"method":"subscribe","error":"Currency pair not supported","success":false,"time_in":"2026-02-06T12:00:00.000000Z","time_out":"2026-02-06T12:00:00.000001Z"}"#;
        let msg: KrakenWsMessage =
            serde_json::from_str(json).expect("Failed to parse failed subscribe");

        match msg {
            KrakenWsMessage::SubscriptionResult {
                success, error, ..
            } => {
                assert!(!success);
                assert_eq!(error.as_deref(), Some("Currency pair not supported"));
            }
            _ => panic!("Expected SubscriptionResult variant"),
        }
    }
}
