//! Kraken market source
//!
//! Subscribes to ticker and trade (with snapshot, so a fresh session replays
//! recent trades) for one symbol. Each pump call handles one frame or sends
//! one app-level ping.

use async_trait::async_trait;
use mdrelay_metadata::SupervisorConfig;
use tracing::{debug, info, trace, warn};

use crate::error::MarketError;
use crate::event::{now_millis, ServerTime};
use crate::kraken::messages::{KrakenTickerData, KrakenTradeData, KrakenWsMessage};
use crate::kraken::websocket::{KrakenWebSocket, KRAKEN_WS_URL};
use crate::traits::{EventHandler, MarketSource};
use crate::websocket::{Keepalive, Step, WsError};

pub struct KrakenSource {
    channel: String,
    symbol: String,
    ws_url: String,
    config: SupervisorConfig,
    ws: Option<KrakenWebSocket>,
    keepalive: Keepalive,
    next_req_id: u64,
    last_error: Option<String>,
}

impl KrakenSource {
    /// `ws_url` overrides [`KRAKEN_WS_URL`]
    pub fn new(
        channel: impl Into<String>,
        symbol: impl Into<String>,
        ws_url: Option<String>,
        config: &SupervisorConfig,
    ) -> Self {
        Self {
            channel: channel.into(),
            symbol: symbol.into(),
            ws_url: ws_url.unwrap_or_else(|| KRAKEN_WS_URL.to_string()),
            config: config.clone(),
            ws: None,
            keepalive: Keepalive::new(config.ping_interval(), config.read_timeout()),
            next_req_id: 1,
            last_error: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Record a dead link and drop it
    fn fail(&mut self, e: WsError) -> MarketError {
        let reason = e.to_string();
        warn!(channel = %self.channel, error = %reason, "Kraken link failed");
        self.last_error = Some(reason.clone());
        self.ws = None;
        MarketError::Disconnected(reason)
    }

    async fn send_ping(&mut self) -> Result<(), MarketError> {
        let req_id = self.next_req_id;
        self.next_req_id += 1;
        self.keepalive.schedule_next_ping();

        trace!(req_id, "Sending Kraken app-level ping");
        let result = match self.ws.as_mut() {
            Some(ws) => ws.ping(req_id).await,
            None => Err(WsError::ConnectionClosed),
        };
        result.map_err(|e| self.fail(e))
    }
}

/// Turn one Kraken message into relay events, in payload order. Only data
/// for `symbol` is forwarded.
pub(crate) async fn dispatch_message(
    channel_name: &str,
    symbol: &str,
    msg: KrakenWsMessage,
    handler: &mut dyn EventHandler,
) -> Result<(), MarketError> {
    if let Some(time) = msg.pong_server_time() {
        handler.handle(ServerTime { time }.into()).await?;
        return Ok(());
    }

    match msg {
        KrakenWsMessage::ChannelMessage { channel, data, .. } => match channel.as_str() {
            "trade" => {
                for item in data {
                    let trade = match serde_json::from_value::<KrakenTradeData>(item) {
                        Ok(t) if t.symbol == symbol => t.to_trade(),
                        Ok(_) => continue,
                        Err(e) => {
                            warn!(error = %e, "Failed to parse Kraken trade");
                            continue;
                        }
                    };
                    match trade {
                        Some(trade) => handler.handle(trade.into()).await?,
                        None => warn!(channel = %channel_name, "Dropping malformed Kraken trade"),
                    }
                }
            }
            "ticker" => {
                for item in data {
                    match serde_json::from_value::<KrakenTickerData>(item) {
                        Ok(t) if t.symbol == symbol => {
                            handler.handle(t.to_ticker(now_millis()).into()).await?
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Failed to parse Kraken ticker"),
                    }
                }
            }
            other => trace!(channel = %other, "Ignoring Kraken channel"),
        },
        KrakenWsMessage::Heartbeat { .. } => trace!("Kraken heartbeat received"),
        KrakenWsMessage::SubscriptionResult { .. } => {
            debug!("Kraken subscription result received")
        }
        KrakenWsMessage::Pong { .. } => trace!("Kraken pong without server time"),
    }
    Ok(())
}

#[async_trait]
impl MarketSource for KrakenSource {
    fn channel_name(&self) -> &str {
        &self.channel
    }

    async fn connect(&mut self) -> Result<(), MarketError> {
        self.close().await;

        let result = async {
            let mut ws = KrakenWebSocket::connect(&self.ws_url).await?;
            info!(symbol = %self.symbol, "Subscribing to Kraken ticker channel");
            ws.subscribe("ticker", &self.symbol, false).await?;
            info!(symbol = %self.symbol, "Subscribing to Kraken trade channel");
            ws.subscribe("trade", &self.symbol, true).await?;
            Ok::<_, WsError>(ws)
        }
        .await;

        match result {
            Ok(ws) => {
                self.ws = Some(ws);
                self.keepalive =
                    Keepalive::new(self.config.ping_interval(), self.config.read_timeout());
                self.last_error = None;
                info!(channel = %self.channel, "Kraken source subscribed to ticker and trade channels");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.last_error = Some(reason.clone());
                Err(MarketError::ConnectionFailed(reason))
            }
        }
    }

    fn is_open(&self) -> bool {
        self.ws.is_some()
    }

    async fn pump(&mut self, handler: &mut dyn EventHandler) -> Result<(), MarketError> {
        let step = match self.ws.as_mut() {
            Some(ws) => ws.next_step(&self.keepalive).await,
            None => Err(WsError::ConnectionClosed),
        };

        match step {
            Err(e) => Err(self.fail(e)),
            Ok(Step::PingDue) => self.send_ping().await,
            Ok(Step::Frame(msg)) => {
                self.keepalive.touch();
                match msg {
                    Some(msg) => {
                        dispatch_message(&self.channel, &self.symbol, msg, handler).await
                    }
                    None => Ok(()),
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            if let Err(e) = ws.close().await {
                debug!(error = %e, "Error closing Kraken WebSocket");
            }
        }
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use crate::event::{MarketEvent, Side};

    #[derive(Default)]
    struct Collect {
        events: Vec<MarketEvent>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl EventHandler for Collect {
        async fn handle(&mut self, event: MarketEvent) -> Result<(), RelayError> {
            if self.fail_after == Some(self.events.len()) {
                return Err(RelayError::NotConnected);
            }
            self.events.push(event);
            Ok(())
        }
    }

    const CHANNEL: &str = "Kraken/BTC/USD";
    const SYMBOL: &str = "BTC/USD";

    fn source() -> KrakenSource {
        KrakenSource::new("Kraken/BTC/USD", "BTC/USD", None, &SupervisorConfig::default())
    }

    fn parse(raw: &str) -> KrakenWsMessage {
        serde_json::from_str(raw).unwrap()
    }

    const TRADES: &str = r#"{"channel":"trade","type":"snapshot","data":[
        {"symbol":"BTC/USD","side":"buy","price":97000.0,"qty":0.5,"ord_type":"market","trade_id":1,"timestamp":"2026-02-06T12:00:00Z"},
        {"symbol":"ETH/USD","side":"buy","price":3000.0,"qty":1.0,"ord_type":"market","trade_id":9,"timestamp":"2026-02-06T12:00:00Z"},
        {"symbol":"BTC/USD","side":"sell","price":97001.0,"qty":0.25,"ord_type":"limit","trade_id":2,"timestamp":"2026-02-06T12:00:01Z"}]}"#;

    #[test]
    fn test_new_defaults() {
        let source = source();
        assert_eq!(source.channel_name(), "Kraken/BTC/USD");
        assert_eq!(source.ws_url(), KRAKEN_WS_URL);
        assert!(!source.is_open());
        assert!(source.last_error().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_trades_in_order_for_own_symbol() {
        let mut handler = Collect::default();
        dispatch_message(CHANNEL, SYMBOL, parse(TRADES), &mut handler)
            .await
            .unwrap();

        let ids: Vec<u64> = handler
            .events
            .iter()
            .map(|e| match e {
                MarketEvent::Trade(t) => t.id,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(ids, vec![1, 2]);
        match &handler.events[1] {
            MarketEvent::Trade(t) => assert_eq!(t.side, Side::Sell),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_stops_at_handler_failure() {
        let mut handler = Collect {
            fail_after: Some(1),
            ..Default::default()
        };
        let result = dispatch_message(CHANNEL, SYMBOL, parse(TRADES), &mut handler).await;
        assert_eq!(result, Err(MarketError::Relay(RelayError::NotConnected)));
        assert_eq!(handler.events.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_ticker_and_pong() {
        let mut handler = Collect::default();
        let ticker = r#"{"channel":"ticker","type":"update","data":[{"symbol":"BTC/USD","bid":96999.9,"bid_qty":1.0,"ask":97000.1,"ask_qty":1.0,"last":97000.0,"volume":10.0,"vwap":1.0,"low":1.0,"high":1.0,"change":0.0,"change_pct":0.0}]}"#;
        let pong = r#"{"method":"pong","req_id":1,"time_in":"2026-02-06T12:00:00Z","time_out":"2026-02-06T12:00:00.005Z"}"#;

        for raw in [ticker, pong] {
            dispatch_message(CHANNEL, SYMBOL, parse(raw), &mut handler)
                .await
                .unwrap();
        }

        match &handler.events[0] {
            MarketEvent::Ticker(t) => {
                assert_eq!(t.bid, 96999.9);
                assert_eq!(t.ask, 97000.1);
                assert_eq!(t.last, 97000.0);
            }
            other => panic!("expected ticker, got {:?}", other),
        }
        assert_eq!(
            handler.events[1],
            MarketEvent::ServerTime(ServerTime {
                time: 1_770_379_200_005
            })
        );
    }

    #[tokio::test]
    async fn test_dispatch_ignores_heartbeat_and_acks() {
        let mut handler = Collect::default();
        let quiet = [
            r#"{"channel":"heartbeat","type":"update"}"#,
            r#"{"method":"subscribe","success":true,"result":{"channel":"trade"}}"#,
        ];
        for raw in quiet {
            dispatch_message(CHANNEL, SYMBOL, parse(raw), &mut handler)
                .await
                .unwrap();
        }
        assert!(handler.events.is_empty());
    }

    #[tokio::test]
    async fn test_pump_without_link_fails() {
        let mut source = source();
        let mut handler = Collect::default();
        let result = source.pump(&mut handler).await;
        assert!(matches!(result, Err(MarketError::Disconnected(_))));
        assert_eq!(source.last_error(), Some("Connection closed"));
    }

    #[tokio::test]
    async fn test_connect_failure_records_error() {
        let mut source = KrakenSource::new(
            "Kraken/BTC/USD",
            "BTC/USD",
            Some("ws://127.0.0.1:1".to_string()),
            &SupervisorConfig::default(),
        );
        let result = source.connect().await;
        assert!(matches!(result, Err(MarketError::ConnectionFailed(_))));
        assert!(!source.is_open());
        assert!(source.last_error().is_some());
    }
}
