//! Bitstamp market source
//!
//! Subscribes to `live_trades_<pair>` and `order_book_<pair>`. Each trade is
//! preceded by a server time event taken from the trade's microtimestamp.
//! Every order book update becomes a ticker built from the top of the book
//! and the last trade price of the session.

use async_trait::async_trait;
use mdrelay_metadata::SupervisorConfig;
use tracing::{debug, info, trace, warn};

use crate::bitstamp::messages::{
    BitstampMessage, BitstampOrderBook, BitstampTrade, EVENT_BOOK, EVENT_ERROR, EVENT_HEARTBEAT,
    EVENT_RECONNECT, EVENT_SUBSCRIBED, EVENT_TRADE,
};
use crate::bitstamp::websocket::{BitstampWebSocket, BITSTAMP_WS_URL};
use crate::error::MarketError;
use crate::event::{now_millis, ServerTime, Ticker};
use crate::traits::{EventHandler, MarketSource};
use crate::websocket::{Keepalive, Step, WsError};

/// Quote state carried between frames of one session
#[derive(Debug, Default, Clone, PartialEq)]
pub struct QuoteState {
    last_price: Option<f64>,
}

pub struct BitstampSource {
    channel: String,
    /// Bitstamp pair code, e.g. "btcusd"
    pair: String,
    ws_url: String,
    config: SupervisorConfig,
    ws: Option<BitstampWebSocket>,
    keepalive: Keepalive,
    quotes: QuoteState,
    last_error: Option<String>,
}

impl BitstampSource {
    /// `symbol` is BASE/QUOTE; `ws_url` overrides [`BITSTAMP_WS_URL`]
    pub fn new(
        channel: impl Into<String>,
        symbol: &str,
        ws_url: Option<String>,
        config: &SupervisorConfig,
    ) -> Self {
        Self {
            channel: channel.into(),
            pair: pair_code(symbol),
            ws_url: ws_url.unwrap_or_else(|| BITSTAMP_WS_URL.to_string()),
            config: config.clone(),
            ws: None,
            keepalive: Keepalive::new(config.ping_interval(), config.read_timeout()),
            quotes: QuoteState::default(),
            last_error: None,
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn trades_channel(&self) -> String {
        format!("live_trades_{}", self.pair)
    }

    pub fn book_channel(&self) -> String {
        format!("order_book_{}", self.pair)
    }

    fn fail(&mut self, e: WsError) -> MarketError {
        let reason = e.to_string();
        warn!(channel = %self.channel, error = %reason, "Bitstamp link failed");
        self.last_error = Some(reason.clone());
        self.ws = None;
        MarketError::Disconnected(reason)
    }

    async fn send_heartbeat(&mut self) -> Result<(), MarketError> {
        self.keepalive.schedule_next_ping();
        trace!("Sending Bitstamp heartbeat");
        let result = match self.ws.as_mut() {
            Some(ws) => ws.heartbeat().await,
            None => Err(WsError::ConnectionClosed),
        };
        result.map_err(|e| self.fail(e))
    }
}

/// "BTC/USD" -> "btcusd"
fn pair_code(symbol: &str) -> String {
    symbol.replace('/', "").to_lowercase()
}

/// Turn one Bitstamp data frame into relay events
pub(crate) async fn dispatch_message(
    channel_name: &str,
    quotes: &mut QuoteState,
    msg: BitstampMessage,
    handler: &mut dyn EventHandler,
) -> Result<(), MarketError> {
    match msg.event.as_str() {
        EVENT_TRADE => {
            let trade = match serde_json::from_value::<BitstampTrade>(msg.data) {
                Ok(raw) => raw.to_trade(),
                Err(e) => {
                    warn!(error = %e, "Failed to parse Bitstamp trade");
                    return Ok(());
                }
            };
            let Some(trade) = trade else {
                warn!(channel = %channel_name, "Dropping malformed Bitstamp trade");
                return Ok(());
            };

            quotes.last_price = Some(trade.price);
            handler.handle(ServerTime { time: trade.time }.into()).await?;
            handler.handle(trade.into()).await?;
        }
        EVENT_BOOK => {
            let book = match serde_json::from_value::<BitstampOrderBook>(msg.data) {
                Ok(book) => book,
                Err(e) => {
                    warn!(error = %e, "Failed to parse Bitstamp order book");
                    return Ok(());
                }
            };
            let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) else {
                return Ok(());
            };

            // No ticker until the session has seen a trade
            if let Some(last) = quotes.last_price {
                let ticker = Ticker {
                    time: book.time_millis().unwrap_or_else(now_millis),
                    bid,
                    ask,
                    last,
                };
                handler.handle(ticker.into()).await?;
            }
        }
        EVENT_HEARTBEAT | EVENT_SUBSCRIBED => trace!(event = %msg.event, "Bitstamp control message"),
        other => debug!(event = %other, channel = %msg.channel, "Ignoring Bitstamp event"),
    }
    Ok(())
}

#[async_trait]
impl MarketSource for BitstampSource {
    fn channel_name(&self) -> &str {
        &self.channel
    }

    async fn connect(&mut self) -> Result<(), MarketError> {
        self.close().await;

        let trades = self.trades_channel();
        let book = self.book_channel();
        let result = async {
            let mut ws = BitstampWebSocket::connect(&self.ws_url).await?;
            ws.subscribe(&trades).await?;
            ws.subscribe(&book).await?;
            Ok::<_, WsError>(ws)
        }
        .await;

        match result {
            Ok(ws) => {
                self.ws = Some(ws);
                self.keepalive =
                    Keepalive::new(self.config.ping_interval(), self.config.read_timeout());
                self.quotes = QuoteState::default();
                self.last_error = None;
                info!(channel = %self.channel, pair = %self.pair, "Bitstamp source subscribed to trades and order book");
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

        let msg = match step {
            Err(e) => return Err(self.fail(e)),
            Ok(Step::PingDue) => return self.send_heartbeat().await,
            Ok(Step::Frame(None)) => {
                self.keepalive.touch();
                return Ok(());
            }
            Ok(Step::Frame(Some(msg))) => {
                self.keepalive.touch();
                msg
            }
        };

        if msg.event == EVENT_RECONNECT {
            return Err(self.fail(WsError::ReconnectRequested));
        }
        if msg.event == EVENT_ERROR {
            let reason = msg.error_message();
            return Err(self.fail(WsError::Server(reason)));
        }
        dispatch_message(&self.channel, &mut self.quotes, msg, handler).await
    }

    async fn close(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            if let Err(e) = ws.close().await {
                debug!(error = %e, "Error closing Bitstamp WebSocket");
            }
        }
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
