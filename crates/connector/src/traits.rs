use async_trait::async_trait;

use crate::error::{MarketError, RelayError};
use crate::event::{MarketEvent, ServerTime, Ticker, Trade};

/// Receives events from a market source, one at a time, in arrival order.
#[async_trait]
pub trait EventHandler: Send {
    /// Handle one event. An error means the session must end; the caller
    /// must not offer further events in the same pump call.
    async fn handle(&mut self, event: MarketEvent) -> Result<(), RelayError>;
}

/// Upstream exchange connection (one implementation per exchange)
#[async_trait]
pub trait MarketSource: Send {
    /// Stable channel identity, e.g. "Kraken/BTC/USD"
    fn channel_name(&self) -> &str;

    /// Open the market link and subscribe to the market's streams
    async fn connect(&mut self) -> Result<(), MarketError>;

    fn is_open(&self) -> bool;

    /// Read from the market link and dispatch the resulting events to
    /// `handler`. Returns `Ok` after zero or more events; returns `Err` as
    /// soon as the link is found dead or the handler fails.
    async fn pump(&mut self, handler: &mut dyn EventHandler) -> Result<(), MarketError>;

    /// Drop the market link. The next `connect` starts a fresh session.
    async fn close(&mut self);

    /// Reason for the most recent market link failure
    fn last_error(&self) -> Option<&str>;
}

/// Downstream relay server connection
#[async_trait]
pub trait RelaySink: Send {
    /// Connect to the relay on `port` and open the logical channel
    async fn connect(&mut self, port: u16, channel_name: &str) -> Result<(), RelayError>;

    fn is_open(&self) -> bool;

    async fn send_trade(&mut self, trade: &Trade) -> Result<(), RelayError>;

    async fn send_ticker(&mut self, ticker: &Ticker) -> Result<(), RelayError>;

    async fn send_server_time(&mut self, time: &ServerTime) -> Result<(), RelayError>;

    /// Reason for the most recent relay link failure
    fn last_error(&self) -> Option<&str>;
}

#[async_trait]
impl MarketSource for Box<dyn MarketSource> {
    fn channel_name(&self) -> &str {
        (**self).channel_name()
    }

    async fn connect(&mut self) -> Result<(), MarketError> {
        (**self).connect().await
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    async fn pump(&mut self, handler: &mut dyn EventHandler) -> Result<(), MarketError> {
        (**self).pump(handler).await
    }

    async fn close(&mut self) {
        (**self).close().await
    }

    fn last_error(&self) -> Option<&str> {
        (**self).last_error()
    }
}
