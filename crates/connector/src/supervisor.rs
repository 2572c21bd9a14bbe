use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{MarketError, RelayError};
use crate::forwarder::EventForwarder;
use crate::metrics::{ChannelMetrics, LINK_MARKET, LINK_RELAY};
use crate::status::{LinkState, LinkStatus};
use crate::traits::{MarketSource, RelaySink};

/// Result of one supervision cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Relay connect failed; the market link was not touched
    RelayConnectFailed(RelayError),
    /// Market connect failed with the relay open
    MarketConnectFailed(MarketError),
    /// A session ran and was torn down. The flags are the link states seen
    /// when the pump stopped, before the market link was reset.
    SessionEnded {
        cause: MarketError,
        relay_open: bool,
        market_open: bool,
        forwarded: u64,
    },
    /// Shutdown was requested during a healthy session. `run` closes the
    /// market link on its way out.
    Stopped { forwarded: u64 },
}

/// Owns the market and relay links, keeps both open and pumps events
/// between them. Runs until shutdown; every failure is retried after a
/// fixed delay.
pub struct Supervisor<M: MarketSource, R: RelaySink> {
    market: M,
    relay: R,
    channel: String,
    relay_port: u16,
    retry_delay: Duration,
    status: Arc<LinkStatus>,
    metrics: ChannelMetrics,
}

impl<M: MarketSource, R: RelaySink> Supervisor<M, R> {
    /// The channel identity is read from the market source once, here.
    pub fn new(market: M, relay: R, relay_port: u16, retry_delay: Duration) -> Self {
        let channel = market.channel_name().to_string();
        Self {
            metrics: ChannelMetrics::new(&channel),
            market,
            relay,
            channel,
            relay_port,
            retry_delay,
            status: Arc::new(LinkStatus::new()),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns a handle to the published link states
    pub fn status_handle(&self) -> Arc<LinkStatus> {
        Arc::clone(&self.status)
    }

    pub fn market(&self) -> &M {
        &self.market
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    fn set_market_state(&self, state: LinkState) {
        self.status.set_market(state);
        self.metrics.set_link_state(LINK_MARKET, state);
    }

    fn set_relay_state(&self, state: LinkState) {
        self.status.set_relay(state);
        self.metrics.set_link_state(LINK_RELAY, state);
    }

    /// Run supervision cycles until `shutdown` turns true, waiting the
    /// retry delay after every cycle. A running session notices shutdown
    /// after its current pump call returns.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            channel = %self.channel,
            relay_port = self.relay_port,
            retry_delay_secs = self.retry_delay.as_secs(),
            "Supervisor started"
        );

        while !*shutdown.borrow() {
            let outcome = self.cycle(&shutdown).await;
            debug!(channel = %self.channel, outcome = ?outcome, "Cycle finished");

            if matches!(outcome, CycleOutcome::Stopped { .. }) {
                break;
            }
            if wait_retry_delay(self.retry_delay, &mut shutdown).await {
                break;
            }
        }

        info!(channel = %self.channel, "Shutdown signal received");
        self.market.close().await;
        self.set_market_state(LinkState::Closed);
        info!(channel = %self.channel, "Supervisor stopped");
    }

    /// One pass of the state machine: ensure relay open, ensure market
    /// open, pump until failure, tear down.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let (_never, shutdown) = watch::channel(false);
        self.cycle(&shutdown).await
    }

    async fn cycle(&mut self, shutdown: &watch::Receiver<bool>) -> CycleOutcome {
        if !self.relay.is_open() {
            if let Err(e) = self.connect_relay().await {
                return CycleOutcome::RelayConnectFailed(e);
            }
        }

        if !self.market.is_open() {
            if let Err(e) = self.connect_market().await {
                return CycleOutcome::MarketConnectFailed(e);
            }
        }

        match self.pump_session(shutdown).await {
            (Some(cause), forwarded) => self.teardown(cause, forwarded).await,
            (None, forwarded) => {
                info!(channel = %self.channel, forwarded, "Session stopped for shutdown");
                CycleOutcome::Stopped { forwarded }
            }
        }
    }

    async fn connect_relay(&mut self) -> Result<(), RelayError> {
        info!(port = self.relay_port, "Connecting to relay server...");
        self.set_relay_state(LinkState::Connecting);
        self.metrics.inc_connect_attempt(LINK_RELAY);

        match self.relay.connect(self.relay_port, &self.channel).await {
            Ok(()) => {
                self.set_relay_state(LinkState::Open);
                info!(port = self.relay_port, "Connected to relay server");
                Ok(())
            }
            Err(e) => {
                self.set_relay_state(LinkState::Closed);
                self.metrics.inc_connect_failure(LINK_RELAY);
                error!(error = %e, "Could not connect to relay server");
                Err(e)
            }
        }
    }

    async fn connect_market(&mut self) -> Result<(), MarketError> {
        info!(channel = %self.channel, "Connecting to market...");
        self.set_market_state(LinkState::Connecting);
        self.metrics.inc_connect_attempt(LINK_MARKET);

        match self.market.connect().await {
            Ok(()) => {
                self.set_market_state(LinkState::Open);
                info!(channel = %self.channel, "Connected to market");
                Ok(())
            }
            Err(e) => {
                self.set_market_state(LinkState::Closed);
                self.metrics.inc_connect_failure(LINK_MARKET);
                error!(channel = %self.channel, error = %e, "Could not connect to market");
                Err(e)
            }
        }
    }

    /// Pump until the market source reports a failure, or the relay link is
    /// seen closed between pump calls. Returns no cause when shutdown was
    /// requested; the flag is read only between pump calls.
    async fn pump_session(
        &mut self,
        shutdown: &watch::Receiver<bool>,
    ) -> (Option<MarketError>, u64) {
        let mut forwarder = EventForwarder::new(&mut self.relay, &self.metrics);
        let cause = loop {
            if let Err(e) = self.market.pump(&mut forwarder).await {
                break Some(e);
            }
            if !forwarder.relay_open() {
                break Some(MarketError::Relay(RelayError::NotConnected));
            }
            if *shutdown.borrow() {
                break None;
            }
        };
        (cause, forwarder.forwarded())
    }

    async fn teardown(&mut self, cause: MarketError, forwarded: u64) -> CycleOutcome {
        let relay_open = self.relay.is_open();
        let market_open = self.market.is_open();

        if !relay_open {
            self.set_relay_state(LinkState::Closed);
            warn!(
                error = self.relay.last_error().unwrap_or("unknown"),
                "Lost connection to relay server"
            );
        }
        if !market_open {
            warn!(
                channel = %self.channel,
                error = self.market.last_error().unwrap_or("unknown"),
                "Lost connection to market"
            );
        }
        if relay_open && market_open {
            warn!(channel = %self.channel, error = %cause, "Session ended");
        }

        let side = match (relay_open, market_open) {
            (false, false) => "both",
            (false, true) => "relay",
            (true, false) => "market",
            (true, true) if cause.is_relay() => "relay",
            (true, true) => "market",
        };
        self.metrics.inc_session_ended(side);
        info!(channel = %self.channel, forwarded, cause = side, "Session torn down");

        // Always start the next session with a fresh market connection so
        // the exchange replays its recent trade history.
        self.market.close().await;
        self.set_market_state(LinkState::Closed);

        CycleOutcome::SessionEnded {
            cause,
            relay_open,
            market_open,
            forwarded,
        }
    }
}

/// Sleep for the retry delay. Returns true if shutdown was requested
/// while waiting.
async fn wait_retry_delay(retry_delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(retry_delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => match changed {
                Ok(()) if *shutdown.borrow() => return true,
                Ok(()) => continue,
                Err(_) => {
                    // Sender gone: nobody can ask us to stop any more
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}
