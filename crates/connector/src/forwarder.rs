//! Event Forwarder: one relay send per market event, in arrival order.

use async_trait::async_trait;
use tracing::{trace, warn};

use crate::error::RelayError;
use crate::event::MarketEvent;
use crate::metrics::ChannelMetrics;
use crate::traits::{EventHandler, RelaySink};

/// Forwards each event to the relay sink. Built once per session and
/// handed to the market source's pump.
///
/// After the first failed send the forwarder is latched: every later event
/// is refused without touching the relay.
pub struct EventForwarder<'a> {
    relay: &'a mut dyn RelaySink,
    metrics: &'a ChannelMetrics,
    forwarded: u64,
    failure: Option<RelayError>,
}

impl<'a> EventForwarder<'a> {
    pub fn new(relay: &'a mut dyn RelaySink, metrics: &'a ChannelMetrics) -> Self {
        Self {
            relay,
            metrics,
            forwarded: 0,
            failure: None,
        }
    }

    /// Events successfully sent in this session
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn relay_open(&self) -> bool {
        self.relay.is_open()
    }

    /// The send failure that ended this session, if any
    pub fn failure(&self) -> Option<&RelayError> {
        self.failure.as_ref()
    }
}

#[async_trait]
impl EventHandler for EventForwarder<'_> {
    async fn handle(&mut self, event: MarketEvent) -> Result<(), RelayError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let kind = event.kind();
        let result = match &event {
            MarketEvent::Trade(trade) => self.relay.send_trade(trade).await,
            MarketEvent::Ticker(ticker) => self.relay.send_ticker(ticker).await,
            MarketEvent::ServerTime(time) => self.relay.send_server_time(time).await,
        };

        match result {
            Ok(()) => {
                self.forwarded += 1;
                self.metrics.inc_forwarded(kind);
                trace!(kind, "Forwarded event");
                Ok(())
            }
            Err(e) => {
                warn!(kind, error = %e, "Relay send failed");
                self.metrics.inc_forward_failure(kind);
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }
}
