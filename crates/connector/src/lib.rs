//! mdrelay-connector: Market data relay bridge components
//!
//! Connects one exchange market feed to a relay server and forwards trades,
//! tickers and exchange server time as they arrive. The [`Supervisor`] owns
//! both links and restarts the session whenever either side fails.

pub mod bitstamp;
pub mod error;
pub mod event;
pub mod forwarder;
pub mod kraken;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod source;
pub mod status;
pub mod supervisor;
pub mod traits;
pub mod websocket;

pub use error::{MarketError, RelayError};
pub use event::{MarketEvent, ServerTime, Side, Ticker, Trade};
pub use forwarder::EventForwarder;
pub use relay::NatsRelay;
pub use server::{create_router, run_server, ServerState};
pub use source::create_market_source;
pub use status::{LinkState, LinkStatus};
pub use supervisor::{CycleOutcome, Supervisor};
pub use traits::{EventHandler, MarketSource, RelaySink};
