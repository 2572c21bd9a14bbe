//! Kraken exchange market source
//!
//! Provides WebSocket connectivity to Kraken spot markets via the v2 API.

pub mod messages;
pub mod source;
pub mod websocket;

pub use messages::KrakenWsMessage;
pub use source::KrakenSource;
pub use websocket::{KrakenWebSocket, KRAKEN_WS_URL};
