//! Bitstamp exchange market source (v2 WebSocket API)

pub mod messages;
pub mod source;
pub mod websocket;

pub use messages::BitstampMessage;
pub use source::BitstampSource;
pub use websocket::{BitstampWebSocket, BITSTAMP_WS_URL};
