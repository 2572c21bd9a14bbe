use thiserror::Error;

/// Failures on the downstream relay link
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("relay link is not open")]
    NotConnected,
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Failures on the upstream market link, or a relay failure surfaced
/// through the pump
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("disconnected: {0}")]
    Disconnected(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("relay: {0}")]
    Relay(#[from] RelayError),
}

impl MarketError {
    /// Whether the failure came from the relay side of the session
    pub fn is_relay(&self) -> bool {
        matches!(self, MarketError::Relay(_))
    }
}
