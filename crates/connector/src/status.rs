use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Connection state of one link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Closed = 0,
    Connecting = 1,
    Open = 2,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LinkState::Connecting,
            2 => LinkState::Open,
            _ => LinkState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Closed => "closed",
            LinkState::Connecting => "connecting",
            LinkState::Open => "open",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link states published by the supervisor for health checks.
/// Written only by the supervisor.
#[derive(Debug)]
pub struct LinkStatus {
    market: AtomicU8,
    relay: AtomicU8,
}

impl LinkStatus {
    pub fn new() -> Self {
        Self {
            market: AtomicU8::new(LinkState::Closed as u8),
            relay: AtomicU8::new(LinkState::Closed as u8),
        }
    }

    pub fn market(&self) -> LinkState {
        LinkState::from_u8(self.market.load(Ordering::SeqCst))
    }

    pub fn relay(&self) -> LinkState {
        LinkState::from_u8(self.relay.load(Ordering::SeqCst))
    }

    pub fn set_market(&self, state: LinkState) {
        self.market.store(state as u8, Ordering::SeqCst);
    }

    pub fn set_relay(&self, state: LinkState) {
        self.relay.store(state as u8, Ordering::SeqCst);
    }

    /// True while a session can run
    pub fn both_open(&self) -> bool {
        self.market() == LinkState::Open && self.relay() == LinkState::Open
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_closed() {
        let status = LinkStatus::new();
        assert_eq!(status.market(), LinkState::Closed);
        assert_eq!(status.relay(), LinkState::Closed);
        assert!(!status.both_open());
    }

    #[test]
    fn test_both_open() {
        let status = LinkStatus::new();
        status.set_relay(LinkState::Open);
        status.set_market(LinkState::Connecting);
        assert!(!status.both_open());
        status.set_market(LinkState::Open);
        assert!(status.both_open());
    }

    #[test]
    fn test_display() {
        assert_eq!(LinkState::Connecting.to_string(), "connecting");
    }
}
