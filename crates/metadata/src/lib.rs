//! mdrelay-metadata: YAML configuration for the market data relay bridge

pub mod environment;
pub mod error;
pub mod feed;

pub use environment::{Environment, RelayConfig, SupervisorConfig, TransportType};
pub use error::MetadataError;
pub use feed::{Exchange, Feed, FeedStatus};
