use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::MetadataError;

/// Exchanges with a market source implementation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    Kraken,
    Bitstamp,
}

impl Exchange {
    /// Human-readable name, used as the first token of the channel name
    pub fn display_name(&self) -> &'static str {
        match self {
            Exchange::Kraken => "Kraken",
            Exchange::Bitstamp => "Bitstamp",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    #[default]
    Active,
    Deprecated,
    Disabled,
}

/// One exchange/market pair bridged by a single process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub name: String,
    pub display_name: Option<String>,
    pub exchange: Exchange,
    /// Market symbol in BASE/QUOTE form, e.g. "BTC/USD"
    pub symbol: String,
    /// WebSocket URL override (None = use the exchange's default endpoint)
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub status: Option<FeedStatus>,
}

impl Feed {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path).map_err(MetadataError::read(path))?;
        let feed: Feed = serde_yaml::from_str(&content).map_err(MetadataError::parse(path))?;
        feed.validate()?;
        Ok(feed)
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.name.trim().is_empty() {
            return Err(MetadataError::Validation("feed name is empty".to_string()));
        }
        if self.status == Some(FeedStatus::Disabled) {
            return Err(MetadataError::Validation(format!(
                "feed {} is disabled",
                self.name
            )));
        }
        self.pair().map(|_| ())
    }

    /// Split the symbol into (base, quote)
    pub fn pair(&self) -> Result<(&str, &str), MetadataError> {
        match self.symbol.split_once('/') {
            Some((base, quote))
                if !base.is_empty() && !quote.is_empty() && !quote.contains('/') =>
            {
                Ok((base, quote))
            }
            _ => Err(MetadataError::Validation(format!(
                "symbol must be BASE/QUOTE, got {:?}",
                self.symbol
            ))),
        }
    }

    /// Channel name on the relay side: "{Exchange}/{BASE}/{QUOTE}"
    pub fn channel_name(&self) -> String {
        format!("{}/{}", self.exchange.display_name(), self.symbol.to_uppercase())
    }

    /// Log file used in daemon mode
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn feed(exchange: Exchange, symbol: &str) -> Feed {
        Feed {
            name: "test".to_string(),
            display_name: None,
            exchange,
            symbol: symbol.to_string(),
            endpoint: None,
            status: None,
        }
    }

    #[test]
    fn test_load_feed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
name: kraken-btcusd
display_name: Kraken BTC/USD
exchange: kraken
symbol: BTC/USD
status: active
"#
        )
        .unwrap();

        let feed = Feed::load(file.path()).unwrap();
        assert_eq!(feed.name, "kraken-btcusd");
        assert_eq!(feed.exchange, Exchange::Kraken);
        assert!(feed.endpoint.is_none());
        assert_eq!(feed.channel_name(), "Kraken/BTC/USD");
        assert_eq!(feed.log_file_name(), "kraken-btcusd.log");
    }

    #[test]
    fn test_load_feed_with_endpoint() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
name: bitstamp-btcusd
exchange: bitstamp
symbol: btc/usd
endpoint: wss://ws.example.net
"#
        )
        .unwrap();

        let feed = Feed::load(file.path()).unwrap();
        assert_eq!(feed.exchange, Exchange::Bitstamp);
        assert_eq!(feed.endpoint.as_deref(), Some("wss://ws.example.net"));
        assert_eq!(feed.channel_name(), "Bitstamp/BTC/USD");
    }

    #[test]
    fn test_unknown_exchange_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name: x\nexchange: mtgox\nsymbol: BTC/USD\n").unwrap();

        let result = Feed::load(file.path());
        assert!(matches!(result, Err(MetadataError::Parse { .. })));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = Feed::load(Path::new("/nonexistent/feed.yaml")).unwrap_err();
        assert!(matches!(err, MetadataError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/feed.yaml"));
    }

    #[test]
    fn test_pair() {
        let f = feed(Exchange::Kraken, "ETH/EUR");
        assert_eq!(f.pair().unwrap(), ("ETH", "EUR"));
    }

    #[test]
    fn test_invalid_symbols() {
        for symbol in ["BTCUSD", "/USD", "BTC/", "BTC/USD/EUR", ""] {
            let f = feed(Exchange::Kraken, symbol);
            assert!(f.validate().is_err(), "{symbol:?} should be rejected");
        }
    }

    #[test]
    fn test_disabled_feed_rejected() {
        let mut f = feed(Exchange::Bitstamp, "BTC/USD");
        f.status = Some(FeedStatus::Disabled);
        assert!(matches!(f.validate(), Err(MetadataError::Validation(_))));

        f.status = Some(FeedStatus::Deprecated);
        assert!(f.validate().is_ok());
    }
}
