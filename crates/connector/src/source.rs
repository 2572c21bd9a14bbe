use mdrelay_metadata::{Exchange, Feed, SupervisorConfig};

use crate::bitstamp::BitstampSource;
use crate::kraken::KrakenSource;
use crate::traits::MarketSource;

/// Build the market source for a feed. The feed must have passed
/// `Feed::validate`.
pub fn create_market_source(feed: &Feed, config: &SupervisorConfig) -> Box<dyn MarketSource> {
    let channel = feed.channel_name();
    let symbol = feed.symbol.to_uppercase();
    let endpoint = feed.endpoint.clone();

    match feed.exchange {
        Exchange::Kraken => Box::new(KrakenSource::new(channel, symbol, endpoint, config)),
        Exchange::Bitstamp => Box::new(BitstampSource::new(channel, &symbol, endpoint, config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(exchange: Exchange) -> Feed {
        Feed {
            name: "btcusd".to_string(),
            display_name: None,
            exchange,
            symbol: "btc/usd".to_string(),
            endpoint: None,
            status: None,
        }
    }

    #[test]
    fn test_channel_names_per_exchange() {
        let config = SupervisorConfig::default();
        let kraken = create_market_source(&feed(Exchange::Kraken), &config);
        assert_eq!(kraken.channel_name(), "Kraken/BTC/USD");
        assert!(!kraken.is_open());

        let bitstamp = create_market_source(&feed(Exchange::Bitstamp), &config);
        assert_eq!(bitstamp.channel_name(), "Bitstamp/BTC/USD");
    }
}
