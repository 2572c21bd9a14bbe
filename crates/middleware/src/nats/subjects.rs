use std::sync::Arc;

/// Turn an arbitrary name into a single NATS subject token.
///
/// `/` becomes `-`; subject delimiters, wildcards and whitespace are dropped.
pub fn sanitize_subject_token(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '/' => Some('-'),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

/// Helper for relay subject formatting.
/// All subjects for one channel are computed once at construction time.
pub struct SubjectBuilder {
    /// Channel name reduced to one subject token
    channel_token: Arc<str>,
    /// "{prefix}.{channel}.trade"
    trade: Arc<str>,
    /// "{prefix}.{channel}.ticker"
    ticker: Arc<str>,
    /// "{prefix}.{channel}.time"
    server_time: Arc<str>,
    /// "{prefix}.{channel}.>"
    wildcard: Arc<str>,
    stream_name: Arc<str>,
}

impl SubjectBuilder {
    /// Create a SubjectBuilder for a channel with the default stream name:
    /// {PREFIX}_{CHANNEL} (uppercase, `.` and `-` replaced by `_`)
    pub fn new(prefix: &str, channel_name: &str) -> Self {
        let token = sanitize_subject_token(channel_name);
        let stream_name = format!("{}_{}", prefix, token)
            .to_uppercase()
            .replace(['.', '-'], "_");
        Self::with_stream(prefix, channel_name, stream_name)
    }

    /// Create a SubjectBuilder with an explicit JetStream stream name.
    ///
    /// Example:
    /// ```ignore
    /// let builder = SubjectBuilder::with_stream("prod.markets", "Kraken/BTC/USD", "PROD_MARKETS");
    /// assert_eq!(builder.trade(), "prod.markets.Kraken-BTC-USD.trade");
    /// ```
    pub fn with_stream(
        prefix: &str,
        channel_name: &str,
        stream_name: impl Into<Arc<str>>,
    ) -> Self {
        let token = sanitize_subject_token(channel_name);
        let base = format!("{}.{}", prefix, token);

        Self {
            trade: format!("{}.trade", base).into(),
            ticker: format!("{}.ticker", base).into(),
            server_time: format!("{}.time", base).into(),
            wildcard: format!("{}.>", base).into(),
            channel_token: token.into(),
            stream_name: stream_name.into(),
        }
    }

    #[inline]
    pub fn channel_token(&self) -> &str {
        &self.channel_token
    }

    #[inline]
    pub fn trade(&self) -> &str {
        &self.trade
    }

    #[inline]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    #[inline]
    pub fn server_time(&self) -> &str {
        &self.server_time
    }

    /// Wildcard subject for everything on this channel
    #[inline]
    pub fn all(&self) -> &str {
        &self.wildcard
    }

    #[inline]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_symbol() {
        assert_eq!(sanitize_subject_token("Kraken/BTC/USD"), "Kraken-BTC-USD");
        assert_eq!(sanitize_subject_token("XRP_EUR"), "XRP_EUR");
        assert_eq!(sanitize_subject_token("NODASH"), "NODASH");
    }

    #[test]
    fn test_sanitize_strips_nats_wildcards() {
        assert_eq!(sanitize_subject_token("BTC.USD"), "BTCUSD");
        assert_eq!(sanitize_subject_token("BTC>USD"), "BTCUSD");
        assert_eq!(sanitize_subject_token("BTC*USD"), "BTCUSD");
        assert_eq!(sanitize_subject_token("BTC/USD .>"), "BTC-USD");
    }

    #[test]
    fn test_channel_subjects() {
        let builder = SubjectBuilder::new("dev", "Kraken/BTC/USD");
        assert_eq!(builder.channel_token(), "Kraken-BTC-USD");
        assert_eq!(builder.trade(), "dev.Kraken-BTC-USD.trade");
        assert_eq!(builder.ticker(), "dev.Kraken-BTC-USD.ticker");
        assert_eq!(builder.server_time(), "dev.Kraken-BTC-USD.time");
        assert_eq!(builder.all(), "dev.Kraken-BTC-USD.>");
    }

    #[test]
    fn test_default_stream_name() {
        let builder = SubjectBuilder::new("prod.markets", "Bitstamp/BTC/USD");
        assert_eq!(builder.stream_name(), "PROD_MARKETS_BITSTAMP_BTC_USD");
    }

    #[test]
    fn test_with_stream() {
        let builder = SubjectBuilder::with_stream("prod.markets", "Kraken/ETH/EUR", "PROD_MARKETS");
        assert_eq!(builder.trade(), "prod.markets.Kraken-ETH-EUR.trade");
        assert_eq!(builder.stream_name(), "PROD_MARKETS");
    }
}
