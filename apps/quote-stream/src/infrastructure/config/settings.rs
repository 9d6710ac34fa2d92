//! Stream Configuration Settings
//!
//! Configuration types for the quote stream client, loaded from environment
//! variables. Unparseable numeric values fall back to their defaults.

use std::time::Duration;

/// Default streaming endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://streamer.finance.yahoo.com";

/// Default `Origin` header.
pub const DEFAULT_ORIGIN: &str = "https://finance.yahoo.com";

/// Connection manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// `Origin` header sent with the upgrade request.
    pub origin: String,
    /// Pause between the transport opening and `Connected`.
    pub settle_delay: Duration,
    /// How long to wait for the server's close reply.
    pub close_timeout: Duration,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            settle_delay: Duration::from_secs(3),
            close_timeout: Duration::from_secs(5),
            event_capacity: 1024,
        }
    }
}

impl StreamSettings {
    /// Settings for `url` with every other value defaulted.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Replace the settle delay.
    #[must_use]
    pub const fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Replace the close timeout.
    #[must_use]
    pub const fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Check the endpoint scheme and origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not `ws://`/`wss://` or the origin is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_host = self
            .url
            .strip_prefix("wss://")
            .or_else(|| self.url.strip_prefix("ws://"))
            .is_some_and(|rest| !rest.is_empty());
        if !has_host {
            return Err(ConfigError::InvalidUrl(self.url.clone()));
        }
        if self.origin.trim().is_empty() {
            return Err(ConfigError::EmptyValue("QUOTE_STREAM_ORIGIN".to_string()));
        }
        Ok(())
    }
}

/// Caller-side reconnection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    /// Reconnect after a close the caller did not request.
    pub enabled: bool,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor per failed attempt.
    pub multiplier: f64,
    /// Attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 0,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Connection manager settings.
    pub stream: StreamSettings,
    /// Tickers to subscribe at start-up.
    pub tickers: Vec<String>,
    /// Prometheus listener port (0 = disabled).
    pub metrics_port: u16,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
}

impl AppConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint or origin is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint or origin is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let stream_defaults = StreamSettings::default();
        let reconnect_defaults = ReconnectSettings::default();

        let stream = StreamSettings {
            url: env.string("QUOTE_STREAM_URL", stream_defaults.url),
            origin: env.string("QUOTE_STREAM_ORIGIN", stream_defaults.origin),
            settle_delay: env.millis("QUOTE_STREAM_SETTLE_DELAY_MS", stream_defaults.settle_delay),
            close_timeout: env.millis(
                "QUOTE_STREAM_CLOSE_TIMEOUT_MS",
                stream_defaults.close_timeout,
            ),
            event_capacity: env.parse(
                "QUOTE_STREAM_EVENT_CAPACITY",
                stream_defaults.event_capacity,
            ),
        };
        stream.validate()?;

        let tickers = env
            .get("QUOTE_STREAM_TICKERS")
            .map(|v| parse_ticker_list(&v))
            .unwrap_or_default();

        let reconnect = ReconnectSettings {
            enabled: env.flag("QUOTE_STREAM_RECONNECT", reconnect_defaults.enabled),
            initial_delay: env.millis(
                "QUOTE_STREAM_RECONNECT_DELAY_INITIAL_MS",
                reconnect_defaults.initial_delay,
            ),
            max_delay: env.millis(
                "QUOTE_STREAM_RECONNECT_DELAY_MAX_MS",
                reconnect_defaults.max_delay,
            ),
            multiplier: env.parse(
                "QUOTE_STREAM_RECONNECT_DELAY_MULTIPLIER",
                reconnect_defaults.multiplier,
            ),
            max_attempts: env.parse(
                "QUOTE_STREAM_MAX_RECONNECT_ATTEMPTS",
                reconnect_defaults.max_attempts,
            ),
        };

        Ok(Self {
            stream,
            tickers,
            metrics_port: env.parse("QUOTE_STREAM_METRICS_PORT", 0),
            reconnect,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Endpoint is not a WebSocket URL.
    #[error("invalid stream URL {0:?}: expected ws:// or wss://")]
    InvalidUrl(String),
    /// Variable has an empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Split a comma- or whitespace-separated ticker list, dropping blanks.
#[must_use]
pub fn parse_ticker_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn string(&self, key: &str, default: String) -> String {
        self.get(key).unwrap_or(default)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn stream_settings_defaults() {
        let settings = StreamSettings::default();
        assert_eq!(settings.url, "wss://streamer.finance.yahoo.com");
        assert_eq!(settings.origin, "https://finance.yahoo.com");
        assert_eq!(settings.settle_delay, Duration::from_secs(3));
        assert_eq!(settings.close_timeout, Duration::from_secs(5));
        assert_eq!(settings.event_capacity, 1024);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.stream, StreamSettings::default());
        assert!(config.tickers.is_empty());
        assert_eq!(config.metrics_port, 0);
        assert_eq!(config.reconnect, ReconnectSettings::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("QUOTE_STREAM_URL", "ws://127.0.0.1:9000"),
            ("QUOTE_STREAM_SETTLE_DELAY_MS", "50"),
            ("QUOTE_STREAM_EVENT_CAPACITY", "16"),
            ("QUOTE_STREAM_TICKERS", "AAPL, MSFT,,BTC-USD"),
            ("QUOTE_STREAM_METRICS_PORT", "9464"),
            ("QUOTE_STREAM_RECONNECT", "off"),
        ])
        .unwrap();

        assert_eq!(config.stream.url, "ws://127.0.0.1:9000");
        assert_eq!(config.stream.settle_delay, Duration::from_millis(50));
        assert_eq!(config.stream.event_capacity, 16);
        assert_eq!(config.tickers, ["AAPL", "MSFT", "BTC-USD"]);
        assert_eq!(config.metrics_port, 9464);
        assert!(!config.reconnect.enabled);
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = config_from(&[
            ("QUOTE_STREAM_SETTLE_DELAY_MS", "soon"),
            ("QUOTE_STREAM_METRICS_PORT", "-1"),
        ])
        .unwrap();
        assert_eq!(config.stream.settle_delay, Duration::from_secs(3));
        assert_eq!(config.metrics_port, 0);
    }

    #[test]
    fn non_websocket_url_is_rejected() {
        let err = config_from(&[("QUOTE_STREAM_URL", "https://example.com")]).unwrap_err();
        assert_eq!(err, ConfigError::InvalidUrl("https://example.com".to_string()));

        assert!(matches!(
            config_from(&[("QUOTE_STREAM_URL", "wss://")]),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn empty_origin_is_rejected() {
        let err = config_from(&[("QUOTE_STREAM_ORIGIN", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn ticker_list_parsing() {
        assert_eq!(parse_ticker_list("AAPL MSFT,GOOG"), ["AAPL", "MSFT", "GOOG"]);
        assert!(parse_ticker_list(" , ").is_empty());
    }
}
