//! Tracing Subscriber Setup
//!
//! Installs a `tracing-subscriber` fmt layer on stderr filtered by
//! `RUST_LOG`, with `quote_stream=info` as the default directive. Only the
//! binary calls this; the library never installs a subscriber.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: extra filter directives (e.g. `quote_stream=debug`)
//! - `QUOTE_STREAM_LOG_FORMAT`: `pretty` (default) or `compact`

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter directive for this crate.
const DEFAULT_DIRECTIVE: &str = "quote_stream=info";

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Full fmt output with targets.
    #[default]
    Pretty,
    /// Single-line compact output.
    Compact,
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Directive applied before `RUST_LOG`.
    pub default_directive: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            format: LogFormat::default(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let format = match std::env::var("QUOTE_STREAM_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };

        Self {
            format,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let filter = EnvFilter::from_default_env();
        match self.default_directive.parse::<Directive>() {
            Ok(directive) => filter.add_directive(directive),
            Err(e) => {
                eprintln!("ignoring invalid log directive {:?}: {e}", self.default_directive);
                filter
            }
        }
    }
}

/// Initialize logging from the environment.
pub fn init() {
    init_with_config(&TelemetryConfig::from_env());
}

/// Initialize logging with custom configuration.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_with_config(config: &TelemetryConfig) {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let result = match config.format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.default_directive, DEFAULT_DIRECTIVE);
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn default_directive_parses() {
        assert!(DEFAULT_DIRECTIVE.parse::<Directive>().is_ok());
    }

    #[test]
    fn invalid_directive_is_ignored() {
        let config = TelemetryConfig {
            default_directive: "=[".to_string(),
            format: LogFormat::Compact,
        };
        let _filter = config.env_filter();
    }
}
