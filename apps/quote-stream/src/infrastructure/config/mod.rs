//! Configuration Module
//!
//! Environment-driven configuration for the stream client and binary.

mod settings;

pub use settings::{
    AppConfig, ConfigError, DEFAULT_ORIGIN, DEFAULT_STREAM_URL, ReconnectSettings, StreamSettings,
    parse_ticker_list,
};
