#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::unreadable_literal
    )
)]

//! Quote Stream - Real-Time Quote Client
//!
//! Keeps one WebSocket connection to the quote streamer, mirrors a local
//! ticker set into the server-side subscription, and decodes every pushed
//! frame into a [`QuoteRecord`] for local subscribers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core quote types with no I/O
//!   - `quote`: decoded quote records and classification enums
//!   - `tickers`: the client-side ticker set
//!
//! - **Application**: Caller-side policies
//!   - `reconnect`: backoff used by the binary after unexpected closes
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `yahoo`: field schema, frame codec and the connection manager
//!   - `broadcast`: event fan-out to local subscribers
//!   - `config`: environment-driven settings
//!   - `metrics` / `telemetry`: observability plumbing
//!
//! # Data Flow
//!
//! ```text
//!                  {"subscribe":[...]}
//!   QuoteStream ──────────────────────────► streamer
//!        │                                     │
//!        │ session task ◄── base64 frames ─────┘
//!        │      │
//!        │      ▼ QuoteDecoder
//!        └──► EventPublisher ──► receivers / observers
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core quote types with no external dependencies.
pub mod domain;

/// Application layer - Caller-side policies.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{MAX_SAFE_INTEGER, MarketHours, OptionType, QuoteRecord, QuoteType};
pub use domain::tickers::{Ticker, TickerSet};

// Stream client
pub use infrastructure::yahoo::{
    ConnectionState, DecodeError, QuoteDecoder, QuoteStream, SchemaError, StreamError,
    encode_frame, encode_quote,
};

// Events
pub use infrastructure::broadcast::{EventPublisher, StreamEvent, StreamObserver};

// Config
pub use infrastructure::config::{AppConfig, ConfigError, StreamSettings};

// Reconnect policy
pub use application::reconnect::ReconnectBackoff;
