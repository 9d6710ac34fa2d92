//! Prometheus Metrics Module
//!
//! Stream health counters recorded through the `metrics` facade. Recording
//! is a no-op until a recorder is installed; the binary installs the
//! Prometheus exporter when a metrics port is configured.
//!
//! # Metrics
//!
//! - **Frames**: inbound frames, decoded quotes, decode failures by kind
//! - **Transport**: WebSocket errors and connection state
//! - **Subscriptions**: announcements sent and the current ticker count
//! - **Fan-out**: events skipped by lagging receivers

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static DESCRIBED: OnceLock<()> = OnceLock::new();

// =============================================================================
// Initialization
// =============================================================================

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be bound.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    describe_metrics();
    Ok(())
}

/// Register metric descriptions with the installed recorder. Idempotent.
pub fn describe_metrics() {
    DESCRIBED.get_or_init(|| {
        describe_counter!(
            "quote_stream_frames_received_total",
            "Total frames received from the quote streamer"
        );
        describe_counter!(
            "quote_stream_quotes_decoded_total",
            "Total frames decoded into quote records"
        );
        describe_counter!(
            "quote_stream_decode_errors_total",
            "Total frames that failed to decode, by error kind"
        );
        describe_counter!(
            "quote_stream_transport_errors_total",
            "Total WebSocket transport errors"
        );
        describe_counter!(
            "quote_stream_subscriptions_sent_total",
            "Total subscription announcements sent"
        );
        describe_counter!(
            "quote_stream_events_lagged_total",
            "Total events skipped by lagging receivers"
        );
        describe_gauge!(
            "quote_stream_connected",
            "Whether the streaming connection is open (0 or 1)"
        );
        describe_gauge!("quote_stream_tickers", "Number of subscribed tickers");
    });
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an inbound frame.
pub fn record_frame_received() {
    counter!("quote_stream_frames_received_total").increment(1);
}

/// Record a successfully decoded quote.
pub fn record_quote_decoded() {
    counter!("quote_stream_quotes_decoded_total").increment(1);
}

/// Record a decode failure.
pub fn record_decode_error(kind: &'static str) {
    counter!("quote_stream_decode_errors_total", "kind" => kind).increment(1);
}

/// Record a transport error.
pub fn record_transport_error() {
    counter!("quote_stream_transport_errors_total").increment(1);
}

/// Record a subscription announcement.
pub fn record_subscription_sent() {
    counter!("quote_stream_subscriptions_sent_total").increment(1);
}

/// Record events skipped by a lagging receiver.
pub fn record_events_lagged(count: u64) {
    counter!("quote_stream_events_lagged_total").increment(count);
}

/// Update the connection state gauge.
pub fn set_connected(connected: bool) {
    gauge!("quote_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the ticker count gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_tickers(count: usize) {
    gauge!("quote_stream_tickers").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
