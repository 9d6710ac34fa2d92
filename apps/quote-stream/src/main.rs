//! Quote Stream Binary
//!
//! Streams real-time quotes for a list of tickers and prints each decoded
//! quote as one JSON line on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p quote-stream -- AAPL MSFT BTC-USD
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_STREAM_TICKERS`: Tickers when none are given as arguments
//! - `QUOTE_STREAM_URL`: Streaming endpoint (default: wss://streamer.finance.yahoo.com)
//! - `QUOTE_STREAM_ORIGIN`: Origin header (default: <https://finance.yahoo.com>)
//! - `QUOTE_STREAM_SETTLE_DELAY_MS`: Post-open settle delay (default: 3000)
//! - `QUOTE_STREAM_CLOSE_TIMEOUT_MS`: Close handshake timeout (default: 5000)
//! - `QUOTE_STREAM_EVENT_CAPACITY`: Event channel capacity (default: 1024)
//! - `QUOTE_STREAM_METRICS_PORT`: Prometheus listener port, 0 disables (default: 0)
//! - `QUOTE_STREAM_RECONNECT`: Reconnect after a server-side close (default: true)
//! - `QUOTE_STREAM_RECONNECT_DELAY_INITIAL_MS` / `_MAX_MS` / `_MULTIPLIER`: Backoff shape
//! - `QUOTE_STREAM_MAX_RECONNECT_ATTEMPTS`: 0 retries forever (default: 0)
//! - `QUOTE_STREAM_LOG_FORMAT`: `pretty` or `compact` (default: pretty)
//! - `RUST_LOG`: Log filter (default: `quote_stream=info`)

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Context as _;
use quote_stream::application::reconnect::ReconnectBackoff;
use quote_stream::domain::quote::QuoteRecord;
use quote_stream::infrastructure::broadcast::{StreamEvent, StreamObserver};
use quote_stream::infrastructure::config::AppConfig;
use quote_stream::infrastructure::yahoo::{QuoteStream, StreamError};
use quote_stream::infrastructure::{metrics, telemetry};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

/// How long to let the session finish its close handshake on exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    load_dotenv();
    telemetry::init();

    if !provider_installed {
        tracing::debug!("rustls crypto provider already installed");
    }

    let config = AppConfig::from_env().context("invalid configuration")?;
    let tickers = tickers_from_args(&config);
    if tickers.is_empty() {
        anyhow::bail!("no tickers: pass symbols as arguments or set QUOTE_STREAM_TICKERS");
    }

    if config.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
        metrics::init_metrics(addr).context("failed to start metrics listener")?;
        tracing::info!(addr = %addr, "Metrics listener started");
    }

    log_config(&config, &tickers);

    let mut stream = QuoteStream::new(config.stream.clone());
    let mut events = stream.subscribe();
    let printer = stream.publisher().register(QuotePrinter);

    stream
        .add_ticker(tickers, false)
        .await
        .context("failed to open quote stream")?;

    let mut backoff = ReconnectBackoff::from_settings(&config.reconnect);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = shutdown.as_mut() => break,
            event = events.recv() => match event {
                Ok(StreamEvent::Connected) => backoff.reset(),
                Ok(StreamEvent::Disconnected) => {
                    if !config.reconnect.enabled {
                        tracing::info!("Stream closed by server, reconnect disabled");
                        break;
                    }
                    if !reconnect(&mut stream, &mut backoff, shutdown.as_mut()).await {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Control loop lagged behind stream events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    stream.close();
    drop(stream);
    if tokio::time::timeout(SHUTDOWN_GRACE, printer).await.is_err() {
        tracing::warn!("Session did not finish closing in time");
    }

    tracing::info!("Quote stream stopped");
    Ok(())
}

/// Retry `refresh(true)` with backoff. Returns `false` to stop the binary.
async fn reconnect<F>(
    stream: &mut QuoteStream,
    backoff: &mut ReconnectBackoff,
    mut shutdown: Pin<&mut F>,
) -> bool
where
    F: Future<Output = ()>,
{
    loop {
        let Some(delay) = backoff.next_delay() else {
            tracing::error!(attempts = backoff.attempts(), "Giving up reconnecting");
            return false;
        };

        tracing::info!(
            attempt = backoff.attempts(),
            delay_ms = delay.as_millis(),
            "Reconnecting to quote stream"
        );

        tokio::select! {
            () = shutdown.as_mut() => return false,
            () = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            () = shutdown.as_mut() => return false,
            result = stream.refresh(true) => result,
        };

        match result {
            Ok(()) => return true,
            Err(StreamError::EmptySubscription) => {
                tracing::warn!("No tickers left to resubscribe");
                return false;
            }
            Err(e) => tracing::warn!(error = %e, "Reconnect attempt failed"),
        }
    }
}

/// Prints quotes as JSON lines and logs lifecycle events.
struct QuotePrinter;

impl StreamObserver for QuotePrinter {
    fn on_connected(&mut self) {
        tracing::info!("Streaming quotes");
    }

    fn on_disconnected(&mut self) {
        tracing::warn!("Quote stream disconnected");
    }

    fn on_error(&mut self, error: &StreamError) {
        tracing::warn!(error = %error, "Quote stream error");
    }

    fn on_message(&mut self, quote: &QuoteRecord) {
        if quote.is_heartbeat() {
            tracing::trace!(id = %quote.id, "Heartbeat");
            return;
        }
        match quote.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(id = %quote.id, error = %e, "Quote not representable as JSON"),
        }
    }
}

/// Tickers from the command line, falling back to configuration.
fn tickers_from_args(config: &AppConfig) -> Vec<String> {
    let args: Vec<String> = std::env::args()
        .skip(1)
        .flat_map(|arg| quote_stream::infrastructure::config::parse_ticker_list(&arg))
        .collect();
    if args.is_empty() {
        config.tickers.clone()
    } else {
        args
    }
}

/// Log the parsed configuration.
fn log_config(config: &AppConfig, tickers: &[String]) {
    tracing::info!(
        url = %config.stream.url,
        tickers = ?tickers,
        reconnect = config.reconnect.enabled,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        origin = %config.stream.origin,
        settle_delay_ms = config.stream.settle_delay.as_millis(),
        close_timeout_ms = config.stream.close_timeout.as_millis(),
        event_capacity = config.stream.event_capacity,
        "Stream settings"
    );
}

/// Load .env file from the current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
