//! Quote Stream Client
//!
//! Owns the WebSocket connection to the quote streamer and keeps the
//! server-side subscription in step with the local ticker set.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──open + settle──► Open
//!      ▲                                                     │
//!      └──────────── close() / server close / error ─────────┘
//! ```
//!
//! After the socket opens the client waits a settle delay, publishes
//! `Connected`, announces the ticker set, then hands the socket to a
//! session task that decodes inbound frames. The client never reconnects
//! on its own; callers react to `Disconnected` and call `refresh(true)`.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::{DecodeError, QuoteDecoder};
use super::messages::SubscribeRequest;
use super::schema::{Schema, SchemaError};
use crate::domain::tickers::{Ticker, TickerSet};
use crate::infrastructure::broadcast::{EventPublisher, StreamEvent};
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Message>;
type SocketSource = SplitStream<Socket>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors reported by the stream client.
///
/// Cloneable so one failure can be both returned and published.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// `connect()` was called with no tickers to subscribe to.
    #[error("cannot connect with an empty ticker set")]
    EmptySubscription,

    /// The quote field table failed validation.
    #[error("quote schema failed to load: {0}")]
    SchemaLoad(#[from] SchemaError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    Transport(#[source] Arc<tungstenite::Error>),

    /// Endpoint or header could not form an upgrade request.
    #[error("invalid connection request: {0}")]
    InvalidRequest(String),

    /// Subscription announcement failed to serialize.
    #[error("failed to encode subscription: {0}")]
    Encode(#[source] Arc<serde_json::Error>),

    /// Inbound frame failed to decode.
    #[error("failed to decode quote frame: {0}")]
    Decode(#[from] DecodeError),
}

impl From<tungstenite::Error> for StreamError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Transport(Arc::new(error))
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(error: serde_json::Error) -> Self {
        Self::Encode(Arc::new(error))
    }
}

impl StreamError {
    /// Whether the error is a `connect()` precondition rather than a
    /// runtime failure. Preconditions are returned, never published.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::EmptySubscription | Self::SchemaLoad(_))
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Socket opening or settling.
    Connecting,
    /// Socket open and announced.
    Open,
}

impl ConnectionState {
    /// Lowercase label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
        }
    }
}

/// Commands from the client to its session task.
#[derive(Debug)]
enum Outbound {
    Frame(String),
    Close,
}

/// Handle to a running session task.
#[derive(Debug)]
struct Session {
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: CancellationToken,
}

#[derive(Debug)]
enum Link {
    Disconnected,
    Connecting,
    Open(Session),
}

/// Holds `Connecting` for the duration of a connect attempt and falls back
/// to `Disconnected` unless the attempt completes.
struct ConnectAttempt<'a> {
    link: &'a mut Link,
    completed: bool,
}

impl<'a> ConnectAttempt<'a> {
    fn begin(link: &'a mut Link) -> Self {
        *link = Link::Connecting;
        Self {
            link,
            completed: false,
        }
    }

    fn complete(mut self, session: Session) {
        *self.link = Link::Open(session);
        self.completed = true;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.completed {
            *self.link = Link::Disconnected;
        }
    }
}

// =============================================================================
// Quote Stream
// =============================================================================

/// Streaming quote client.
///
/// One instance owns one socket and one ticker set. Operations take
/// `&mut self`, so caller calls never interleave with each other; inbound
/// frames are handled on a session task and surface as [`StreamEvent`]s.
///
/// # Example
///
/// ```rust,no_run
/// use quote_stream::infrastructure::broadcast::StreamEvent;
/// use quote_stream::infrastructure::config::StreamSettings;
/// use quote_stream::infrastructure::yahoo::QuoteStream;
///
/// # async fn run() -> Result<(), quote_stream::infrastructure::yahoo::StreamError> {
/// let mut stream = QuoteStream::new(StreamSettings::default());
/// let mut events = stream.subscribe();
///
/// // First subscription connects
/// stream.add_ticker(["AAPL", "MSFT"], false).await?;
///
/// while let Ok(event) = events.recv().await {
///     if let StreamEvent::Message(quote) = event {
///         println!("{} {}", quote.id, quote.price);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct QuoteStream {
    settings: StreamSettings,
    tickers: TickerSet,
    link: Link,
    publisher: EventPublisher,
}

impl Default for QuoteStream {
    fn default() -> Self {
        Self::new(StreamSettings::default())
    }
}

impl QuoteStream {
    /// Create a disconnected client with no tickers.
    #[must_use]
    pub fn new(settings: StreamSettings) -> Self {
        let publisher = EventPublisher::new(settings.event_capacity);
        Self {
            settings,
            tickers: TickerSet::new(),
            link: Link::Disconnected,
            publisher,
        }
    }

    /// Create a disconnected client with initial tickers. Does not connect.
    #[must_use]
    pub fn with_tickers<I, S>(settings: StreamSettings, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Ticker>,
    {
        let mut stream = Self::new(settings);
        stream.tickers.add(tickers, false);
        metrics::set_tickers(stream.tickers.len());
        stream
    }

    /// Connection settings.
    #[must_use]
    pub const fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Current ticker set.
    #[must_use]
    pub const fn tickers(&self) -> &TickerSet {
        &self.tickers
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        match &self.link {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connecting => ConnectionState::Connecting,
            Link::Open(session) if session.closed.is_cancelled() => {
                ConnectionState::Disconnected
            }
            Link::Open(_) => ConnectionState::Open,
        }
    }

    /// Whether the connection is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Event publisher shared with the session task.
    #[must_use]
    pub const fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// New event receiver. Sees events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StreamEvent> {
        self.publisher.subscribe()
    }

    /// New event receiver as a `Stream`.
    pub fn event_stream(&self) -> impl Stream<Item = StreamEvent> + Send + Unpin + 'static {
        self.publisher.stream()
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Add tickers, optionally replacing the set, and sync the server.
    ///
    /// Connects first when the set was empty before the call (after the
    /// optional clear); otherwise re-announces on the open connection.
    ///
    /// # Errors
    ///
    /// Returns connect-time errors when this call triggers a connect.
    pub async fn add_ticker<I, S>(&mut self, symbols: I, clear: bool) -> Result<(), StreamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Ticker>,
    {
        let was_empty = self.tickers.add(symbols, clear);
        metrics::set_tickers(self.tickers.len());
        tracing::debug!(
            tickers = self.tickers.len(),
            clear,
            was_empty,
            "Tickers added"
        );

        self.refresh(was_empty).await
    }

    /// Remove one ticker, or all when `symbol` is empty, and re-announce.
    ///
    /// # Errors
    ///
    /// Returns an error if the announcement cannot be encoded.
    pub fn remove_ticker(&mut self, symbol: &str) -> Result<(), StreamError> {
        self.tickers.remove(symbol);
        metrics::set_tickers(self.tickers.len());
        tracing::debug!(symbol, tickers = self.tickers.len(), "Tickers removed");

        self.announce()
    }

    /// Sync the server with the ticker set, connecting first if `force`.
    ///
    /// An empty set on an open connection is still announced.
    ///
    /// # Errors
    ///
    /// Returns connect-time errors when `force` is set.
    pub async fn refresh(&mut self, force: bool) -> Result<(), StreamError> {
        if force && self.establish().await? {
            // A fresh session was announced with the current set.
            return Ok(());
        }
        self.announce()
    }

    // =========================================================================
    // Connection Operations
    // =========================================================================

    /// Open the connection and announce the ticker set. No-op when open.
    ///
    /// Resolves after the socket opened, the settle delay elapsed and the
    /// first announcement was sent.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::EmptySubscription`] with no tickers,
    /// [`StreamError::SchemaLoad`] if the field table is invalid, and
    /// transport errors if the socket cannot be opened.
    pub async fn connect(&mut self) -> Result<(), StreamError> {
        self.establish().await.map(drop)
    }

    /// Close the connection and clear the ticker set. No-op unless open.
    pub fn close(&mut self) {
        self.reap();
        match std::mem::replace(&mut self.link, Link::Disconnected) {
            Link::Open(session) => {
                tracing::info!(tickers = self.tickers.len(), "Closing quote stream");
                if session.outbound.send(Outbound::Close).is_err() {
                    tracing::debug!("Session task already stopped");
                }
                self.tickers.clear();
                metrics::set_tickers(0);
                metrics::set_connected(false);
            }
            other => self.link = other,
        }
    }

    /// Drop a session whose task has ended.
    fn reap(&mut self) {
        if let Link::Open(session) = &self.link
            && session.closed.is_cancelled()
        {
            self.link = Link::Disconnected;
        }
    }

    /// Connect unless open. Returns `true` if a new session was started.
    async fn establish(&mut self) -> Result<bool, StreamError> {
        self.reap();
        if self.is_active() {
            return Ok(false);
        }
        if self.tickers.is_empty() {
            tracing::warn!("Refusing to connect with an empty ticker set");
            return Err(StreamError::EmptySubscription);
        }

        let schema = Schema::load().inspect_err(|e| {
            tracing::error!(error = %e, "Quote schema failed to load");
        })?;
        let request = upgrade_request(&self.settings)
            .inspect_err(|e| report_connect_error(&self.publisher, e))?;

        let Self {
            settings,
            tickers,
            link,
            publisher,
        } = self;
        let attempt = ConnectAttempt::begin(link);

        tracing::info!(
            url = %settings.url,
            tickers = tickers.len(),
            "Connecting to quote stream"
        );

        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| {
                metrics::record_transport_error();
                let error = StreamError::from(e);
                report_connect_error(publisher, &error);
                error
            })?;
        let (mut sink, source) = socket.split();

        tokio::time::sleep(settings.settle_delay).await;

        publisher.publish(StreamEvent::Connected);
        metrics::set_connected(true);
        tracing::info!(tickers = tickers.len(), "Quote stream connected");

        if let Err(e) = send_subscribe(&mut sink, tickers).await {
            tracing::warn!(error = %e, "Initial subscription failed");
            metrics::set_connected(false);
            publisher.publish(StreamEvent::Error(Arc::new(e.clone())));
            publisher.publish(StreamEvent::Disconnected);
            return Err(e);
        }

        let (outbound, commands) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        let task = SessionTask {
            sink,
            source,
            commands,
            decoder: QuoteDecoder::new(schema),
            publisher: publisher.clone(),
            closed: closed.clone(),
            close_timeout: settings.close_timeout,
        };
        tokio::spawn(task.run());

        attempt.complete(Session { outbound, closed });
        Ok(true)
    }

    /// Queue an announcement of the current set if open.
    fn announce(&mut self) -> Result<(), StreamError> {
        self.reap();
        let Link::Open(session) = &self.link else {
            tracing::debug!(
                state = self.state().as_str(),
                "Not open, subscription not announced"
            );
            return Ok(());
        };

        let request = SubscribeRequest::for_tickers(&self.tickers);
        let frame = request.to_json()?;
        tracing::debug!(tickers = ?request.subscribe, "Sending subscribe request");

        if session.outbound.send(Outbound::Frame(frame)).is_err() {
            tracing::debug!("Session task stopped before announcement");
            self.link = Link::Disconnected;
        }
        Ok(())
    }
}

fn upgrade_request(settings: &StreamSettings) -> Result<Request, StreamError> {
    let mut request = settings
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| StreamError::InvalidRequest(format!("{}: {e}", settings.url)))?;

    let origin = HeaderValue::from_str(&settings.origin)
        .map_err(|e| StreamError::InvalidRequest(format!("origin {:?}: {e}", settings.origin)))?;
    request.headers_mut().insert(ORIGIN, origin);

    Ok(request)
}

async fn send_subscribe(sink: &mut SocketSink, tickers: &TickerSet) -> Result<(), StreamError> {
    let request = SubscribeRequest::for_tickers(tickers);
    let frame = request.to_json()?;
    tracing::debug!(tickers = ?request.subscribe, "Sending subscribe request");

    sink.send(Message::Text(frame.into())).await?;
    metrics::record_subscription_sent();
    Ok(())
}

// =============================================================================
// Session Task
// =============================================================================

/// Socket owner for one open connection.
struct SessionTask {
    sink: SocketSink,
    source: SocketSource,
    commands: mpsc::UnboundedReceiver<Outbound>,
    decoder: QuoteDecoder,
    publisher: EventPublisher,
    closed: CancellationToken,
    close_timeout: std::time::Duration,
}

impl SessionTask {
    async fn run(self) {
        let Self {
            mut sink,
            mut source,
            mut commands,
            decoder,
            publisher,
            closed,
            close_timeout,
        } = self;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = sink.send(Message::Text(frame.into())).await {
                            report_transport_error(&publisher, e);
                            break;
                        }
                        metrics::record_subscription_sent();
                    }
                    Some(Outbound::Close) | None => {
                        close_handshake(&mut sink, &mut source, close_timeout).await;
                        break;
                    }
                },
                inbound = source.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&decoder, &publisher, text.as_str());
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => handle_frame(&decoder, &publisher, text),
                        Err(_) => report_decode_error(
                            &publisher,
                            DecodeError::InvalidEnvelope("binary frame is not UTF-8".to_string()),
                        ),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "Server closed quote stream");
                        let _ = tokio::time::timeout(close_timeout, sink.close()).await;
                        break;
                    }
                    // Pings are answered by the protocol layer.
                    Some(Ok(_)) => {}
                    // The read half is fused after any error.
                    Some(Err(e)) => {
                        report_transport_error(&publisher, e);
                        break;
                    }
                    None => {
                        tracing::info!("Quote stream ended");
                        break;
                    }
                },
            }
        }

        closed.cancel();
        metrics::set_connected(false);
        tracing::info!("Quote stream disconnected");
        publisher.publish(StreamEvent::Disconnected);
    }
}

/// Send a close frame and wait, bounded, for the server's reply.
async fn close_handshake(
    sink: &mut SocketSink,
    source: &mut SocketSource,
    timeout: std::time::Duration,
) {
    if let Err(e) = sink.send(Message::Close(None)).await {
        tracing::debug!(error = %e, "Close frame not sent");
        return;
    }

    let reply = tokio::time::timeout(timeout, async {
        while let Some(frame) = source.next().await {
            if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    })
    .await;

    if reply.is_err() {
        tracing::warn!(
            timeout_ms = timeout.as_millis(),
            "No close reply from quote stream"
        );
    }
}

/// Publish a connect-time failure that is not a precondition.
fn report_connect_error(publisher: &EventPublisher, error: &StreamError) {
    tracing::warn!(error = %error, "Quote stream connection failed");
    publisher.publish(StreamEvent::Error(Arc::new(error.clone())));
}

fn handle_frame(decoder: &QuoteDecoder, publisher: &EventPublisher, text: &str) {
    metrics::record_frame_received();
    match decoder.decode_frame(text) {
        Ok(quote) => {
            metrics::record_quote_decoded();
            tracing::trace!(
                id = %quote.id,
                price = quote.price,
                quote_type = %quote.quote_type,
                "Quote decoded"
            );
            publisher.publish(StreamEvent::Message(Box::new(quote)));
        }
        Err(e) => report_decode_error(publisher, e),
    }
}

fn report_decode_error(publisher: &EventPublisher, error: DecodeError) {
    metrics::record_decode_error(error.kind());
    tracing::warn!(error = %error, "Failed to decode quote frame");
    publisher.publish(StreamEvent::Error(Arc::new(error.into())));
}

fn report_transport_error(publisher: &EventPublisher, error: tungstenite::Error) {
    metrics::record_transport_error();
    tracing::warn!(error = %error, "Quote stream transport error");
    publisher.publish(StreamEvent::Error(Arc::new(error.into())));
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;

    fn settings(url: &str) -> StreamSettings {
        StreamSettings::with_url(url).settle_delay(Duration::from_millis(10))
    }

    #[test]
    fn new_client_is_disconnected_and_empty() {
        let stream = QuoteStream::default();
        assert_eq!(stream.state(), ConnectionState::Disconnected);
        assert!(!stream.is_active());
        assert!(stream.tickers().is_empty());
    }

    #[test]
    fn with_tickers_does_not_connect() {
        let stream = QuoteStream::with_tickers(StreamSettings::default(), ["AAPL", "AAPL", "MSFT"]);
        assert_eq!(stream.tickers().len(), 2);
        assert_eq!(stream.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_with_empty_set_fails() {
        let mut stream = QuoteStream::default();
        let err = stream.connect().await.unwrap_err();
        assert!(matches!(err, StreamError::EmptySubscription));
        assert_eq!(stream.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn add_of_nothing_to_empty_set_fails() {
        let mut stream = QuoteStream::default();
        let err = stream
            .add_ticker(Vec::<String>::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::EmptySubscription));
    }

    #[test]
    fn close_when_disconnected_is_noop() {
        let mut stream = QuoteStream::with_tickers(StreamSettings::default(), ["AAPL"]);
        stream.close();
        assert_eq!(stream.state(), ConnectionState::Disconnected);
        assert_eq!(stream.tickers().len(), 1);
    }

    #[test]
    fn remove_when_disconnected_only_edits_set() {
        let mut stream = QuoteStream::with_tickers(StreamSettings::default(), ["AAPL", "MSFT"]);
        stream.remove_ticker("AAPL").unwrap();
        assert_eq!(stream.tickers().to_vec(), ["MSFT"]);
        stream.remove_ticker("").unwrap();
        assert!(stream.tickers().is_empty());
    }

    #[tokio::test]
    async fn invalid_url_is_rejected() {
        let mut stream = QuoteStream::with_tickers(settings("not a url"), ["AAPL"]);
        let err = stream.connect().await.unwrap_err();
        assert!(matches!(err, StreamError::InvalidRequest(_)));
        assert_eq!(stream.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut stream = QuoteStream::with_tickers(settings(&format!("ws://{addr}")), ["AAPL"]);
        let err = stream.connect().await.unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
        assert_eq!(stream.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn refused_connection_is_published() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut stream = QuoteStream::with_tickers(settings(&format!("ws://{addr}")), ["AAPL"]);
        let mut events = stream.subscribe();
        let err = stream.refresh(true).await.unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));

        match events.try_recv().unwrap() {
            StreamEvent::Error(error) => assert!(matches!(*error, StreamError::Transport(_))),
            other => panic!("expected error event, got {other:?}"),
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn preconditions_are_not_published() {
        let mut stream = QuoteStream::default();
        let mut events = stream.subscribe();

        let err = stream.connect().await.unwrap_err();

        assert!(err.is_precondition());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn abandoned_connect_returns_to_disconnected() {
        // Accepts TCP but never answers the upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut stream = QuoteStream::with_tickers(settings(&format!("ws://{addr}")), ["AAPL"]);
        let attempt = tokio::time::timeout(Duration::from_millis(100), stream.connect()).await;
        assert!(attempt.is_err());
        assert_eq!(stream.state(), ConnectionState::Disconnected);
        drop(listener);
    }

    #[test]
    fn upgrade_request_carries_origin() {
        let request = upgrade_request(&StreamSettings::default()).unwrap();
        assert_eq!(
            request.headers().get(ORIGIN).unwrap(),
            "https://finance.yahoo.com"
        );
        assert_eq!(request.uri().host(), Some("streamer.finance.yahoo.com"));
    }

    #[test]
    fn upgrade_request_rejects_bad_origin() {
        let mut settings = StreamSettings::default();
        settings.origin = "bad\norigin".to_string();
        assert!(matches!(
            upgrade_request(&settings),
            Err(StreamError::InvalidRequest(_))
        ));
    }
}
