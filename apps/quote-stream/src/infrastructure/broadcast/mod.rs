//! Event Publisher
//!
//! Fans stream events out to any number of local subscribers over one
//! tokio broadcast channel.
//!
//! # Event Kinds
//!
//! - `Connected`: the transport opened and settled
//! - `Disconnected`: the session ended (last event of a session)
//! - `Error`: transport or decode failure; the session may continue
//! - `Message`: one decoded quote
//!
//! Events from one session arrive in publication order. A receiver that
//! falls more than the channel capacity behind skips the oldest events;
//! the skip is logged and counted.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};

use super::metrics;
use super::yahoo::client::StreamError;
use crate::domain::quote::QuoteRecord;

/// Default channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// =============================================================================
// Stream Events
// =============================================================================

/// Event published by the connection manager.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Transport opened and settled.
    Connected,
    /// Session ended.
    Disconnected,
    /// Transport or decode failure.
    Error(Arc<StreamError>),
    /// Decoded quote.
    Message(Box<QuoteRecord>),
}

impl StreamEvent {
    /// Short label for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error(_) => "error",
            Self::Message(_) => "message",
        }
    }
}

// =============================================================================
// Observer
// =============================================================================

/// Callback-style consumer of stream events.
///
/// Hooks run on a dedicated task in publication order. Every hook but
/// `on_message` defaults to doing nothing.
pub trait StreamObserver: Send + 'static {
    /// Transport opened and settled.
    fn on_connected(&mut self) {}

    /// Session ended.
    fn on_disconnected(&mut self) {}

    /// Transport or decode failure.
    fn on_error(&mut self, error: &StreamError) {
        let _ = error;
    }

    /// Decoded quote.
    fn on_message(&mut self, quote: &QuoteRecord);

    /// Route one event to its hook.
    fn dispatch(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Connected => self.on_connected(),
            StreamEvent::Disconnected => self.on_disconnected(),
            StreamEvent::Error(error) => self.on_error(error),
            StreamEvent::Message(quote) => self.on_message(quote),
        }
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Cloneable handle to the event channel.
///
/// # Example
///
/// ```rust
/// use quote_stream::infrastructure::broadcast::{EventPublisher, StreamEvent};
///
/// let publisher = EventPublisher::new(16);
/// let mut rx = publisher.subscribe();
///
/// assert_eq!(publisher.publish(StreamEvent::Connected), 1);
/// assert!(matches!(rx.try_recv(), Ok(StreamEvent::Connected)));
/// ```
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<StreamEvent>,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventPublisher {
    /// Create a publisher. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Deliver `event` to every current receiver.
    ///
    /// Returns the number of receivers reached; zero when nobody listens.
    pub fn publish(&self, event: StreamEvent) -> usize {
        let kind = event.name();
        let reached = self.tx.send(event).unwrap_or(0);
        tracing::trace!(event = kind, receivers = reached, "Published stream event");
        reached
    }

    /// New raw receiver. Sees events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    /// New receiver as a `Stream`. Lag gaps are logged and skipped.
    pub fn stream(&self) -> impl Stream<Item = StreamEvent> + Send + Unpin + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                note_lagged(skipped);
                None
            }
        })
    }

    /// Spawn a task feeding every event to `observer`.
    ///
    /// The task ends when every publisher handle is dropped. Must be called
    /// from within a Tokio runtime.
    pub fn register<O: StreamObserver>(&self, mut observer: O) -> JoinHandle<()> {
        let mut rx = self.tx.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => observer.dispatch(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => note_lagged(skipped),
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

fn note_lagged(skipped: u64) {
    tracing::warn!(skipped, "Event receiver lagged");
    metrics::record_events_lagged(skipped);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn quote(id: &str) -> StreamEvent {
        StreamEvent::Message(Box::new(QuoteRecord {
            id: id.to_string(),
            ..QuoteRecord::default()
        }))
    }

    #[test]
    fn publish_without_receivers_reaches_none() {
        let publisher = EventPublisher::new(8);
        assert_eq!(publisher.publish(StreamEvent::Connected), 0);
    }

    #[test]
    fn receiver_count_follows_subscriptions() {
        let publisher = EventPublisher::default();
        {
            let _rx1 = publisher.subscribe();
            let _rx2 = publisher.subscribe();
            assert_eq!(publisher.receiver_count(), 2);
        }
        assert_eq!(publisher.receiver_count(), 0);
    }

    #[tokio::test]
    async fn every_receiver_sees_events_in_order() {
        let publisher = EventPublisher::new(8);
        let mut rx1 = publisher.subscribe();
        let mut rx2 = publisher.subscribe();

        publisher.publish(StreamEvent::Connected);
        publisher.publish(quote("AAPL"));
        publisher.publish(StreamEvent::Disconnected);

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(rx.recv().await.unwrap(), StreamEvent::Connected));
            match rx.recv().await.unwrap() {
                StreamEvent::Message(q) => assert_eq!(q.id, "AAPL"),
                other => panic!("unexpected event: {other:?}"),
            }
            assert!(matches!(rx.recv().await.unwrap(), StreamEvent::Disconnected));
        }
    }

    #[tokio::test]
    async fn stream_skips_lag_gap() {
        let publisher = EventPublisher::new(2);
        let stream = publisher.stream();

        for id in ["A", "B", "C", "D"] {
            publisher.publish(quote(id));
        }
        drop(publisher);

        let ids: Vec<String> = stream
            .filter_map(|event| match event {
                StreamEvent::Message(q) => Some(q.id),
                _ => None,
            })
            .collect()
            .await;
        assert_eq!(ids, ["C", "D"]);
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl StreamObserver for Recorder {
        fn on_connected(&mut self) {
            self.0.lock().unwrap().push("connected".to_string());
        }

        fn on_disconnected(&mut self) {
            self.0.lock().unwrap().push("disconnected".to_string());
        }

        fn on_message(&mut self, quote: &QuoteRecord) {
            self.0.lock().unwrap().push(quote.id.clone());
        }
    }

    #[tokio::test]
    async fn observer_receives_hooks_until_closed() {
        let publisher = EventPublisher::new(8);
        let recorder = Recorder::default();
        let handle = publisher.register(recorder.clone());

        publisher.publish(StreamEvent::Connected);
        publisher.publish(quote("MSFT"));
        publisher.publish(StreamEvent::Error(Arc::new(StreamError::EmptySubscription)));
        publisher.publish(StreamEvent::Disconnected);
        drop(publisher);

        handle.await.unwrap();
        assert_eq!(
            *recorder.0.lock().unwrap(),
            ["connected", "MSFT", "disconnected"]
        );
    }
}
