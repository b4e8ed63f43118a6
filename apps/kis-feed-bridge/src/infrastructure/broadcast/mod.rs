//! Publish Sink Adapters
//!
//! Implementations of [`PublishSink`] that hand messages to a bus.
//!
//! # Architecture
//!
//! - `BroadcastBus`: in-process fan-out over a tokio broadcast channel.
//!   Consumers subscribe to every topic or to a single one.
//! - `QueuedSink`: puts a bounded queue and one worker in front of a sink
//!   that must not be called concurrently. Publishing never waits.
//! - `LineSink`: writes `topic<TAB>body` lines, e.g. to stdout for a
//!   console producer to pick up.
//!
//! Delivery is at-most-once everywhere: a message published while nobody
//! listens, or while the queue is full, is gone.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::application::ports::{PublishError, PublishSink};
use crate::domain::market_data::PublishMessage;

/// Default capacity of the broadcast channel.
pub const DEFAULT_BUS_CAPACITY: usize = 10_000;

// =============================================================================
// Broadcast Bus
// =============================================================================

/// In-process message bus.
///
/// # Example
///
/// ```rust
/// use kis_feed_bridge::infrastructure::broadcast::BroadcastBus;
///
/// let bus = BroadcastBus::with_defaults();
///
/// // Receive only ranking messages
/// let mut rx = bus.subscribe_topic("volume-rank-topic");
/// assert_eq!(bus.receiver_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<PublishMessage>,
}

impl BroadcastBus {
    /// Create a bus holding up to `capacity` messages per lagging receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Create a bus with the default capacity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }

    /// Receiver for every topic.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PublishMessage> {
        self.tx.subscribe()
    }

    /// Receiver for a single topic.
    #[must_use]
    pub fn subscribe_topic(&self, topic: impl Into<String>) -> TopicReceiver {
        TopicReceiver {
            topic: topic.into(),
            rx: self.tx.subscribe(),
        }
    }

    /// Number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl PublishSink for BroadcastBus {
    async fn publish(&self, message: PublishMessage) -> Result<(), PublishError> {
        // No receivers is not a failure
        if self.tx.send(message).is_err() {
            tracing::trace!("Published with no active receivers");
        }
        Ok(())
    }
}

/// Receiver filtered to one topic.
#[derive(Debug)]
pub struct TopicReceiver {
    topic: String,
    rx: broadcast::Receiver<PublishMessage>,
}

impl TopicReceiver {
    /// Topic this receiver is bound to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message on the topic.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged` if messages were overwritten before they
    /// were read, and `RecvError::Closed` once the bus is gone.
    pub async fn recv(&mut self) -> Result<PublishMessage, broadcast::error::RecvError> {
        loop {
            let message = self.rx.recv().await?;
            if message.topic == self.topic {
                return Ok(message);
            }
        }
    }
}

// =============================================================================
// Queued Sink
// =============================================================================

/// Bounded hand-off queue in front of a non-reentrant sink.
///
/// A single worker task drains the queue, so the inner sink sees one call
/// at a time in enqueue order. The worker exits once every `QueuedSink`
/// clone is dropped and the queue is empty.
#[derive(Debug, Clone)]
pub struct QueuedSink {
    tx: mpsc::Sender<PublishMessage>,
}

impl QueuedSink {
    /// Start the worker and return the sink with the worker's handle.
    #[must_use]
    pub fn spawn(inner: Arc<dyn PublishSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<PublishMessage>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let topic = message.topic.clone();
                if let Err(e) = inner.publish(message).await {
                    tracing::warn!(error = %e, topic = %topic, "Queued publish failed");
                }
            }
            tracing::debug!("Publish queue drained");
        });

        (Self { tx }, handle)
    }

    /// Free slots left in the queue.
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

#[async_trait]
impl PublishSink for QueuedSink {
    async fn publish(&self, message: PublishMessage) -> Result<(), PublishError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(message) => PublishError::QueueFull {
                topic: message.topic,
            },
            mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
        })
    }
}

// =============================================================================
// Line Sink
// =============================================================================

/// Sink writing one `topic<TAB>body` line per message.
#[derive(Debug)]
pub struct LineSink<W> {
    writer: Mutex<W>,
}

/// Line sink on the process's standard output.
pub type StdoutSink = LineSink<std::io::Stdout>;

impl<W: Write + Send> LineSink<W> {
    /// Wrap a writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl StdoutSink {
    /// Sink on standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> PublishSink for LineSink<W> {
    async fn publish(&self, message: PublishMessage) -> Result<(), PublishError> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{}\t{}", message.topic, message.body)
            .and_then(|()| writer.flush())
            .map_err(|e| PublishError::Failed {
                topic: message.topic,
                message: e.to_string(),
            })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockPublishSink;

    fn message(topic: &str, body: &str) -> PublishMessage {
        PublishMessage::new(topic, body)
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = BroadcastBus::with_defaults();
        assert_eq!(bus.receiver_count(), 0);

        {
            let _rx1 = bus.subscribe();
            let _rx2 = bus.subscribe_topic("a");
            assert_eq!(bus.receiver_count(), 2);
        }

        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn publish_without_receivers_is_ok() {
        let bus = BroadcastBus::with_defaults();
        assert!(bus.publish(message("t", "{}")).await.is_ok());
    }

    #[tokio::test]
    async fn all_receivers_get_same_message() {
        let bus = BroadcastBus::with_defaults();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(message("realtime-data", "{\"a\":1}")).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().body, "{\"a\":1}");
        assert_eq!(rx2.recv().await.unwrap().body, "{\"a\":1}");
    }

    #[tokio::test]
    async fn topic_receiver_skips_other_topics() {
        let bus = BroadcastBus::with_defaults();
        let mut ranking = bus.subscribe_topic("volume-rank-topic");

        bus.publish(message("realtime-data", "tick")).await.unwrap();
        bus.publish(message("volume-rank-topic", "rank")).await.unwrap();

        let received = ranking.recv().await.unwrap();
        assert_eq!(ranking.topic(), "volume-rank-topic");
        assert_eq!(received.body, "rank");
    }

    #[tokio::test]
    async fn queued_sink_preserves_order() {
        let bus = BroadcastBus::with_defaults();
        let mut rx = bus.subscribe();
        let (sink, worker) = QueuedSink::spawn(Arc::new(bus.clone()), 16);

        for i in 0..5 {
            sink.publish(message("t", &i.to_string())).await.unwrap();
        }
        drop(sink);
        worker.await.unwrap();

        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap().body, i.to_string());
        }
    }

    #[tokio::test]
    async fn queued_sink_full_returns_queue_full() {
        let mut inner = MockPublishSink::new();
        inner.expect_publish().returning(|_| Ok(()));
        let (sink, _worker) = QueuedSink::spawn(Arc::new(inner), 1);

        let mut full = None;
        for i in 0..10 {
            if let Err(e) = sink.publish(message("ticks", &i.to_string())).await {
                full = Some(e);
                break;
            }
        }

        assert_eq!(
            full,
            Some(PublishError::QueueFull {
                topic: "ticks".to_string()
            })
        );
    }

    #[tokio::test]
    async fn queued_sink_logs_inner_failure_and_continues() {
        let mut inner = MockPublishSink::new();
        let mut seq = mockall::Sequence::new();
        inner
            .expect_publish()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(PublishError::Closed));
        inner
            .expect_publish()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let (sink, worker) = QueuedSink::spawn(Arc::new(inner), 4);
        sink.publish(message("t", "1")).await.unwrap();
        sink.publish(message("t", "2")).await.unwrap();
        drop(sink);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn line_sink_writes_tab_separated_lines() {
        let sink = LineSink::new(Vec::new());
        sink.publish(message("realtime-data", "{\"stockId\":\"005930\"}"))
            .await
            .unwrap();
        sink.publish(message("volume-rank-topic", "{}")).await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            output,
            "realtime-data\t{\"stockId\":\"005930\"}\nvolume-rank-topic\t{}\n"
        );
    }
}
