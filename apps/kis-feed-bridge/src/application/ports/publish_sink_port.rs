//! Publish Sink Port (Driven Port)
//!
//! Interface to the message bus.

use async_trait::async_trait;

use crate::domain::market_data::PublishMessage;

/// Publishing error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PublishError {
    /// The hand-off queue is full; the message was dropped.
    #[error("publish queue full, dropped message for topic {topic}")]
    QueueFull {
        /// Destination topic of the dropped message.
        topic: String,
    },

    /// The sink has shut down.
    #[error("publish sink closed")]
    Closed,

    /// The bus refused or failed to take the message.
    #[error("publish to {topic} failed: {message}")]
    Failed {
        /// Destination topic.
        topic: String,
        /// Error details.
        message: String,
    },
}

/// Port for handing messages to the bus.
///
/// Delivery is at-most-once: an `Ok` means the sink accepted the message,
/// nothing more.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Publish one message.
    async fn publish(&self, message: PublishMessage) -> Result<(), PublishError>;
}
