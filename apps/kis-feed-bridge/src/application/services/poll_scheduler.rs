//! Ranking Poll Scheduler
//!
//! Fetches the volume ranking on a fixed period and publishes every entry
//! to the ranking topic. A failed cycle is logged and counted; the next tick
//! runs regardless. The loop ends only on cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{AuthError, PublishSink, RankingError, RankingSource};
use crate::application::services::CredentialCache;
use crate::domain::market_data::PublishMessage;
use crate::infrastructure::metrics::{self, MessageKind, Outcome};

/// Configuration for the poll scheduler.
#[derive(Debug, Clone)]
pub struct PollSchedulerConfig {
    /// Time between cycle starts.
    pub interval: Duration,
    /// Bus topic for ranking entries.
    pub topic: String,
}

impl Default for PollSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            topic: "volume-rank-topic".to_string(),
        }
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Ranking fetched; entries handed to the sink.
    Completed {
        /// Entries returned by the provider.
        entries: usize,
        /// Entries the sink accepted.
        published: usize,
    },
    /// No access token could be obtained; nothing was fetched.
    SkippedNoToken(AuthError),
    /// The ranking request failed.
    FetchFailed(RankingError),
}

/// Periodic volume-ranking poller.
pub struct PollScheduler {
    credentials: Arc<CredentialCache>,
    source: Arc<dyn RankingSource>,
    sink: Arc<dyn PublishSink>,
    config: PollSchedulerConfig,
}

impl PollScheduler {
    /// Create a new scheduler.
    #[must_use]
    pub fn new(
        credentials: Arc<CredentialCache>,
        source: Arc<dyn RankingSource>,
        sink: Arc<dyn PublishSink>,
        config: PollSchedulerConfig,
    ) -> Self {
        Self {
            credentials,
            source,
            sink,
            config,
        }
    }

    /// Run cycles every `interval` until `shutdown` is cancelled.
    ///
    /// The first cycle runs immediately. A cycle that overruns delays the
    /// next one rather than bunching them up.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            interval_ms = self.config.interval.as_millis(),
            topic = %self.config.topic,
            "Starting ranking poller"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once().await;
                }
                () = shutdown.cancelled() => {
                    tracing::info!("Ranking poller shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single cycle: token, fetch, publish.
    pub async fn poll_once(&self) -> PollOutcome {
        let started = Instant::now();

        let token = match self.credentials.get_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping ranking poll, no access token");
                metrics::record_ranking_poll(Outcome::Skipped, started.elapsed());
                return PollOutcome::SkippedNoToken(e);
            }
        };

        let entries = match self.source.fetch_ranking(&token).await {
            Ok(entries) => entries,
            Err(e) => {
                if e == RankingError::Unauthorized {
                    self.credentials.invalidate().await;
                }
                tracing::warn!(error = %e, "Ranking fetch failed");
                metrics::record_ranking_poll(Outcome::Failure, started.elapsed());
                return PollOutcome::FetchFailed(e);
            }
        };

        let mut published = 0;
        for entry in &entries {
            let message = match PublishMessage::from_ranking(&self.config.topic, entry) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(
                        code = %entry.instrument_code,
                        error = %e,
                        "Failed to serialize ranking entry"
                    );
                    metrics::record_publish_failure(MessageKind::Ranking);
                    continue;
                }
            };

            match self.sink.publish(message).await {
                Ok(()) => {
                    published += 1;
                    metrics::record_published(MessageKind::Ranking);
                }
                Err(e) => {
                    tracing::warn!(
                        code = %entry.instrument_code,
                        rank = entry.rank,
                        error = %e,
                        "Failed to publish ranking entry"
                    );
                    metrics::record_publish_failure(MessageKind::Ranking);
                }
            }
        }

        tracing::debug!(
            entries = entries.len(),
            published,
            "Ranking poll completed"
        );
        metrics::record_ranking_poll(Outcome::Success, started.elapsed());

        PollOutcome::Completed {
            entries: entries.len(),
            published,
        }
    }
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
