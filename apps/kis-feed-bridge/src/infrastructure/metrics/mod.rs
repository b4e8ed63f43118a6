//! Prometheus Metrics Module
//!
//! Exposes bridge metrics in Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Streaming frames received, decode failures
//! - **Publishing**: Messages published and publish failures by topic kind
//! - **Connection**: Session state gauge and reconnect attempts
//! - **Credentials**: Token renewals and approval key fetches by outcome
//! - **Polling**: Ranking poll cycles by outcome and their duration
//!
//! # Integration
//!
//! Metrics are served at `/metrics` on `KIS_BRIDGE_METRICS_PORT`.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::domain::streaming::ConnectionState;

// =============================================================================
// Exporter
// =============================================================================

/// Poll duration buckets, 10ms to 10s.
const POLL_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Metrics exporter error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Invalid exporter configuration.
    #[error("invalid metrics configuration: {0}")]
    Configuration(String),

    /// The recorder or listener could not be installed.
    #[error("failed to install metrics exporter: {0}")]
    Installation(String),
}

/// Install the Prometheus recorder and serve `/metrics` on `port`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the exporter fails to start (e.g., port already in use).
pub fn init_metrics(port: u16) -> Result<(), MetricsError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(POLL_BUCKETS)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    register_metrics();
    tracing::info!(%addr, "Prometheus metrics exporter started");
    Ok(())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Streaming
    describe_counter!(
        "kis_bridge_frames_received_total",
        "Total data frames received from the streaming feed"
    );
    describe_counter!(
        "kis_bridge_decode_errors_total",
        "Total streaming frames that failed to decode, by reason"
    );
    describe_gauge!(
        "kis_bridge_connection_state",
        "Streaming session state (0 disconnected .. 5 closed)"
    );
    describe_counter!(
        "kis_bridge_reconnects_total",
        "Total streaming reconnect attempts"
    );

    // Publishing
    describe_counter!(
        "kis_bridge_messages_published_total",
        "Total messages accepted by the publish sink, by kind"
    );
    describe_counter!(
        "kis_bridge_publish_failures_total",
        "Total messages the publish sink refused, by kind"
    );

    // Credentials
    describe_counter!(
        "kis_bridge_token_renewals_total",
        "Access token renewals by outcome"
    );
    describe_counter!(
        "kis_bridge_approval_keys_total",
        "Approval key fetches by outcome"
    );

    // Polling
    describe_counter!(
        "kis_bridge_ranking_polls_total",
        "Ranking poll cycles by outcome"
    );
    describe_histogram!(
        "kis_bridge_ranking_poll_seconds",
        "Duration of one ranking poll cycle"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Kind of message published to the bus.
#[derive(Debug, Clone, Copy)]
pub enum MessageKind {
    /// Real-time tick.
    Tick,
    /// Volume-ranking entry.
    Ranking,
}

impl MessageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Ranking => "ranking",
        }
    }
}

/// Outcome label for credential and poll counters.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Completed.
    Success,
    /// Failed.
    Failure,
    /// Skipped because a prerequisite failed.
    Skipped,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }
}

/// Record data frames received from the feed.
pub fn record_frame_received() {
    counter!("kis_bridge_frames_received_total").increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error(reason: &'static str) {
    counter!("kis_bridge_decode_errors_total", "reason" => reason).increment(1);
}

/// Record a message accepted by the sink.
pub fn record_published(kind: MessageKind) {
    counter!(
        "kis_bridge_messages_published_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a message the sink refused.
pub fn record_publish_failure(kind: MessageKind) {
    counter!(
        "kis_bridge_publish_failures_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("kis_bridge_connection_state").set(state.as_gauge());
}

/// Record a reconnect attempt.
pub fn record_reconnect() {
    counter!("kis_bridge_reconnects_total").increment(1);
}

/// Record an access token renewal.
pub fn record_token_renewal(outcome: Outcome) {
    counter!(
        "kis_bridge_token_renewals_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record an approval key fetch.
pub fn record_approval_key(outcome: Outcome) {
    counter!(
        "kis_bridge_approval_keys_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a ranking poll cycle.
pub fn record_ranking_poll(outcome: Outcome, duration: Duration) {
    counter!(
        "kis_bridge_ranking_polls_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("kis_bridge_ranking_poll_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_as_str() {
        assert_eq!(MessageKind::Tick.as_str(), "tick");
        assert_eq!(MessageKind::Ranking.as_str(), "ranking");
    }

    #[test]
    fn outcome_as_str() {
        assert_eq!(Outcome::Success.as_str(), "success");
        assert_eq!(Outcome::Failure.as_str(), "failure");
        assert_eq!(Outcome::Skipped.as_str(), "skipped");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received();
        record_decode_error("invalid_record_count");
        record_published(MessageKind::Tick);
        record_publish_failure(MessageKind::Ranking);
        set_connection_state(ConnectionState::Subscribed);
        record_reconnect();
        record_token_renewal(Outcome::Success);
        record_approval_key(Outcome::Failure);
        record_ranking_poll(Outcome::Skipped, Duration::from_millis(5));
    }
}
