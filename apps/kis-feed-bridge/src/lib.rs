#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! KIS Feed Bridge - Korean Market Data to Message Bus
//!
//! Maintains one streaming connection to the Korea Investment & Securities
//! real-time price feed, polls the REST volume ranking on a fixed period,
//! and publishes both as JSON messages to a bus. The two short-lived
//! upstream credentials (approval key, access token) are obtained and
//! renewed on demand.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Feed data types and rules, no I/O
//!   - `market_data`: Ticks, ranking entries, credentials, publish messages
//!   - `streaming`: Connection state machine
//!   - `subscription`: Instrument codes and the replayable subscription list
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Token issuer, approval key provider, ranking source, publish sink, clock
//!   - `services`: Single-flight credential cache, ranking poll scheduler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `kis`: REST auth and ranking clients, streaming client, frame codec
//!   - `broadcast`: Publish sink adapters
//!   - `config`: Environment and secrets-file configuration
//!   - `metrics`, `telemetry`: Prometheus metrics, tracing
//!
//! # Data Flow
//!
//! ```text
//! KIS WS (H0STCNT0) ──► FrameDecoder ──► FrameDispatcher ──┐
//!                                                          ├──► PublishSink ──► bus
//! KIS REST volume-rank ◄── PollScheduler (10s) ────────────┘
//!          ▲
//!          └── CredentialCache (single-flight token renewal)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core feed types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market_data::{AccessToken, ApprovalKey, PublishMessage, RankingEntry, TickRecord};
pub use domain::streaming::{ConnectionEvent, ConnectionState};
pub use domain::subscription::{SubscriptionError, SubscriptionList, SubscriptionTarget};

// Ports and services
pub use application::ports::{
    ApprovalKeyProvider, AuthError, Clock, PublishError, PublishSink, RankingError, RankingSource,
    SystemClock, TokenIssuer,
};
pub use application::services::{
    CredentialCache, CredentialCacheConfig, PollOutcome, PollScheduler, PollSchedulerConfig,
};

// Infrastructure config
pub use infrastructure::config::{BridgeConfig, ConfigError, Credentials, Environment};

// KIS adapters
pub use infrastructure::kis::{
    FrameDecoder, FrameDispatcher, KisAuthClient, KisRankingClient, StreamClientConfig,
    StreamClientError, StreamingFeedClient,
};

// Publish sinks
pub use infrastructure::broadcast::{BroadcastBus, QueuedSink, StdoutSink};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
