//! Application Ports (Driven)
//!
//! Interfaces the services depend on. Infrastructure adapters implement
//! them; tests substitute mocks.
//!
//! - `PublishSink`: hands serialized messages to the bus
//! - `TokenIssuer` / `ApprovalKeyProvider`: the provider's OAuth endpoints
//! - `RankingSource`: the volume-ranking REST endpoint
//! - `Clock`: wall-clock time, swappable for expiry tests

mod clock_port;
mod credential_port;
mod publish_sink_port;
mod ranking_source_port;

pub use clock_port::{Clock, ManualClock, SystemClock};
pub use credential_port::{ApprovalKeyProvider, AuthError, TokenIssuer};
pub use publish_sink_port::{PublishError, PublishSink};
pub use ranking_source_port::{RankingError, RankingSource};

#[cfg(test)]
pub use credential_port::{MockApprovalKeyProvider, MockTokenIssuer};
#[cfg(test)]
pub use publish_sink_port::MockPublishSink;
#[cfg(test)]
pub use ranking_source_port::MockRankingSource;
