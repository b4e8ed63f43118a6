//! Application Services
//!
//! Services that coordinate ports and run for the life of the process.
//!
//! - `CredentialCache`: single-flight access token cache
//! - `PollScheduler`: periodic volume-ranking poll and publish

mod credential_cache;
mod poll_scheduler;

pub use credential_cache::{CredentialCache, CredentialCacheConfig};
pub use poll_scheduler::{PollOutcome, PollScheduler, PollSchedulerConfig};
