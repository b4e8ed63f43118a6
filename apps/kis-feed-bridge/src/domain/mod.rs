//! Domain Layer - Core feed types and business rules.
//!
//! This layer contains the value objects flowing through the bridge
//! with no I/O. All types here are pure Rust with serialization support.

/// Tick records, ranking entries, credentials and publish messages.
pub mod market_data;

/// Connection state machine for the streaming session.
pub mod streaming;

/// Subscription targets and the replayable subscription list.
pub mod subscription;
