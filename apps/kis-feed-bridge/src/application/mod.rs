//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (bus, credential and ranking endpoints).
pub mod ports;

/// Application services for credential caching and ranking polls.
pub mod services;
