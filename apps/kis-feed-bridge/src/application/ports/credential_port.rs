//! Credential Ports (Driven Ports)
//!
//! Interfaces to the provider's two credential endpoints: the REST access
//! token and the per-connection streaming approval key.

use async_trait::async_trait;

use crate::domain::market_data::ApprovalKey;

/// Credential acquisition error.
///
/// `Clone` so a single failed renewal can be reported to every caller that
/// was waiting on it.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    /// Network failure or timeout reaching the endpoint.
    #[error("credential endpoint unreachable: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// Endpoint answered with a non-success status.
    #[error("credential request rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// Endpoint answered 2xx but the body was unusable.
    #[error("invalid credential response: {message}")]
    InvalidResponse {
        /// Error details.
        message: String,
    },
}

/// Issues REST access tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Request a new access token. Returns the raw bearer value.
    async fn issue_access_token(&self) -> Result<String, AuthError>;
}

/// Issues streaming approval keys.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApprovalKeyProvider: Send + Sync {
    /// Request a fresh approval key for one streaming connection.
    async fn fetch_approval_key(&self) -> Result<ApprovalKey, AuthError>;
}
