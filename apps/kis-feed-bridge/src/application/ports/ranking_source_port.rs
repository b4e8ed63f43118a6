//! Ranking Source Port (Driven Port)
//!
//! Interface to the volume-ranking REST endpoint.

use async_trait::async_trait;

use crate::domain::market_data::{AccessToken, RankingEntry};

/// Ranking fetch error.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RankingError {
    /// Network failure or timeout.
    #[error("ranking endpoint unreachable: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// The access token was refused.
    #[error("ranking request unauthorized")]
    Unauthorized,

    /// Non-success HTTP status other than 401.
    #[error("ranking request failed with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The provider reported a business error (`rt_cd` other than `"0"`).
    #[error("ranking provider error {code}: {message}")]
    Provider {
        /// Provider message code.
        code: String,
        /// Provider message.
        message: String,
    },

    /// The body could not be decoded.
    #[error("invalid ranking response: {message}")]
    InvalidResponse {
        /// Error details.
        message: String,
    },
}

/// Port for fetching the current volume ranking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RankingSource: Send + Sync {
    /// Fetch the ranking using `token` for authorization.
    async fn fetch_ranking(&self, token: &AccessToken) -> Result<Vec<RankingEntry>, RankingError>;
}
