//! KIS OAuth Client
//!
//! Obtains the two upstream credentials over REST.
//!
//! # Endpoints
//!
//! 1. `POST /oauth2/tokenP` with `{"grant_type","appkey","appsecret"}`
//!    returns `{"access_token","token_type","expires_in"}`
//! 2. `POST /oauth2/Approval` with `{"grant_type","appkey","secretkey"}`
//!    returns `{"approval_key"}`
//!
//! Each call is a single attempt. Retrying is left to the caller: the
//! credential cache retries on the next request and the streaming client
//! retries on its next reconnect.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::messages::{ApprovalRequest, ApprovalResponse, TokenRequest, TokenResponse};
use crate::application::ports::{ApprovalKeyProvider, AuthError, TokenIssuer};
use crate::domain::market_data::ApprovalKey;
use crate::infrastructure::config::Credentials;
use crate::infrastructure::metrics::{self, Outcome};

/// Access token endpoint path.
pub const TOKEN_PATH: &str = "/oauth2/tokenP";

/// Approval key endpoint path.
pub const APPROVAL_PATH: &str = "/oauth2/Approval";

/// HTTP client for the provider's OAuth endpoints.
#[derive(Debug, Clone)]
pub struct KisAuthClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl KisAuthClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Transport` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, AuthError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| AuthError::Transport {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| AuthError::InvalidResponse {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl TokenIssuer for KisAuthClient {
    async fn issue_access_token(&self) -> Result<String, AuthError> {
        let request = TokenRequest::new(
            self.credentials.app_key(),
            self.credentials.app_secret(),
        );
        let response: TokenResponse = self.post_json(TOKEN_PATH, &request).await?;

        if response.access_token.is_empty() {
            return Err(AuthError::InvalidResponse {
                message: "access_token missing or empty".to_string(),
            });
        }

        tracing::debug!(
            token_type = response.token_type.as_deref().unwrap_or("unknown"),
            expires_in = ?response.expires_in,
            "Access token issued"
        );
        Ok(response.access_token)
    }
}

#[async_trait]
impl ApprovalKeyProvider for KisAuthClient {
    async fn fetch_approval_key(&self) -> Result<ApprovalKey, AuthError> {
        let request = ApprovalRequest::new(
            self.credentials.app_key(),
            self.credentials.app_secret(),
        );

        let result = self
            .post_json::<_, ApprovalResponse>(APPROVAL_PATH, &request)
            .await
            .and_then(|response| {
                if response.approval_key.is_empty() {
                    Err(AuthError::InvalidResponse {
                        message: "approval_key missing or empty".to_string(),
                    })
                } else {
                    Ok(ApprovalKey::new(response.approval_key))
                }
            });

        match &result {
            Ok(_) => metrics::record_approval_key(Outcome::Success),
            Err(e) => {
                metrics::record_approval_key(Outcome::Failure);
                tracing::warn!(error = %e, "Approval key request failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("key".to_string(), "secret".to_string())
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client =
            KisAuthClient::new("https://example.com/", credentials(), Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.base_url, "https://example.com");
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let client =
            KisAuthClient::new("https://example.com", credentials(), Duration::from_secs(1))
                .unwrap();
        assert!(!format!("{client:?}").contains("\"secret\""));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) on localhost is not expected to accept connections
        let client = KisAuthClient::new(
            "http://127.0.0.1:9",
            credentials(),
            Duration::from_millis(500),
        )
        .unwrap();

        let err = client.issue_access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::Transport { .. }));
    }
}
