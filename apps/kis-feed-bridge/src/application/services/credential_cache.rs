//! Credential Cache Service
//!
//! Caches the REST access token and renews it shortly before expiry.
//!
//! # Single flight
//!
//! The check, renewal and store happen under one async mutex, so any number
//! of concurrent callers on a stale cache cause exactly one issuer call.
//! Callers queued behind a renewal re-check the cache when they get the
//! lock: after a success they see the fresh token, after a failure they get
//! a clone of the same error. Failures are not cached; the next call that
//! did not wait on the failed renewal tries again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::application::ports::{AuthError, Clock, TokenIssuer};
use crate::domain::market_data::AccessToken;
use crate::infrastructure::metrics::{self, Outcome};

/// Configuration for the credential cache.
#[derive(Debug, Clone, Copy)]
pub struct CredentialCacheConfig {
    /// How long an issued token is treated as valid.
    pub token_validity: chrono::Duration,
    /// Renew this long before the computed expiry.
    pub renewal_margin: chrono::Duration,
}

impl Default for CredentialCacheConfig {
    fn default() -> Self {
        Self {
            token_validity: chrono::Duration::seconds(86_400),
            renewal_margin: chrono::Duration::seconds(300),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    token: Option<AccessToken>,
    last_error: Option<AuthError>,
}

/// Single-flight access token cache.
pub struct CredentialCache {
    issuer: Arc<dyn TokenIssuer>,
    clock: Arc<dyn Clock>,
    config: CredentialCacheConfig,
    state: Mutex<CacheState>,
    /// Bumped after every completed renewal attempt.
    generation: AtomicU64,
}

impl CredentialCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(
        issuer: Arc<dyn TokenIssuer>,
        clock: Arc<dyn Clock>,
        config: CredentialCacheConfig,
    ) -> Self {
        Self {
            issuer,
            clock,
            config,
            state: Mutex::new(CacheState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Return a token valid for at least the renewal margin, renewing it if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns the issuer's error if renewal fails. Every caller that was
    /// waiting on that renewal receives the same error.
    pub async fn get_token(&self) -> Result<AccessToken, AuthError> {
        let observed = self.generation.load(Ordering::Acquire);
        let mut state = self.state.lock().await;

        let now = self.clock.now();
        if let Some(token) = state
            .token
            .as_ref()
            .filter(|t| t.is_fresh(now, self.config.renewal_margin))
        {
            return Ok(token.clone());
        }

        // A renewal completed while this caller was queued and it failed.
        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(err) = &state.last_error {
                return Err(err.clone());
            }
        }

        tracing::debug!("Renewing access token");
        let result = self.issuer.issue_access_token().await;
        self.generation.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(value) => {
                let now = self.clock.now();
                let expires_at = now
                    .checked_add_signed(self.config.token_validity)
                    .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
                let token = AccessToken::new(value, expires_at);
                state.token = Some(token.clone());
                state.last_error = None;
                metrics::record_token_renewal(Outcome::Success);
                tracing::info!(%expires_at, "Access token renewed");
                Ok(token)
            }
            Err(err) => {
                state.token = None;
                state.last_error = Some(err.clone());
                metrics::record_token_renewal(Outcome::Failure);
                tracing::warn!(error = %err, "Access token renewal failed");
                Err(err)
            }
        }
    }

    /// Drop the cached token so the next `get_token` renews.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if state.token.take().is_some() {
            tracing::info!("Access token invalidated");
        }
    }

    /// Expiry of the cached token, if any.
    pub async fn cached_expiry(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.state.lock().await.token.as_ref().map(AccessToken::expires_at)
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("config", &self.config)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
