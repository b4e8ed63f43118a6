//! Bridge Configuration Settings
//!
//! Configuration types for the bridge, loaded once at startup from
//! environment variables and optionally overlaid with a vault-style secrets
//! map (`kis.api.appKey`, `kis.api.appSecret`, `kis.api.baseUrl`).

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::application::services::{CredentialCacheConfig, PollSchedulerConfig};
use crate::domain::subscription::{SubscriptionError, SubscriptionTarget};

/// Secrets map key holding the application key.
pub const SECRET_APP_KEY: &str = "kis.api.appKey";
/// Secrets map key holding the application secret.
pub const SECRET_APP_SECRET: &str = "kis.api.appSecret";
/// Secrets map key holding the REST base URL.
pub const SECRET_BASE_URL: &str = "kis.api.baseUrl";

/// Provider environment (real vs mock trading).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Production endpoints.
    #[default]
    Real,
    /// Mock-trading endpoints.
    Virtual,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "virtual" | "vts" | "paper" => Self::Virtual,
            _ => Self::Real,
        }
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Virtual => "virtual",
        }
    }

    /// Default REST base URL.
    #[must_use]
    pub const fn default_base_url(&self) -> &'static str {
        match self {
            Self::Real => "https://openapi.koreainvestment.com:9443",
            Self::Virtual => "https://openapivts.koreainvestment.com:29443",
        }
    }

    /// Default streaming URL.
    #[must_use]
    pub const fn default_stream_url(&self) -> &'static str {
        match self {
            Self::Real => "ws://ops.koreainvestment.com:21000/tryitout/H0STCNT0",
            Self::Virtual => "ws://ops.koreainvestment.com:31000/tryitout/H0STCNT0",
        }
    }
}

/// KIS application credentials.
#[derive(Clone)]
pub struct Credentials {
    app_key: String,
    app_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(app_key: String, app_secret: String) -> Self {
        Self {
            app_key,
            app_secret,
        }
    }

    /// Get the application key.
    #[must_use]
    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Get the application secret.
    #[must_use]
    pub fn app_secret(&self) -> &str {
        &self.app_secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &"[REDACTED]")
            .field("app_secret", &"[REDACTED]")
            .finish()
    }
}

/// Upstream endpoint settings.
#[derive(Debug, Clone)]
pub struct EndpointSettings {
    /// REST base URL, without trailing slash.
    pub base_url: String,
    /// Streaming socket URL.
    pub stream_url: String,
    /// Timeout for each REST call.
    pub http_timeout: Duration,
}

/// Streaming session settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Instruments subscribed at startup, in order.
    pub subscriptions: Vec<SubscriptionTarget>,
    /// Bus topic for ticks.
    pub tick_topic: String,
    /// Capacity of the inbound frame channel.
    pub frame_channel_capacity: usize,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            subscriptions: Vec::new(),
            tick_topic: "realtime-data".to_string(),
            frame_channel_capacity: 1_024,
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
        }
    }
}

/// Longest accepted token validity (one week).
pub const MAX_TOKEN_VALIDITY: Duration = Duration::from_secs(7 * 86_400);

/// Access token settings.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// How long an issued token is treated as valid.
    pub validity: Duration,
    /// Renew this long before expiry.
    pub renewal_margin: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            validity: Duration::from_secs(86_400),
            renewal_margin: Duration::from_secs(300),
        }
    }
}

/// Ranking poller settings.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Poll period; `None` disables the poller.
    pub interval: Option<Duration>,
    /// Bus topic for ranking entries.
    pub ranking_topic: String,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Some(Duration::from_secs(10)),
            ranking_topic: "volume-rank-topic".to_string(),
        }
    }
}

/// Publish sink settings.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    /// Capacity of the hand-off queue in front of the bus.
    pub queue_capacity: usize,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { metrics_port: 9090 }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Provider environment.
    pub environment: Environment,
    /// Application credentials.
    pub credentials: Credentials,
    /// Upstream endpoints.
    pub endpoints: EndpointSettings,
    /// Streaming session settings.
    pub stream: StreamSettings,
    /// Access token settings.
    pub token: TokenSettings,
    /// Ranking poller settings.
    pub poll: PollSettings,
    /// Publish sink settings.
    pub publish: PublishSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl BridgeConfig {
    /// Create configuration from environment variables.
    ///
    /// If `KIS_SECRETS_FILE` names a JSON object file, its
    /// `kis.api.*` entries take precedence over the matching variables.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or empty, a URL or
    /// subscription code is malformed, a reconnect or token timing is out
    /// of range, or the secrets file is unreadable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`BridgeConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secrets = match lookup("KIS_SECRETS_FILE").filter(|p| !p.trim().is_empty()) {
            Some(path) => load_secrets_file(Path::new(path.trim()))?,
            None => HashMap::new(),
        };

        let app_key = required(&lookup, &secrets, SECRET_APP_KEY, "KIS_APP_KEY")?;
        let app_secret = required(&lookup, &secrets, SECRET_APP_SECRET, "KIS_APP_SECRET")?;

        let environment = lookup("KIS_ENV")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let base_url = secrets
            .get(SECRET_BASE_URL)
            .cloned()
            .or_else(|| lookup("KIS_BASE_URL"))
            .unwrap_or_else(|| environment.default_base_url().to_string());
        let base_url = validate_url("KIS_BASE_URL", base_url.trim(), &["http", "https"])?;

        let stream_url = lookup("KIS_STREAM_URL")
            .unwrap_or_else(|| environment.default_stream_url().to_string());
        let stream_url = validate_url("KIS_STREAM_URL", stream_url.trim(), &["ws", "wss"])?;

        let endpoints = EndpointSettings {
            base_url: base_url.trim_end_matches('/').to_string(),
            stream_url,
            http_timeout: parse_env_duration_secs(
                &lookup,
                "KIS_HTTP_TIMEOUT_SECS",
                Duration::from_secs(10),
            ),
        };

        let defaults = StreamSettings::default();
        let subscriptions = SubscriptionTarget::parse_list(
            &lookup("KIS_SUBSCRIPTIONS").unwrap_or_else(|| "005930,000660".to_string()),
        )?;
        let stream = StreamSettings {
            subscriptions,
            tick_topic: lookup("KIS_TICK_TOPIC").unwrap_or(defaults.tick_topic),
            frame_channel_capacity: parse_env(
                &lookup,
                "KIS_FRAME_CHANNEL_CAPACITY",
                defaults.frame_channel_capacity,
            )
            .max(1),
            reconnect_delay_initial: parse_env_duration_millis(
                &lookup,
                "KIS_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                &lookup,
                "KIS_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env(
                &lookup,
                "KIS_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
        };

        let token = TokenSettings {
            validity: parse_env_duration_secs(
                &lookup,
                "KIS_TOKEN_VALIDITY_SECS",
                TokenSettings::default().validity,
            ),
            renewal_margin: parse_env_duration_secs(
                &lookup,
                "KIS_TOKEN_RENEWAL_MARGIN_SECS",
                TokenSettings::default().renewal_margin,
            ),
        };

        validate_reconnect(&stream)?;
        validate_token(&token)?;

        let poll_defaults = PollSettings::default();
        let poll_secs: u64 = parse_env(&lookup, "KIS_POLL_INTERVAL_SECS", 10);
        let poll = PollSettings {
            interval: (poll_secs > 0).then(|| Duration::from_secs(poll_secs)),
            ranking_topic: lookup("KIS_RANKING_TOPIC").unwrap_or(poll_defaults.ranking_topic),
        };

        let publish = PublishSettings {
            queue_capacity: parse_env(
                &lookup,
                "KIS_PUBLISH_QUEUE_CAPACITY",
                PublishSettings::default().queue_capacity,
            )
            .max(1),
        };

        let server = ServerSettings {
            metrics_port: parse_env(
                &lookup,
                "KIS_BRIDGE_METRICS_PORT",
                ServerSettings::default().metrics_port,
            ),
        };

        Ok(Self {
            environment,
            credentials: Credentials::new(app_key, app_secret),
            endpoints,
            stream,
            token,
            poll,
            publish,
            server,
        })
    }
}

impl From<&TokenSettings> for CredentialCacheConfig {
    fn from(settings: &TokenSettings) -> Self {
        Self {
            token_validity: chrono::Duration::from_std(settings.validity)
                .unwrap_or(chrono::Duration::MAX),
            renewal_margin: chrono::Duration::from_std(settings.renewal_margin)
                .unwrap_or(chrono::Duration::MAX),
        }
    }
}

impl PollSettings {
    /// Scheduler configuration, or `None` when polling is disabled.
    #[must_use]
    pub fn scheduler_config(&self) -> Option<PollSchedulerConfig> {
        self.interval.map(|interval| PollSchedulerConfig {
            interval,
            topic: self.ranking_topic.clone(),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// URL is malformed or has the wrong scheme.
    #[error("invalid URL in {key}: {value}")]
    InvalidUrl {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// A subscription code is malformed.
    #[error("invalid subscription list: {0}")]
    InvalidSubscription(#[from] SubscriptionError),
    /// A numeric setting is outside its accepted range.
    #[error("invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// Accepted range.
        reason: &'static str,
    },
    /// The secrets file could not be read.
    #[error("cannot read secrets file {path}: {message}")]
    SecretsFile {
        /// File path.
        path: String,
        /// Error details.
        message: String,
    },
}

/// Read a JSON object of string values, e.g.
/// `{"kis.api.appKey":"…","kis.api.appSecret":"…"}`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not such an object.
pub fn load_secrets_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let secrets_error = |message: String| ConfigError::SecretsFile {
        path: path.display().to_string(),
        message,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| secrets_error(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| secrets_error(e.to_string()))
}

fn required<F>(
    lookup: &F,
    secrets: &HashMap<String, String>,
    secret_key: &str,
    env_key: &str,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = secrets
        .get(secret_key)
        .cloned()
        .or_else(|| lookup(env_key))
        .ok_or_else(|| ConfigError::MissingEnvVar(env_key.to_string()))?;

    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(env_key.to_string()));
    }
    Ok(value.trim().to_string())
}

fn validate_url(key: &str, value: &str, schemes: &[&str]) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        key: key.to_string(),
        value: value.to_string(),
    };
    let url = Url::parse(value).map_err(|_| invalid())?;
    if !schemes.contains(&url.scheme()) || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(value.to_string())
}

fn invalid_value(key: &str, value: impl std::fmt::Display, reason: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

fn validate_reconnect(stream: &StreamSettings) -> Result<(), ConfigError> {
    if stream.reconnect_delay_initial.is_zero() {
        return Err(invalid_value(
            "KIS_RECONNECT_DELAY_INITIAL_MS",
            0,
            "must be at least 1",
        ));
    }
    if stream.reconnect_delay_max < stream.reconnect_delay_initial {
        return Err(invalid_value(
            "KIS_RECONNECT_DELAY_MAX_SECS",
            stream.reconnect_delay_max.as_secs(),
            "must not be below the initial delay",
        ));
    }
    let multiplier = stream.reconnect_delay_multiplier;
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(invalid_value(
            "KIS_RECONNECT_DELAY_MULTIPLIER",
            multiplier,
            "must be a finite number of at least 1.0",
        ));
    }
    Ok(())
}

fn validate_token(token: &TokenSettings) -> Result<(), ConfigError> {
    if token.validity.is_zero() || token.validity > MAX_TOKEN_VALIDITY {
        return Err(invalid_value(
            "KIS_TOKEN_VALIDITY_SECS",
            token.validity.as_secs(),
            "must be between 1 and 604800",
        ));
    }
    if token.renewal_margin >= token.validity {
        return Err(invalid_value(
            "KIS_TOKEN_RENEWAL_MARGIN_SECS",
            token.renewal_margin.as_secs(),
            "must be below the token validity",
        ));
    }
    Ok(())
}

fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
