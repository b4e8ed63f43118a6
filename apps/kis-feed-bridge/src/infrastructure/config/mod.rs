//! Configuration Module
//!
//! Configuration loading for the bridge service.

mod settings;

pub use settings::{
    BridgeConfig, ConfigError, Credentials, EndpointSettings, Environment, MAX_TOKEN_VALIDITY,
    PollSettings, PublishSettings, SECRET_APP_KEY, SECRET_APP_SECRET, SECRET_BASE_URL,
    ServerSettings, StreamSettings, TokenSettings, load_secrets_file,
};
