//! Centralized server configuration.
//!
//! Loaded via the `config` crate from a YAML file, with environment variables
//! prefixed `GOBOARD` layered on top (`GOBOARD__AUTH__CLIENT_SECRET=...`).
//!
//! See [`AuthConfig`](goboard_access::AuthConfig) for OIDC authentication
//! configuration and [`ServiceConfig`](goboard_access::ServiceConfig) for the
//! dashboard entries.

use goboard_access::{AuthConfig, ServiceConfig};
use serde::Deserialize;
use std::path::Path;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,

    /// HTTP listener and page settings.
    #[serde(default)]
    pub server: HttpConfig,

    /// Session housekeeping configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// OIDC authentication configuration. Without it the dashboard is public.
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Services listed on the dashboard.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Include file and line of the call site in every event.
    #[serde(default)]
    pub add_source: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            add_source: false,
        }
    }
}

/// HTTP listener and page settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Dashboard title.
    #[serde(default = "default_title")]
    pub title: String,

    /// Dashboard icon URL.
    #[serde(default)]
    pub icon: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_title() -> String {
    "homepage".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            title: default_title(),
            icon: String::new(),
        }
    }
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Interval between sweeps of expired login requests and dead sessions, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Interval between refetches of the provider's signing keys, in seconds.
    #[serde(default = "default_key_refresh_interval_seconds")]
    pub key_refresh_interval_seconds: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_key_refresh_interval_seconds() -> u64 {
    3600
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            key_refresh_interval_seconds: default_key_refresh_interval_seconds(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `path`, then from `GOBOARD__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or the configuration is invalid.
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix("GOBOARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// Rejects values the background tasks and stores cannot run with.
    fn validated(self) -> Result<Self, config::ConfigError> {
        if self.session.cleanup_interval_seconds == 0 {
            return Err(invalid("session.cleanup_interval_seconds must be positive"));
        }
        if self.session.key_refresh_interval_seconds == 0 {
            return Err(invalid("session.key_refresh_interval_seconds must be positive"));
        }
        if let Some(auth) = &self.auth {
            let ttl = auth.pending_ttl();
            if ttl <= chrono::Duration::zero() || ttl > MAX_PENDING_TTL {
                return Err(invalid("auth.pending_ttl_seconds must be between 1 and 86400"));
            }
            if auth.refresh_timeout().is_zero() {
                return Err(invalid("auth.refresh_timeout_seconds must be positive"));
            }
        }
        Ok(self)
    }
}

/// Upper bound for `auth.pending_ttl_seconds`.
const MAX_PENDING_TTL: chrono::Duration = chrono::Duration::days(1);

fn invalid(message: &str) -> config::ConfigError {
    config::ConfigError::Message(message.to_string())
}
