use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_STRIPE_TIMEOUT_SECS: u64 = 30;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to bootstrap the database schema on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Stripe secret API key. Absent => every gateway call fails at first use.
    #[serde(default)]
    pub stripe_api_key: Option<String>,

    /// Shared secret for verifying inbound Stripe webhook signatures.
    /// Absent => the webhook endpoint acknowledges and ignores all events.
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,

    /// Webhook signature timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    #[validate(custom = "validate_nonzero_secs")]
    pub stripe_webhook_tolerance_secs: u64,

    /// Default redirect URLs for internally-created checkout sessions
    #[serde(default)]
    pub stripe_success_url: Option<String>,
    #[serde(default)]
    pub stripe_cancel_url: Option<String>,

    /// Bound on the synchronous Stripe API call (seconds)
    #[serde(default = "default_stripe_timeout_secs")]
    #[validate(custom = "validate_nonzero_secs")]
    pub stripe_timeout_secs: u64,
}

impl AppConfig {
    /// Creates a new configuration with defaults for everything optional.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            stripe_success_url: None,
            stripe_cancel_url: None,
            stripe_timeout_secs: default_stripe_timeout_secs(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// True when a webhook shared secret has been configured.
    pub fn webhook_enabled(&self) -> bool {
        self.stripe_webhook_secret
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_stripe_timeout_secs() -> u64 {
    DEFAULT_STRIPE_TIMEOUT_SECS
}

fn validate_nonzero_secs(value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        let mut err = ValidationError::new("nonzero_secs");
        err.message = Some("must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("company_payments_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://company_payments.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if !app_config.webhook_enabled() {
        info!("stripe_webhook_secret not configured; webhook endpoint will acknowledge and ignore events");
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        )
    }

    #[test]
    fn webhook_disabled_without_secret() {
        let cfg = base_config();
        assert!(!cfg.webhook_enabled());
    }

    #[test]
    fn blank_secret_counts_as_disabled() {
        let mut cfg = base_config();
        cfg.stripe_webhook_secret = Some("   ".into());
        assert!(!cfg.webhook_enabled());
    }

    #[test]
    fn webhook_enabled_with_secret() {
        let mut cfg = base_config();
        cfg.stripe_webhook_secret = Some("whsec_test".into());
        assert!(cfg.webhook_enabled());
    }

    #[test]
    fn zero_tolerance_fails_validation() {
        let mut cfg = base_config();
        cfg.stripe_webhook_tolerance_secs = 0;
        assert!(cfg.validate().is_err());
    }
}
