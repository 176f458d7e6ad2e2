//! # configs
//!
//! Layered settings for the agora binary: built-in defaults, then an
//! optional TOML file, then `AGORA__`-prefixed environment variables
//! (`AGORA__RANKING__INTERVAL_SECS=30`). A `.env` file is read first so it
//! can feed the environment layer.

use std::time::Duration;

use agora_core::ranking::{
    RankingParams, DEFAULT_DAMPER, DEFAULT_FACTOR, DEFAULT_GRAVITY, DEFAULT_PENALTY,
};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Settings file read when `AGORA_CONFIG` is unset. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "agora.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub ranking: RankingSettings,
    pub auth: AuthSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Default: `sqlite://agora.db`
    pub url: String,
    /// Default: `5`
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingSettings {
    /// Seconds between ranking sweeps. Default: `10`
    pub interval_secs: u64,
    pub factor: f64,
    pub penalty: i64,
    pub damper: i64,
    pub gravity: f64,
}

impl RankingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn params(&self) -> RankingParams {
        RankingParams {
            factor: self.factor,
            penalty: self.penalty,
            damper: self.damper,
            gravity: self.gravity,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HMAC secret for session tokens. No default; must be set.
    pub jwt_secret: SecretString,
    /// Default: `agora`
    pub issuer: String,
    /// Default: `3600`
    pub token_ttl_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    /// Default: `info,agora=debug`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output. Default: `false`
    pub json: bool,
}

impl Settings {
    /// Reads `.env`, then the file named by `AGORA_CONFIG` (or
    /// [`DEFAULT_CONFIG_FILE`]), then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let path =
            std::env::var("AGORA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let settings = Self::from_builder(
            Self::defaults()?
                .add_source(File::with_name(&path).required(false))
                .add_source(Self::environment()),
        )?;
        Ok(settings)
    }

    /// Parses settings from TOML text layered over the defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Self::from_builder(Self::defaults()?.add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("database.url", "sqlite://agora.db")?
            .set_default("database.max_connections", 5)?
            .set_default("ranking.interval_secs", 10)?
            .set_default("ranking.factor", DEFAULT_FACTOR)?
            .set_default("ranking.penalty", DEFAULT_PENALTY)?
            .set_default("ranking.damper", DEFAULT_DAMPER)?
            .set_default("ranking.gravity", DEFAULT_GRAVITY)?
            .set_default("auth.jwt_secret", "")?
            .set_default("auth.issuer", "agora")?
            .set_default("auth.token_ttl_secs", 3600)?
            .set_default("log.filter", "info,agora=debug")?
            .set_default("log.json", false)?)
    }

    fn environment() -> Environment {
        Environment::with_prefix("AGORA")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ranking.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "ranking.interval_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.ranking.damper <= 0 {
            return Err(ConfigError::Invalid {
                key: "ranking.damper",
                reason: "must be positive so new posts never divide by zero".into(),
            });
        }
        if self.auth.jwt_secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "auth.jwt_secret",
                reason: "must be set (AGORA__AUTH__JWT_SECRET)".into(),
            });
        }
        if self.auth.token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                key: "auth.token_ttl_secs",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}
