//! # configs
//!
//! Layered runtime settings. Later sources win:
//!
//! 1. built-in defaults
//! 2. `config/default.toml` (optional)
//! 3. `config/{RPB_ENV}.toml` (optional, `RPB_ENV` defaults to `development`)
//! 4. `RPB__SECTION__KEY` environment variables, after `.env` is loaded
//!
//! Secrets are held in [`SecretString`] so they never show up in `Debug`
//! output or logs.

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "RPB";
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub activity: ActivitySettings,
    pub threads: ThreadSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Without a `url` the binary falls back to the in-memory store.
#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub url: Option<SecretString>,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: SecretString,
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ActivitySettings {
    pub cutoff_window_days: u32,
    /// How often the job wakes up to see whether a check date has arrived.
    pub job_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ThreadSettings {
    pub archive_forum_id: i32,
    pub finished_post_threshold: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub filter: String,
    pub json: bool,
}

impl Settings {
    /// Loads `.env`, then every layer, then validates.
    pub fn load() -> Result<Self, SettingsError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(SettingsError::Invalid(format!(".env: {e}"))),
        }
        let env_name = std::env::var("RPB_ENV").unwrap_or_else(|_| "development".to_string());
        let settings = Self::from_layers(Path::new("config"), &env_name, environment())?;
        info!(env = %env_name, "configuration loaded");
        Ok(settings)
    }

    /// Builds settings from a config directory and an environment source.
    pub fn from_layers(dir: &Path, env_name: &str, env: Environment) -> Result<Self, SettingsError> {
        let settings: Settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("auth.token_ttl_secs", 86_400)?
            .set_default("activity.cutoff_window_days", 7)?
            .set_default("activity.job_interval_secs", 3_600)?
            .set_default("threads.archive_forum_id", 7)?
            .set_default("threads.finished_post_threshold", 10)?
            .set_default("log.filter", "info")?
            .set_default("log.json", false)?
            .add_source(File::from(dir.join("default")).required(false))
            .add_source(File::from(dir.join(env_name)).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let secret_len = self.auth.jwt_secret.expose_secret().len();
        if secret_len < MIN_JWT_SECRET_LENGTH {
            return Err(SettingsError::Invalid(format!(
                "auth.jwt_secret must be at least {MIN_JWT_SECRET_LENGTH} bytes, got {secret_len}"
            )));
        }
        if !(1..=28).contains(&self.activity.cutoff_window_days) {
            return Err(SettingsError::Invalid(format!(
                "activity.cutoff_window_days must be within 1..=28, got {}",
                self.activity.cutoff_window_days
            )));
        }
        if self.activity.job_interval_secs == 0 {
            return Err(SettingsError::Invalid("activity.job_interval_secs must be positive".into()));
        }
        if self.threads.finished_post_threshold == 0 {
            return Err(SettingsError::Invalid(
                "threads.finished_post_threshold must be positive".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(SettingsError::Invalid("database.max_connections must be positive".into()));
        }
        Ok(())
    }
}

/// `RPB__AUTH__JWT_SECRET` maps to `auth.jwt_secret`.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
