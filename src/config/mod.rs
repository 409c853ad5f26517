//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup, fails fast if required values are missing or
//! invalid. Passwords and connection URLs are wrapped in
//! `secrecy::SecretString` to prevent log leaks; Postgres connection options
//! are only built when connecting.

pub mod secrets;

use crate::allocator::AllocationMode;
use crate::error::{Error, Result};
use crate::queue::PoolConfig;
use crate::telemetry::LogFormat;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "fatal"];

#[derive(Debug)]
pub struct Config {
    pub database: DatabaseConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Directory for the log file; stdout only when unset.
    pub log_path: Option<PathBuf>,
    pub queue: QueueSettings,
}

/// Where the Postgres pool connects.
#[derive(Debug)]
pub enum DatabaseConfig {
    /// A full connection URL, as given by `DATABASE_URL`.
    Url(SecretString),
    /// Individual fields from the `[postgres]` file section.
    Fields {
        host: String,
        port: u16,
        username: String,
        password: SecretString,
        database: String,
    },
}

impl DatabaseConfig {
    /// Connection options for the pool. Field values are passed through
    /// as-is, so credentials need no URL escaping.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        match self {
            DatabaseConfig::Url(url) => Ok(PgConnectOptions::from_str(url.expose_secret())?),
            DatabaseConfig::Fields {
                host,
                port,
                username,
                password,
                database,
            } => Ok(PgConnectOptions::new_without_pgpass()
                .host(host)
                .port(*port)
                .username(username)
                .password(password.expose_secret())
                .database(database)
                .ssl_mode(PgSslMode::Disable)),
        }
    }
}

/// Worker pool settings shared by the env and file loaders.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub workers: usize,
    pub allocation: AllocationMode,
    pub grace_ms: u64,
    pub min_work_ms: u64,
    pub max_work_ms: u64,
    pub max_sticks: i64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            workers: 5,
            allocation: AllocationMode::default(),
            grace_ms: pool.grace_period.as_millis() as u64,
            min_work_ms: pool.min_work.as_millis() as u64,
            max_work_ms: pool.max_work.as_millis() as u64,
            max_sticks: pool.max_sticks,
        }
    }
}

impl QueueSettings {
    /// Pool timings and ranges derived from these settings.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            allocation: self.allocation,
            grace_period: Duration::from_millis(self.grace_ms),
            min_work: Duration::from_millis(self.min_work_ms),
            max_work: Duration::from_millis(self.max_work_ms),
            max_sticks: self.max_sticks,
        }
    }
}

/// On-disk layout: `[postgres]`, `[logging]`, `[queue]`.
#[derive(Deserialize)]
struct FileConfig {
    postgres: PostgresSection,
    #[serde(default)]
    logging: LoggingSection,
    #[serde(default)]
    queue: QueueSettings,
    otel_endpoint: Option<String>,
}

#[derive(Deserialize)]
struct PostgresSection {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    username: String,
    password: String,
    #[serde(default = "default_database")]
    database: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LoggingSection {
    level: String,
    encoding: String,
    path: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            encoding: "console".to_string(),
            path: None,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "postgres".to_string()
}

impl From<PostgresSection> for DatabaseConfig {
    fn from(section: PostgresSection) -> Self {
        DatabaseConfig::Fields {
            host: section.host,
            port: section.port,
            username: section.username,
            password: SecretString::from(section.password),
            database: section.database,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = QueueSettings::default();
        let queue = QueueSettings {
            workers: parsed_var("BEAVER_WORKERS")?.unwrap_or(defaults.workers),
            allocation: parsed_var("BEAVER_ALLOCATION")?.unwrap_or(defaults.allocation),
            ..defaults
        };

        let config = Self {
            database: DatabaseConfig::Url(SecretString::from(required_var("DATABASE_URL")?)),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parsed_var("LOG_FORMAT")?.unwrap_or_default(),
            log_path: std::env::var_os("LOG_PATH").map(PathBuf::from),
            queue,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

        let config = Self {
            database: file.postgres.into(),
            otel_endpoint: file.otel_endpoint,
            log_level: file.logging.level,
            log_format: file.logging.encoding.parse()?,
            log_path: file.logging.path,
            queue: file.queue,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialization alone cannot.
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "logging level {:?} is invalid, values: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        if self.queue.workers == 0 {
            return Err(Error::Config("queue.workers must be at least 1".to_string()));
        }
        if self.queue.min_work_ms > self.queue.max_work_ms {
            return Err(Error::Config(format!(
                "queue.min_work_ms ({}) exceeds queue.max_work_ms ({})",
                self.queue.min_work_ms, self.queue.max_work_ms
            )));
        }
        if self.queue.max_sticks < 0 {
            return Err(Error::Config("queue.max_sticks must be non-negative".to_string()));
        }
        Ok(())
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
