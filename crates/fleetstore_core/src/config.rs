//! Store configuration loading.
//!
//! # Responsibility
//! - Deserialize `StoreConfig` from JSON files.
//! - Apply `FLEETSTORE_*` environment overrides.
//! - Validate values before any connection is opened.
//!
//! # Invariants
//! - Missing sections fall back to defaults.
//! - An empty `cascades` list selects the built-in fleet cascades.

use crate::db::DEFAULT_BUSY_TIMEOUT_MS;
use crate::service::cascade_delete::CascadeRule;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Environment variable overriding `database.path`.
pub const ENV_DB_PATH: &str = "FLEETSTORE_DB_PATH";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "FLEETSTORE_LOG_LEVEL";
/// Environment variable overriding `logging.dir`.
pub const ENV_LOG_DIR: &str = "FLEETSTORE_LOG_DIR";


pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Json(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Json(err) => write!(f, "invalid config JSON: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Database section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite file. `None` opens an in-memory database.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute log directory. `None` leaves file logging off.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let level = if cfg!(debug_assertions) { "debug" } else { "info" };
        Self {
            level: level.to_string(),
            dir: None,
        }
    }
}

impl LoggingConfig {
    /// Canonical `log` level name for `level`; `warning` is accepted as `warn`.
    pub fn level_filter(&self) -> ConfigResult<&'static str> {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok("trace"),
            "debug" => Ok("debug"),
            "info" => Ok("info"),
            "warn" | "warning" => Ok("warn"),
            "error" => Ok("error"),
            _ => Err(ConfigError::Invalid(format!(
                "unsupported logging.level `{}`; expected trace|debug|info|warn|error",
                self.level
            ))),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub cascades: Vec<CascadeRule>,
}

impl StoreConfig {
    /// Parses and validates a JSON document. Environment overrides are not applied.
    pub fn from_json_str(input: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides looked up through `lookup`; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.logging.dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "database.busy_timeout_ms must be positive".to_string(),
            ));
        }

        self.logging.level_filter()?;
        if let Some(dir) = &self.logging.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "logging.dir must be an absolute path, got `{}`",
                    dir.display()
                )));
            }
        }

        for rule in &self.cascades {
            if rule.dependents.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "cascade for `{}` declares no dependents",
                    rule.resource
                )));
            }
        }
        Ok(())
    }

    /// Configured cascades, or the built-in fleet cascades when none are given.
    pub fn effective_cascades(&self) -> Vec<CascadeRule> {
        if self.cascades.is_empty() {
            return CascadeRule::fleet_defaults();
        }
        self.cascades.clone()
    }
}
