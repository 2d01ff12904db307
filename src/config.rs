use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub threads: ThreadConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    /// Maximum concurrent `children_of` calls within one thread build
    pub fanout_width: usize,
    /// `None` means unbounded
    pub max_depth: Option<usize>,
    pub max_body_chars: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/comments.db".to_string(),
            max_connections: 20,
            min_connections: 1,
            acquire_timeout_secs: 8,
        }
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            fanout_width: 4,
            max_depth: None,
            max_body_chars: 2000,
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key/value source; unset keys fall back to
    /// defaults, malformed values are errors
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Self {
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.database.max_connections)?,
                min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", defaults.database.min_connections)?,
                acquire_timeout_secs: parse_or(
                    &lookup,
                    "DB_ACQUIRE_TIMEOUT_SECS",
                    defaults.database.acquire_timeout_secs,
                )?,
            },
            threads: ThreadConfig {
                fanout_width: parse_or(&lookup, "THREAD_FANOUT_WIDTH", defaults.threads.fanout_width)?,
                max_depth: match lookup("THREAD_MAX_DEPTH") {
                    Some(raw) => Some(parse_value("THREAD_MAX_DEPTH", &raw)?),
                    None => None,
                },
                max_body_chars: parse_or(&lookup, "COMMENT_MAX_BODY_CHARS", defaults.threads.max_body_chars)?,
            },
            logging: LoggingConfig {
                filter: lookup("LOG_FILTER"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.database.max_connections == 0 {
            return Err(AppError::ConfigurationError("DB_MAX_CONNECTIONS must be at least 1".to_string()));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigurationError(
                "DB_MIN_CONNECTIONS cannot exceed DB_MAX_CONNECTIONS".to_string(),
            ));
        }
        if self.threads.fanout_width == 0 {
            return Err(AppError::ConfigurationError("THREAD_FANOUT_WIDTH must be at least 1".to_string()));
        }
        if self.threads.max_depth == Some(0) {
            return Err(AppError::ConfigurationError("THREAD_MAX_DEPTH must be at least 1".to_string()));
        }
        if self.threads.max_body_chars == 0 {
            return Err(AppError::ConfigurationError("COMMENT_MAX_BODY_CHARS must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Thread settings with the fan-out capped at the pool size, so a build
    /// never queues on connections it cannot get
    pub fn effective_thread_config(&self) -> ThreadConfig {
        ThreadConfig {
            fanout_width: self
                .threads
                .fanout_width
                .min(self.database.max_connections as usize)
                .max(1),
            ..self.threads
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> AppResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::ConfigurationError(format!("{} has an invalid value: {:?}", key, raw)))
}
