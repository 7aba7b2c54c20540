//! TOML-based application configuration.
//!
//! Stores the session duration, the daily goal, and an optional exercise
//! catalog override. Configuration lives at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::{ConfigError, CoreError};
use crate::exercise::{Exercise, ExerciseCatalog};
use crate::quota::DEFAULT_DAILY_GOAL;
use crate::session::DEFAULT_SESSION_SECS;

/// Session-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Fixed duration of one breathing session, in seconds.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u32,
}

/// Quota-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_daily_goal")]
    pub daily_goal: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Exercise catalog override. The built-in exercises are used when unset.
    #[serde(default)]
    pub custom_exercises: Option<Vec<Exercise>>,
}

fn default_duration_secs() -> u32 {
    DEFAULT_SESSION_SECS
}
fn default_daily_goal() -> u32 {
    DEFAULT_DAILY_GOAL
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_goal: default_daily_goal(),
        }
    }
}

impl Config {
    fn path() -> std::io::Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return (and write) the default.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed, or if
    /// the default config cannot be written to disk.
    pub fn load() -> Result<Self, CoreError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                ConfigError::LoadFailed {
                    path,
                    message: e.to_string(),
                }
                .into()
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), CoreError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// The exercise catalog this configuration selects.
    pub fn catalog(&self) -> ExerciseCatalog {
        match &self.custom_exercises {
            Some(list) if !list.is_empty() => ExerciseCatalog::new(list.clone()),
            _ => ExerciseCatalog::builtin(),
        }
    }

    /// Update a settable key and persist.
    ///
    /// # Errors
    /// Returns an error for unknown keys, unparseable values, or a failed
    /// save.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        self.apply(key, value)?;
        self.save()
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "session.duration_secs" => self.session.duration_secs = parse_positive(key, value)?,
            "quota.daily_goal" => self.quota.daily_goal = parse_positive(key, value)?,
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "unknown key".to_string(),
                })
            }
        }
        Ok(())
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u32, ConfigError> {
    let parsed = value.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot parse '{value}' as number"),
    })?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}
