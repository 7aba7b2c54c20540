mod config;
pub mod database;

pub use config::{Config, QuotaConfig, SessionConfig};
pub use database::{Database, SessionOutcome, SessionRecord, Stats};

use std::path::PathBuf;

use crate::error::StorageError;

/// Key-value persistence contract used by the quota tracker.
///
/// Both keys and values are plain strings; mapping them to the `DailyQuota`
/// entity is the `QuotaStore`'s job.
pub trait StateStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Returns `~/.config/tarini[-dev]/` based on TARINI_ENV.
///
/// Set TARINI_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TARINI_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("tarini-dev")
    } else {
        base_dir.join("tarini")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
