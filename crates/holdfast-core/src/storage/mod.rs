mod config;
pub mod database;

pub use config::{Config, API_KEY_ENV};
pub use database::{CachedPhoto, Database};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/holdfast[-dev]/` based on HOLDFAST_ENV.
///
/// Set HOLDFAST_ENV=dev to use the development data directory, or
/// HOLDFAST_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("HOLDFAST_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("HOLDFAST_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("holdfast-dev")
            } else {
                base_dir.join("holdfast")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
