//! TOML-based application configuration.
//!
//! Sections:
//! - `gesture`: hold and decay windows, tick interval
//! - `capture`: auto-capture delay, camera resolution, JPEG quality, caption
//! - `upload`: blob bucket and the close delay after success
//! - `remote`: backend URL, API key, table names
//!
//! Configuration is stored at `~/.config/holdfast/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::capture::CaptureConfig;
use crate::error::ConfigError;
use crate::gesture::GestureConfig;
use crate::remote::RemoteConfig;
use crate::upload::UploadConfig;

/// Overrides `remote.api_key` without writing it to disk.
pub const API_KEY_ENV: &str = "HOLDFAST_API_KEY";

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/holdfast/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        if key.is_empty() {
            return Err(unknown());
        }
        let mut parts = key.split('.').peekable();

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// validated, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config =
                    toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(err) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key, keeping the existing value's type.
    /// Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting config fails validation.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Reject durations of zero and JPEG quality outside 1..=100.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("gesture.hold_ms", self.gesture.hold_ms),
            ("gesture.decay_ms", self.gesture.decay_ms),
            ("gesture.tick_ms", self.gesture.tick_ms),
            ("capture.auto_capture_ms", self.capture.auto_capture_ms),
            ("capture.ideal_width", u64::from(self.capture.ideal_width)),
            ("capture.ideal_height", u64::from(self.capture.ideal_height)),
            ("upload.close_delay_ms", self.upload.close_delay_ms),
            ("remote.timeout_secs", self.remote.timeout_secs),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::InvalidValue {
                key: (*key).to_string(),
                message: "must be greater than zero".into(),
            });
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(ConfigError::InvalidValue {
                key: "capture.jpeg_quality".into(),
                message: format!("{} is outside 1..=100", self.capture.jpeg_quality),
            });
        }
        if self.upload.bucket.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "upload.bucket".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Remote settings with the API key taken from the environment if set.
    pub fn resolved_remote(&self) -> RemoteConfig {
        let mut remote = self.remote.clone();
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                remote.api_key = key;
            }
        }
        remote
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.gesture.hold_ms, 5_000);
        assert_eq!(parsed.upload.bucket, "panic_images");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[gesture]\nhold_ms = 3000\n").unwrap();
        assert_eq!(parsed.gesture.hold_ms, 3_000);
        assert_eq!(parsed.gesture.decay_ms, 2_500);
        assert_eq!(parsed.capture.jpeg_quality, 80);
        assert_eq!(parsed.remote.tasks_table, "habits");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("gesture.decay_ms").as_deref(), Some("2500"));
        assert_eq!(cfg.get("upload.bucket").as_deref(), Some("panic_images"));
        assert!(cfg.get("gesture.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_updates_nested_number() {
        let mut cfg = Config::default();
        cfg.set("capture.jpeg_quality", "65").unwrap();
        assert_eq!(cfg.capture.jpeg_quality, 65);
    }

    #[test]
    fn set_updates_string_and_optional() {
        let mut cfg = Config::default();
        cfg.set("remote.base_url", "https://example.supabase.co").unwrap();
        cfg.set("remote.transform_function", "punish").unwrap();
        assert_eq!(cfg.remote.base_url, "https://example.supabase.co");
        assert_eq!(cfg.remote.transform_function.as_deref(), Some("punish"));
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        let err = cfg.set("gesture.nonexistent", "1").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        let err = cfg.set("gesture.hold_ms", "forever").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!(cfg.gesture.hold_ms, 5_000);
    }

    #[test]
    fn validation_rejects_zero_durations_and_bad_quality() {
        let mut cfg = Config::default();
        assert!(cfg.set("gesture.decay_ms", "0").is_err());
        assert!(cfg.set("capture.jpeg_quality", "101").is_err());
        assert!(cfg.set("capture.jpeg_quality", "0").is_err());
        assert_eq!(cfg, Config::default());
    }
}
