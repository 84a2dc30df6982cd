//! Settings file management.
//!
//! Loads and saves `~/.clinic-backup/config.json`. Every field is optional in
//! the file; missing fields take their defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::i18n::Lang;
use crate::store::ReadinessPolicy;

/// User settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Selected clinic; scopes billing items and some key-value keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,
    pub lang: Lang,
    pub patients_per_page: usize,
    pub consultation_page_size: usize,
    /// Pause between consultation page fetches.
    pub page_delay_ms: u64,
    pub readiness_attempts: u32,
    pub readiness_interval_ms: u64,
    /// Where restored cache files go; defaults to `~/.clinic-backup/cache`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            clinic_id: None,
            lang: Lang::Zh,
            patients_per_page: 10,
            consultation_page_size: 500,
            page_delay_ms: 0,
            readiness_attempts: 100,
            readiness_interval_ms: 50,
            cache_dir: None,
        }
    }
}

impl Settings {
    /// Readiness polling schedule.
    #[must_use]
    pub fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            attempts: self.readiness_attempts,
            interval: Duration::from_millis(self.readiness_interval_ms),
        }
    }

    /// Delay between consultation pages.
    #[must_use]
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Cache directory, falling back to the global one.
    #[must_use]
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| super::global_dir().map(|dir| dir.join("cache")))
    }
}

/// Default settings file path.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn settings_path() -> Result<PathBuf> {
    super::global_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or(Error::Config("Could not determine home directory".into()))
}

/// Load settings from `path`, or defaults if the file doesn't exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Save settings to `path`.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.lang, Lang::Zh);
        assert_eq!(settings.readiness(), ReadinessPolicy::default());
        assert_eq!(settings.page_delay(), Duration::ZERO);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = load_settings(&temp_dir.path().join("config.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"clinicId": "c1", "lang": "en"}"#).unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.clinic_id.as_deref(), Some("c1"));
        assert_eq!(settings.lang, Lang::En);
        assert_eq!(settings.consultation_page_size, 500);
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");
        let settings = Settings {
            clinic_id: Some("c2".into()),
            patients_per_page: 20,
            ..Settings::default()
        };

        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{oops").unwrap();
        assert!(matches!(load_settings(&path), Err(Error::Config(_))));
    }
}
