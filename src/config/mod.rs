//! Configuration management.
//!
//! This module resolves where the clinic store lives and loads user settings.
//!
//! # Layout
//!
//! Everything lives under one global directory, `~/.clinic-backup/`:
//! - **Store**: `data/clinic.db`
//! - **Test store**: `test/clinic.db` (when `CB_TEST_STORE` is set)
//! - **Settings**: `config.json`
//! - **Cache**: `cache/` (files written after a restore)

mod settings;

pub use settings::{load_settings, save_settings, settings_path, Settings};

use std::path::{Path, PathBuf};

/// Name of the global directory under the home directory.
const DIR_NAME: &str = ".clinic-backup";

/// Get the global clinic-backup directory.
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(DIR_NAME))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `CB_TEST_STORE=1` (or any non-empty value
/// other than `0`/`false`). It redirects the store to an isolated database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("CB_TEST_STORE").is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Get the test store path: `~/.clinic-backup/test/clinic.db`.
#[must_use]
pub fn test_store_path() -> Option<PathBuf> {
    global_dir().map(|dir| dir.join("test").join("clinic.db"))
}

/// Resolve the store path.
///
/// Priority:
/// 1. `explicit_path` (the `--store` flag, which also reads `CB_STORE`)
/// 2. `CB_TEST_STORE` → test store
/// 3. Global location: `~/.clinic-backup/data/clinic.db`
#[must_use]
pub fn resolve_store_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_store_path();
    }

    global_dir().map(|dir| dir.join("data").join("clinic.db"))
}
