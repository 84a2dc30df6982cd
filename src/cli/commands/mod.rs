//! Command implementations.

pub mod completions;
pub mod export;
pub mod import;
pub mod init;
pub mod inspect;
pub mod status;
pub mod version;

use std::path::PathBuf;

use crate::app::AppContext;
use crate::cli::Cli;
use crate::config::{load_settings, resolve_store_path, settings_path, Settings};
use crate::error::{Error, Result};
use crate::i18n::Lang;
use crate::store::SqliteStore;

/// Load settings and apply the global flags on top.
///
/// # Errors
///
/// Returns an error if the settings file is invalid or `--lang` is unknown.
pub fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = load_settings(&settings_path()?)?;
    if let Some(clinic) = &cli.clinic {
        settings.clinic_id = Some(clinic.clone());
    }
    if let Some(lang) = &cli.lang {
        settings.lang = lang
            .parse::<Lang>()
            .map_err(|e| Error::InvalidArgument(format!("lang: {e}")))?;
    }
    Ok(settings)
}

/// Resolve the store path from `--store`, test mode, or the global default.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn store_path(cli: &Cli) -> Result<PathBuf> {
    resolve_store_path(cli.store.as_deref())
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))
}

/// Open an existing store and wrap it in an application context.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if the store file does not exist.
pub fn open_context(cli: &Cli) -> Result<(AppContext<SqliteStore>, PathBuf)> {
    let path = store_path(cli)?;
    if !path.exists() {
        return Err(Error::NotInitialized { path });
    }
    let settings = resolve_settings(cli)?;
    let store = SqliteStore::open(&path)?;
    Ok((AppContext::new(store, settings), path))
}
