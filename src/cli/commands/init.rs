//! Create the clinic store.
//!
//! The store is a single SQLite file, by default under
//! `~/.clinic-backup/data/`. `--seed-billing` fills the billing collection
//! (or the clinic's, with `--clinic`) with the default catalog. The first
//! init also writes `~/.clinic-backup/config.json`, keeping `--clinic` and
//! `--lang` for later commands.

use crate::cli::Cli;
use crate::cli::commands::{resolve_settings, store_path};
use crate::config::{save_settings, settings_path, Settings};
use crate::error::{Error, Result};
use crate::model::{clinic_billing_collection, default_billing_records, CollectionName};
use crate::store::SqliteStore;
use crate::sync::replace_collection;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Serialize)]
struct InitOutput {
    store: PathBuf,
    /// Billing collection seeded, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    seeded: Option<String>,
    seeded_items: usize,
    /// Settings file written, if none existed yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<PathBuf>,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns [`Error::AlreadyInitialized`] if the store exists and `force` is
/// not set, or an error if the store cannot be created.
pub fn execute(cli: &Cli, force: bool, seed_billing: bool, json: bool) -> Result<()> {
    let path = store_path(cli)?;
    let settings = resolve_settings(cli)?;

    let mut output = init_store(&path, force, seed_billing, settings.clinic_id.as_deref())?;
    output.settings = write_settings_once(&settings_path()?, &settings)?;

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized clinic store");
        println!("  Store: {}", output.store.display());
        if let Some(collection) = &output.seeded {
            println!("  Seeded {} billing items into {collection}", output.seeded_items);
        }
        if let Some(settings) = &output.settings {
            println!("  Settings: {}", settings.display());
        }
    }

    Ok(())
}

fn init_store(
    path: &Path,
    force: bool,
    seed_billing: bool,
    clinic_id: Option<&str>,
) -> Result<InitOutput> {
    if path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized {
                path: path.to_path_buf(),
            });
        }
        fs::remove_file(path)?;
    }

    let mut store = SqliteStore::open(path)?;
    info!(path = %path.display(), "store created");

    let mut output = InitOutput {
        store: path.to_path_buf(),
        seeded: None,
        seeded_items: 0,
        settings: None,
    };

    if seed_billing {
        let collection = clinic_id.map_or_else(
            || CollectionName::BillingItems.to_string(),
            clinic_billing_collection,
        );
        let records = default_billing_records(Utc::now());
        let stats = replace_collection(&mut store, &collection, &records)?;
        output.seeded_items = stats.upserted;
        output.seeded = Some(collection);
    }

    Ok(output)
}

/// Save `settings` to `path` unless a settings file is already there.
fn write_settings_once(path: &Path, settings: &Settings) -> Result<Option<PathBuf>> {
    if path.exists() {
        return Ok(None);
    }
    save_settings(path, settings)?;
    info!(path = %path.display(), "settings written");
    Ok(Some(path.to_path_buf()))
}
