//! Store and backup summaries.
//!
//! `status` describes what the store holds right now; `inspect` describes
//! what a backup file would restore. Both have a plain data form (serialized
//! for `--json`) and a colored human rendering.

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

use crate::model::{
    clinic_billing_collection, is_denylisted, record_id, BackupDocument, CollectionName,
    GLOBAL_BILLING_COLLECTION,
};
use crate::store::RemoteStore;
use crate::sync::hash::bytes_hash;
use crate::sync::types::SyncResult;

/// Number of documents in one collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionCount {
    pub name: String,
    pub count: usize,
}

/// What the store currently holds.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub ready: bool,
    pub collections: Vec<CollectionCount>,
    /// Top-level key-value keys, denylisted ones included.
    pub kv_keys: Vec<String>,
}

impl StoreStatus {
    /// Total documents across the listed collections.
    #[must_use]
    pub fn total(&self) -> usize {
        self.collections.iter().map(|c| c.count).sum()
    }
}

/// Count documents per collection and list key-value keys.
///
/// With a clinic id, billing items are counted in the clinic and shared
/// collections instead of the plain one.
///
/// # Errors
///
/// Returns an error if a collection or the key-value tree cannot be read.
pub fn get_store_status<S: RemoteStore + ?Sized>(
    store: &S,
    clinic_id: Option<&str>,
) -> SyncResult<StoreStatus> {
    let mut names: Vec<String> = Vec::new();
    for name in CollectionName::ALL {
        match (name, clinic_id) {
            (CollectionName::BillingItems, Some(clinic)) => {
                names.push(clinic_billing_collection(clinic));
                names.push(GLOBAL_BILLING_COLLECTION.to_string());
            }
            _ => names.push(name.to_string()),
        }
    }

    let mut collections = Vec::with_capacity(names.len());
    for name in names {
        let count = store.list_ids(&name)?.len();
        collections.push(CollectionCount { name, count });
    }

    let kv_keys = match store.kv_read_all()? {
        Some(Value::Object(tree)) => tree.keys().cloned().collect(),
        _ => Vec::new(),
    };

    Ok(StoreStatus {
        ready: store.is_ready(),
        collections,
        kv_keys,
    })
}

/// Print store status to stdout in a human-readable format.
pub fn print_status(status: &StoreStatus, location: &str) {
    println!("{}", "Store Status".bold().underline());
    println!();
    println!("  Location: {location}");
    if status.ready {
        println!("  Ready:    {}", "yes".green());
    } else {
        println!("  Ready:    {}", "no".yellow());
    }
    println!();

    println!("{}", "Collections:".blue().bold());
    for collection in &status.collections {
        println!("  {:<28} {}", collection.name, collection.count);
    }
    println!("  {:<28} {}", "Total".bold(), status.total());
    println!();

    if status.kv_keys.is_empty() {
        println!("{}", "Key-value store is empty.".dimmed());
        return;
    }
    println!("{}", "Key-value keys:".blue().bold());
    for key in &status.kv_keys {
        if is_denylisted(key) {
            println!("  {key} {}", "(live, never backed up)".dimmed());
        } else {
            println!("  {key}");
        }
    }
}

/// What a backup file contains.
#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    pub collections: Vec<CollectionCount>,
    /// Records that would be skipped for lack of an id.
    pub missing_ids: usize,
    pub has_kv: bool,
    pub kv_keys: Vec<String>,
    /// Denylisted keys present in the file; a restore ignores them.
    pub kv_denylisted: Vec<String>,
    pub restore_steps: usize,
    pub size: u64,
    pub checksum: String,
}

/// Summarize a parsed backup and the raw text it came from.
#[must_use]
pub fn summarize_backup(document: &BackupDocument, text: &str) -> BackupSummary {
    let collections = CollectionName::ALL
        .iter()
        .map(|name| CollectionCount {
            name: name.to_string(),
            count: document.collection(*name).len(),
        })
        .collect();

    let missing_ids = CollectionName::ALL
        .iter()
        .flat_map(|name| document.collection(*name))
        .filter(|record| record_id(record).is_none())
        .count();

    let (kv_denylisted, kv_keys): (Vec<String>, Vec<String>) = document
        .rtdb
        .iter()
        .flat_map(|tree| tree.keys().cloned())
        .partition(|key| is_denylisted(key));

    BackupSummary {
        collections,
        missing_ids,
        has_kv: document.rtdb.is_some(),
        kv_keys,
        kv_denylisted,
        restore_steps: document.restore_steps(),
        size: text.len() as u64,
        checksum: bytes_hash(text.as_bytes()),
    }
}

/// Print a backup summary to stdout in a human-readable format.
pub fn print_summary(summary: &BackupSummary, location: &str) {
    println!("{}", "Backup".bold().underline());
    println!();
    println!("  File:     {location}");
    println!("  Size:     {}", format_size(summary.size));
    println!("  SHA256:   {}", summary.checksum.dimmed());
    println!("  Steps:    {}", summary.restore_steps);
    println!();

    println!("{}", "Collections:".blue().bold());
    for collection in &summary.collections {
        println!("  {:<18} {}", collection.name, collection.count);
    }
    if summary.missing_ids > 0 {
        println!(
            "  {}",
            format!("{} record(s) without an id will be skipped", summary.missing_ids).yellow()
        );
    }
    println!();

    if !summary.has_kv {
        println!("{}", "No key-value snapshot.".dimmed());
        return;
    }
    println!("{}", "Key-value keys:".blue().bold());
    for key in &summary.kv_keys {
        println!("  {key}");
    }
    for key in &summary.kv_denylisted {
        println!("  {} {}", key.yellow(), "(denylisted, ignored on restore)".dimmed());
    }
}

/// Format a byte size as a human-readable string.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
