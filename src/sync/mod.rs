//! Backup export and restore.
//!
//! - **Export**: every collection plus the filtered key-value tree → one
//!   JSON backup file
//! - **Import**: backup → store, by full reconciliation of each collection
//! - **Reconcile**: the diff-and-batch primitive behind every import step
//! - **Normalize**: optional consultation cleanup for older backups
//! - **Hashing**: SHA256 for dry-run change detection and file checksums
//! - **Status**: store and backup summaries
//!
//! # Restore order
//!
//! `patients → consultations → users → billingItems → patientPackages`, then
//! the key-value snapshot when the backup has one. Steps run one at a time;
//! each reports progress once it finishes, whether or not it succeeded.
//!
//! # Example
//!
//! ```ignore
//! use clinic_backup::store::SqliteStore;
//! use clinic_backup::sync::{Exporter, Importer};
//!
//! let mut store = SqliteStore::open(path)?;
//! let (outcome, written) = Exporter::new(&mut store).export_to_dir(dir)?;
//!
//! let report = Importer::new(&mut store, &mut cache, &catalog).import(outcome.document)?;
//! ```

mod export;
mod file;
mod hash;
mod import;
pub mod normalize;
mod reconcile;
mod status;
mod types;

pub use export::Exporter;
pub use file::{
    atomic_write, backup_filename, file_checksum, file_size, parse_backup, read_backup,
    render_backup, write_backup, WrittenBackup, BACKUP_FILE_PREFIX,
};
pub use hash::{bytes_hash, content_hash, has_changed};
pub use import::{Importer, KV_STEP};
pub use reconcile::{plan_collection, replace_collection};
pub use status::{
    format_size, get_store_status, print_status, print_summary, summarize_backup, BackupSummary,
    CollectionCount, StoreStatus,
};
pub use types::{
    CollectionPlan, ExportOptions, ExportOutcome, ExportStats, ImportOptions, ImportPlan,
    ImportReport, Progress, ProgressFn, ReconcileStats, StepOutcome, SyncError, SyncResult,
    EXPORT_STEPS,
};
