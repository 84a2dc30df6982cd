//! Sync types for backup export/import.
//!
//! Options, per-run reports, dry-run plans and the error type shared by the
//! exporter and importer.

use std::time::Duration;

use serde::Serialize;

use crate::model::BackupDocument;
use crate::store::{ReadinessPolicy, StoreError};

/// Progress observer: called with `(completed_steps, total_steps)`.
pub type ProgressFn<'a> = Box<dyn FnMut(usize, usize) + 'a>;

/// Number of steps an export reports progress for.
pub const EXPORT_STEPS: usize = 6;

/// Tracks completed steps and forwards them to an optional observer.
///
/// Reported values never decrease and never exceed the total.
pub struct Progress<'a> {
    observer: Option<ProgressFn<'a>>,
    done: usize,
    total: usize,
    calls: usize,
}

impl<'a> Progress<'a> {
    /// Create a tracker for `total` steps.
    #[must_use]
    pub fn new(observer: Option<ProgressFn<'a>>, total: usize) -> Self {
        Self {
            observer,
            done: 0,
            total,
            calls: 0,
        }
    }

    /// Mark one more step complete and notify the observer.
    pub fn step(&mut self) {
        self.done = (self.done + 1).min(self.total);
        self.emit(self.done);
    }

    /// Issue a final `(total, total)` call if fewer than `total` calls were made.
    pub fn finish(&mut self) {
        if self.calls < self.total {
            self.done = self.total;
            self.emit(self.total);
        }
    }

    fn emit(&mut self, done: usize) {
        self.calls += 1;
        if let Some(observer) = self.observer.as_mut() {
            observer(done, self.total);
        }
    }
}

impl std::fmt::Debug for Progress<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("done", &self.done)
            .field("total", &self.total)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

/// Options for an export run.
pub struct ExportOptions<'a> {
    /// Progress observer, called once per step.
    pub on_progress: Option<ProgressFn<'a>>,
    /// Consultations fetched per page.
    pub consultation_page_size: usize,
    /// Pause between consultation page fetches.
    pub page_delay: Duration,
    /// Readiness polling schedule.
    pub readiness: ReadinessPolicy,
    /// Clinic whose billing items are exported.
    pub clinic_id: Option<String>,
    /// Write the default catalog into an empty billing collection. When off,
    /// the catalog is still exported but the store is left untouched.
    pub seed_billing: bool,
}

impl Default for ExportOptions<'_> {
    fn default() -> Self {
        Self {
            on_progress: None,
            consultation_page_size: 500,
            page_delay: Duration::ZERO,
            readiness: ReadinessPolicy::default(),
            clinic_id: None,
            seed_billing: true,
        }
    }
}

impl<'a> ExportOptions<'a> {
    /// Attach a progress observer.
    #[must_use]
    pub fn with_progress(mut self, observer: impl FnMut(usize, usize) + 'a) -> Self {
        self.on_progress = Some(Box::new(observer));
        self
    }
}

impl std::fmt::Debug for ExportOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportOptions")
            .field("consultation_page_size", &self.consultation_page_size)
            .field("page_delay", &self.page_delay)
            .field("clinic_id", &self.clinic_id)
            .field("seed_billing", &self.seed_billing)
            .finish_non_exhaustive()
    }
}

/// Options for an import run.
pub struct ImportOptions<'a> {
    /// Progress observer, called once per step.
    pub on_progress: Option<ProgressFn<'a>>,
    /// Override for the number of steps reported to the observer.
    pub total_steps: Option<usize>,
    /// Normalize consultation ids and dates before writing.
    pub normalize_consultations: bool,
    /// Clinic for scoped billing items and key-value keys.
    pub clinic_id: Option<String>,
    /// Readiness polling schedule.
    pub readiness: ReadinessPolicy,
}

impl Default for ImportOptions<'_> {
    fn default() -> Self {
        Self {
            on_progress: None,
            total_steps: None,
            normalize_consultations: false,
            clinic_id: None,
            readiness: ReadinessPolicy::default(),
        }
    }
}

impl<'a> ImportOptions<'a> {
    /// Attach a progress observer.
    #[must_use]
    pub fn with_progress(mut self, observer: impl FnMut(usize, usize) + 'a) -> Self {
        self.on_progress = Some(Box::new(observer));
        self
    }
}

impl std::fmt::Debug for ImportOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportOptions")
            .field("total_steps", &self.total_steps)
            .field("normalize_consultations", &self.normalize_consultations)
            .field("clinic_id", &self.clinic_id)
            .finish_non_exhaustive()
    }
}

/// Record counts for an export.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExportStats {
    pub patients: usize,
    pub consultations: usize,
    pub users: usize,
    pub billing_items: usize,
    pub patient_packages: usize,
    /// Consultation pages fetched.
    pub consultation_pages: usize,
    /// Key-value keys captured (after the denylist).
    pub kv_keys: usize,
    /// Whether the default billing catalog was seeded during the export.
    pub seeded_billing: bool,
    /// Whether the billing collection is empty and the exported items are
    /// the unwritten default catalog.
    pub billing_seed_pending: bool,
}

impl ExportStats {
    /// Total number of records exported.
    #[must_use]
    pub fn total(&self) -> usize {
        self.patients + self.consultations + self.users + self.billing_items + self.patient_packages
    }
}

/// Everything an export produced.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// Identifier of this run, also attached to its log span.
    pub run_id: String,
    /// The assembled backup.
    pub document: BackupDocument,
    /// Record counts.
    pub stats: ExportStats,
    /// Degradations that did not abort the export.
    pub warnings: Vec<String>,
}

/// Counts for one `replace_collection` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Documents removed because the backup no longer has them.
    pub deleted: usize,
    /// Documents written from the backup.
    pub upserted: usize,
    /// Records skipped for lack of a usable id.
    pub skipped: usize,
    /// Batches committed.
    pub batches: usize,
}

impl ReconcileStats {
    /// Fold another reconciliation's counts into this one.
    pub fn absorb(&mut self, other: Self) {
        self.deleted += other.deleted;
        self.upserted += other.upserted;
        self.skipped += other.skipped;
        self.batches += other.batches;
    }
}

/// Outcome of one restore step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// Collection name, or `rtdb` for the key-value step.
    pub step: String,
    #[serde(flatten)]
    pub stats: ReconcileStats,
    /// Failure message, when the step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    /// Whether the step completed without error.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Report for an import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Identifier of this run, also attached to its log span.
    pub run_id: String,
    /// One entry per step, in execution order.
    pub steps: Vec<StepOutcome>,
    /// Key-value paths written.
    pub kv_restored: Vec<String>,
    /// Key-value keys ignored because they are denylisted.
    pub kv_denylisted: Vec<String>,
    /// Whether the application cache was rebuilt.
    pub cache_rebuilt: bool,
    /// Local cache files written.
    pub persisted: Vec<String>,
}

impl ImportReport {
    /// Names of the steps that failed.
    #[must_use]
    pub fn failed_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| !s.succeeded())
            .map(|s| s.step.clone())
            .collect()
    }

    /// Total documents written across all collection steps.
    #[must_use]
    pub fn total_upserted(&self) -> usize {
        self.steps.iter().map(|s| s.stats.upserted).sum()
    }

    /// Total documents deleted across all collection steps.
    #[must_use]
    pub fn total_deleted(&self) -> usize {
        self.steps.iter().map(|s| s.stats.deleted).sum()
    }
}

/// What an import would do to one collection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionPlan {
    pub collection: String,
    pub to_delete: usize,
    pub to_create: usize,
    pub to_update: usize,
    pub unchanged: usize,
    /// Records without a usable id.
    pub skipped: usize,
}

impl CollectionPlan {
    /// Whether applying the plan would change anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.to_delete + self.to_create + self.to_update > 0
    }
}

/// Dry-run result for a whole backup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportPlan {
    pub collections: Vec<CollectionPlan>,
    /// Key-value paths that would be written.
    pub kv_paths: Vec<String>,
    /// Key-value keys that would be ignored.
    pub kv_denylisted: Vec<String>,
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backup could not be read or is not a backup document.
    #[error("Invalid backup: {0}")]
    Parse(String),

    /// A required collection could not be fetched during export.
    #[error("Failed to fetch '{collection}': {source}")]
    Fetch {
        /// Collection being read.
        collection: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// The user declined the restore.
    #[error("Restore cancelled")]
    Cancelled,

    /// Some restore steps failed; the rest were applied.
    #[error("Restore incomplete, failed steps: {}", failed.join(", "))]
    PartialRestore {
        /// Names of the failed steps.
        failed: Vec<String>,
        /// Full report of the run.
        report: Box<ImportReport>,
    },
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
