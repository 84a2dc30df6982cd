//! Backup restore.
//!
//! Restores a [`BackupDocument`] collection by collection in a fixed order,
//! then the key-value snapshot, then rebuilds the application cache from the
//! imported arrays.
//!
//! The restore is best-effort: a failed step is logged and recorded, and the
//! remaining steps still run. Nothing is rolled back. The caller learns about
//! failures through [`SyncError::PartialRestore`], which carries the full
//! report.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{error, info, info_span, warn};

use crate::app::{AppContext, Confirmer};
use crate::cache::{ApplicationCache, ViewRefresher};
use crate::i18n::{Message, Translator};
use crate::model::{
    clinic_billing_collection, is_denylisted, kv_restore_path, BackupDocument, CollectionName,
    Record, GLOBAL_BILLING_COLLECTION, INVENTORY_KEY,
};
use crate::store::{wait_until_ready, RemoteStore};
use crate::sync::file::read_backup;
use crate::sync::normalize::prepare_consultations;
use crate::sync::reconcile::{plan_collection, replace_collection};
use crate::sync::types::{
    ImportOptions, ImportPlan, ImportReport, Progress, ReconcileStats, StepOutcome, SyncError,
    SyncResult,
};

/// Name of the key-value restore step.
pub const KV_STEP: &str = "rtdb";

/// Importer for clinic backups.
pub struct Importer<'a, S: RemoteStore + ?Sized> {
    store: &'a mut S,
    cache: &'a mut ApplicationCache,
    translator: &'a dyn Translator,
    views: Option<&'a mut dyn ViewRefresher>,
    cache_dir: Option<PathBuf>,
    options: ImportOptions<'a>,
}

impl<'a, S: RemoteStore + ?Sized> Importer<'a, S> {
    /// Create an importer with default options.
    #[must_use]
    pub fn new(
        store: &'a mut S,
        cache: &'a mut ApplicationCache,
        translator: &'a dyn Translator,
    ) -> Self {
        Self {
            store,
            cache,
            translator,
            views: None,
            cache_dir: None,
            options: ImportOptions::default(),
        }
    }

    /// Set the import options.
    #[must_use]
    pub fn with_options(mut self, options: ImportOptions<'a>) -> Self {
        self.options = options;
        self
    }

    /// Refresh `views` after the cache is rebuilt.
    #[must_use]
    pub fn with_views(mut self, views: &'a mut dyn ViewRefresher) -> Self {
        self.views = Some(views);
        self
    }

    /// Persist cache files into `dir` after the restore.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Restore `document` into the store and rebuild the cache.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PartialRestore`] if any step failed. Every other
    /// step has still been applied.
    pub fn import(&mut self, mut document: BackupDocument) -> SyncResult<ImportReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("import", run_id = %run_id);
        let _guard = span.enter();

        wait_until_ready(&*self.store, self.options.readiness);

        let total = self
            .options
            .total_steps
            .unwrap_or_else(|| document.restore_steps());
        let mut progress = Progress::new(self.options.on_progress.take(), total);
        let mut report = ImportReport {
            run_id,
            ..ImportReport::default()
        };

        if self.options.normalize_consultations {
            let patients = document.patients.clone();
            prepare_consultations(&mut document.consultations, &patients);
        }

        for name in CollectionName::ALL {
            let items = document.collection(name);
            let result = match (name, self.options.clinic_id.clone()) {
                (CollectionName::BillingItems, Some(clinic_id)) => {
                    self.replace_clinic_billing(&clinic_id, items)
                }
                _ => replace_collection(&mut *self.store, name.as_str(), items),
            };
            report.steps.push(step_outcome(name.as_str(), result));
            progress.step();
        }

        if let Some(snapshot) = document.rtdb.as_ref() {
            let outcome = self.restore_kv(snapshot, &mut report);
            report.steps.push(outcome);
            progress.step();
        }

        self.refresh_cache(&document, &mut report);

        progress.finish();

        let failed = report.failed_steps();
        info!(
            upserted = report.total_upserted(),
            deleted = report.total_deleted(),
            failed = failed.len(),
            "import complete"
        );
        if failed.is_empty() {
            Ok(report)
        } else {
            Err(SyncError::PartialRestore {
                failed,
                report: Box::new(report),
            })
        }
    }

    /// Confirm, read and restore a backup file.
    ///
    /// The confirmer is asked before the file is read. Nothing is written
    /// unless the user agrees and the file parses.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if the user declines,
    /// [`SyncError::Parse`] if the file is unreadable, or any error of
    /// [`Importer::import`].
    pub fn import_file(
        &mut self,
        path: &Path,
        confirmer: &mut dyn Confirmer,
    ) -> SyncResult<ImportReport> {
        if !confirmer.confirm(&self.translator.text(Message::ConfirmRestore)) {
            info!("restore declined");
            return Err(SyncError::Cancelled);
        }

        let document = read_backup(path).inspect_err(|e| {
            error!(path = %path.display(), "{e}");
        })?;

        if self.options.total_steps.is_none() {
            self.options.total_steps = Some(document.restore_steps());
        }
        self.import(document)
    }

    /// Work out what a restore would change, without writing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if a collection cannot be read.
    pub fn plan(&self, document: &BackupDocument) -> SyncResult<ImportPlan> {
        let mut consultations = document.consultations.clone();
        if self.options.normalize_consultations {
            prepare_consultations(&mut consultations, &document.patients);
        }

        let mut plan = ImportPlan::default();
        for name in CollectionName::ALL {
            let items = if name == CollectionName::Consultations {
                consultations.as_slice()
            } else {
                document.collection(name)
            };
            match (name, self.options.clinic_id.as_deref()) {
                (CollectionName::BillingItems, Some(clinic_id)) => {
                    let (shared, own) = split_shared(items);
                    plan.collections.push(plan_collection(
                        &*self.store,
                        &clinic_billing_collection(clinic_id),
                        &own,
                    )?);
                    plan.collections.push(plan_collection(
                        &*self.store,
                        GLOBAL_BILLING_COLLECTION,
                        &shared,
                    )?);
                }
                _ => plan
                    .collections
                    .push(plan_collection(&*self.store, name.as_str(), items)?),
            }
        }

        if let Some(snapshot) = &document.rtdb {
            for key in snapshot.keys() {
                if is_denylisted(key) {
                    plan.kv_denylisted.push(key.clone());
                } else {
                    plan.kv_paths
                        .push(kv_restore_path(key, self.options.clinic_id.as_deref()));
                }
            }
        }

        Ok(plan)
    }

    /// Reconcile billing items into the clinic and shared collections.
    ///
    /// Items flagged `shared: true` go to the shared collection, the rest to
    /// the clinic's own. Both halves run even if the first fails.
    fn replace_clinic_billing(
        &mut self,
        clinic_id: &str,
        items: &[Record],
    ) -> SyncResult<ReconcileStats> {
        let (shared, own) = split_shared(items);

        let own_result = replace_collection(
            &mut *self.store,
            &clinic_billing_collection(clinic_id),
            &own,
        );
        let shared_result =
            replace_collection(&mut *self.store, GLOBAL_BILLING_COLLECTION, &shared);

        let mut stats = own_result?;
        stats.absorb(shared_result?);
        Ok(stats)
    }

    /// Write every allowed key-value entry, then reload the inventory.
    fn restore_kv(&mut self, snapshot: &Map<String, Value>, report: &mut ImportReport) -> StepOutcome {
        let clinic_id = self.options.clinic_id.clone();
        let mut failures = Vec::new();
        let mut restored = 0;

        for (key, value) in snapshot {
            if is_denylisted(key) {
                warn!(key, "ignoring denylisted key-value entry");
                report.kv_denylisted.push(key.clone());
                continue;
            }

            let path = kv_restore_path(key, clinic_id.as_deref());
            match self.store.kv_write(&path, value.clone()) {
                Ok(()) => {
                    restored += 1;
                    report.kv_restored.push(path);
                }
                Err(e) => {
                    error!(path, "failed to restore key-value entry: {e}");
                    failures.push(format!("{path}: {e}"));
                }
            }
        }

        if let Some(inventory) = snapshot.get(INVENTORY_KEY) {
            let path = kv_restore_path(INVENTORY_KEY, clinic_id.as_deref());
            if let Err(e) = self.cache.reload_inventory(&*self.store, &path) {
                warn!("inventory reload failed, using restored value: {e}");
                self.cache.assign_inventory(inventory.clone());
            }
        }

        info!(step = KV_STEP, restored, failed = failures.len(), "restored");
        StepOutcome {
            step: KV_STEP.to_string(),
            stats: ReconcileStats {
                upserted: restored,
                ..ReconcileStats::default()
            },
            error: (!failures.is_empty()).then(|| failures.join("; ")),
        }
    }

    /// Rebuild the cache from the imported arrays, persist it, redraw views.
    ///
    /// Failures here are logged and never fail the import.
    fn refresh_cache(&mut self, document: &BackupDocument, report: &mut ImportReport) {
        self.cache.rebuild_from(document);
        report.cache_rebuilt = true;

        if let Some(dir) = &self.cache_dir {
            match self.cache.persist(dir, self.options.clinic_id.as_deref()) {
                Ok(paths) => {
                    report.persisted = paths.iter().map(|p| p.display().to_string()).collect();
                }
                Err(e) => error!(dir = %dir.display(), "failed to persist cache: {e}"),
            }
        }

        if let Some(views) = self.views.as_deref_mut() {
            views.patient_list(&*self.cache);
            views.today_appointments(&*self.cache);
            views.statistics(&*self.cache);
        }
    }
}

impl<'a, S: RemoteStore> Importer<'a, S> {
    /// Create an importer over an application context, configured from its
    /// settings (clinic, readiness, cache directory).
    #[must_use]
    pub fn for_context(ctx: &'a mut AppContext<S>) -> Self {
        let options = ImportOptions {
            clinic_id: ctx.settings.clinic_id.clone(),
            readiness: ctx.settings.readiness(),
            ..ImportOptions::default()
        };
        let cache_dir = ctx.settings.resolved_cache_dir();

        let mut importer =
            Importer::new(&mut ctx.store, &mut ctx.cache, &*ctx.translator).with_options(options);
        importer.cache_dir = cache_dir;
        importer
    }

    /// Merge `options` into the context-derived ones.
    ///
    /// Fields left at their defaults in `options` keep the context values.
    #[must_use]
    pub fn configure(mut self, options: ImportOptions<'a>) -> Self {
        let ImportOptions {
            on_progress,
            total_steps,
            normalize_consultations,
            clinic_id,
            readiness: _,
        } = options;
        if on_progress.is_some() {
            self.options.on_progress = on_progress;
        }
        if total_steps.is_some() {
            self.options.total_steps = total_steps;
        }
        self.options.normalize_consultations |= normalize_consultations;
        if clinic_id.is_some() {
            self.options.clinic_id = clinic_id;
        }
        self
    }
}

/// Partition billing items into `(shared, clinic-owned)`.
fn split_shared(items: &[Record]) -> (Vec<Record>, Vec<Record>) {
    items
        .iter()
        .cloned()
        .partition(|item| item.get("shared") == Some(&Value::Bool(true)))
}

fn step_outcome(step: &str, result: SyncResult<ReconcileStats>) -> StepOutcome {
    match result {
        Ok(stats) => {
            info!(
                step,
                deleted = stats.deleted,
                upserted = stats.upserted,
                batches = stats.batches,
                "restored"
            );
            StepOutcome {
                step: step.to_string(),
                stats,
                error: None,
            }
        }
        Err(e) => {
            error!(step, "restore step failed: {e}");
            StepOutcome {
                step: step.to_string(),
                stats: ReconcileStats::default(),
                error: Some(e.to_string()),
            }
        }
    }
}
