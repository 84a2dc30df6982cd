//! Backup export.
//!
//! Reads every collection plus the filtered key-value tree and assembles a
//! [`BackupDocument`]. Reads are always authoritative store reads.
//!
//! # Failure policy
//!
//! - Patients, and the first page of consultations, are required: failing
//!   to read them aborts the export.
//! - A failed consultation continuation page stops paging; pages already
//!   fetched are kept.
//! - Users, billing items and packages degrade to empty lists.
//! - A failed key-value read leaves `rtdb` out of the backup.
//!
//! Every degradation is logged and returned in [`ExportOutcome::warnings`].

use std::path::Path;
use std::thread;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, info_span, warn};

use crate::model::record::{from_document, payload, with_string_id};
use crate::model::{
    clinic_billing_collection, default_billing_records, filter_kv, record_id, BackupDocument,
    CollectionName, Record, GLOBAL_BILLING_COLLECTION,
};
use crate::store::{wait_until_ready, RemoteStore, StoreResult, WriteBatch};
use crate::sync::file::{write_backup, WrittenBackup};
use crate::sync::types::{
    ExportOptions, ExportOutcome, ExportStats, Progress, SyncError, SyncResult, EXPORT_STEPS,
};

/// Exporter for clinic backups.
///
/// Holds the store mutably because an empty billing collection is seeded with
/// the default catalog before it is read, unless `seed_billing` is off.
pub struct Exporter<'a, S: RemoteStore + ?Sized> {
    store: &'a mut S,
    options: ExportOptions<'a>,
}

impl<'a, S: RemoteStore + ?Sized> Exporter<'a, S> {
    /// Create an exporter with default options.
    #[must_use]
    pub fn new(store: &'a mut S) -> Self {
        Self::with_options(store, ExportOptions::default())
    }

    /// Create an exporter with explicit options.
    #[must_use]
    pub fn with_options(store: &'a mut S, options: ExportOptions<'a>) -> Self {
        Self { store, options }
    }

    /// Read everything and assemble a backup.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Fetch`] if patients or the first consultation
    /// page cannot be read.
    pub fn export(&mut self) -> SyncResult<ExportOutcome> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("export", run_id = %run_id);
        let _guard = span.enter();

        wait_until_ready(&*self.store, self.options.readiness);

        let mut progress = Progress::new(self.options.on_progress.take(), EXPORT_STEPS);
        let mut stats = ExportStats::default();
        let mut warnings = Vec::new();
        let mut document = BackupDocument::default();

        document.patients = self
            .read_all(CollectionName::Patients.as_str())
            .map_err(|source| SyncError::Fetch {
                collection: CollectionName::Patients.to_string(),
                source,
            })?;
        stats.patients = document.patients.len();
        info!(collection = "patients", count = stats.patients, "exported");
        progress.step();

        let (consultations, pages) = self.read_consultations(&mut warnings)?;
        document.consultations = consultations;
        stats.consultations = document.consultations.len();
        stats.consultation_pages = pages;
        info!(collection = "consultations", count = stats.consultations, pages, "exported");
        progress.step();

        document.users = self.read_optional(CollectionName::Users.as_str(), &mut warnings);
        stats.users = document.users.len();
        info!(collection = "users", count = stats.users, "exported");
        progress.step();

        document.billing_items = match self.read_billing_items(&mut stats) {
            Ok(items) => items,
            Err(e) => {
                degrade(&mut warnings, CollectionName::BillingItems.as_str(), &e);
                Vec::new()
            }
        };
        stats.billing_items = document.billing_items.len();
        info!(collection = "billingItems", count = stats.billing_items, "exported");
        progress.step();

        document.patient_packages =
            self.read_optional(CollectionName::PatientPackages.as_str(), &mut warnings);
        stats.patient_packages = document.patient_packages.len();
        info!(collection = "patientPackages", count = stats.patient_packages, "exported");
        progress.step();

        document.rtdb = match self.store.kv_read_all() {
            Ok(Some(Value::Object(tree))) => Some(filter_kv(tree)),
            Ok(_) => Some(serde_json::Map::new()),
            Err(e) => {
                let message = format!("key-value read failed, backup has no rtdb section: {e}");
                warn!("{message}");
                warnings.push(message);
                None
            }
        };
        stats.kv_keys = document.rtdb.as_ref().map_or(0, serde_json::Map::len);
        progress.step();

        info!(total = stats.total(), warnings = warnings.len(), "export complete");

        Ok(ExportOutcome {
            run_id,
            document,
            stats,
            warnings,
        })
    }

    /// Export and write the backup into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the export fails or the file cannot be written.
    pub fn export_to_dir(&mut self, dir: &Path) -> SyncResult<(ExportOutcome, WrittenBackup)> {
        let outcome = self.export()?;
        let written = write_backup(dir, &outcome.document, Utc::now())?;
        info!(path = %written.path.display(), bytes = written.bytes, "backup written");
        Ok((outcome, written))
    }

    fn read_all(&self, collection: &str) -> StoreResult<Vec<Record>> {
        Ok(self
            .store
            .list_all(collection)?
            .into_iter()
            .map(from_document)
            .collect())
    }

    fn read_optional(&self, collection: &str, warnings: &mut Vec<String>) -> Vec<Record> {
        self.read_all(collection).unwrap_or_else(|e| {
            degrade(warnings, collection, &e);
            Vec::new()
        })
    }

    /// Page through consultations, appending every page.
    fn read_consultations(&self, warnings: &mut Vec<String>) -> SyncResult<(Vec<Record>, usize)> {
        let collection = CollectionName::Consultations.as_str();
        let page_size = self.options.consultation_page_size.max(1);

        let first = self
            .store
            .list_page(collection, page_size, None)
            .map_err(|source| SyncError::Fetch {
                collection: collection.to_string(),
                source,
            })?;

        let mut pages = 1;
        let mut cursor = first.next_cursor.clone();
        let mut records: Vec<Record> = first.documents.into_iter().map(from_document).collect();

        while let Some(after) = cursor.take() {
            if !self.options.page_delay.is_zero() {
                thread::sleep(self.options.page_delay);
            }
            match self.store.list_page(collection, page_size, Some(&after)) {
                Ok(page) => {
                    pages += 1;
                    cursor = page.next_cursor.clone();
                    records.extend(page.documents.into_iter().map(from_document));
                }
                Err(e) => {
                    let message = format!(
                        "consultation paging stopped after {pages} page(s), exporting {} record(s): {e}",
                        records.len()
                    );
                    warn!("{message}");
                    warnings.push(message);
                }
            }
        }

        Ok((records, pages))
    }

    /// Read billing items, seeding the default catalog into an empty store.
    fn read_billing_items(&mut self, stats: &mut ExportStats) -> StoreResult<Vec<Record>> {
        let Some(clinic_id) = self.options.clinic_id.clone() else {
            let collection = CollectionName::BillingItems.as_str();
            if self.store.list_ids(collection)?.is_empty() {
                if let Some(preview) = self.seed_billing(collection, stats)? {
                    return Ok(preview);
                }
            }
            return self.read_all(collection);
        };

        let clinic_collection = clinic_billing_collection(&clinic_id);
        if self.store.list_ids(&clinic_collection)?.is_empty()
            && self.store.list_ids(GLOBAL_BILLING_COLLECTION)?.is_empty()
        {
            if let Some(preview) = self.seed_billing(&clinic_collection, stats)? {
                return Ok(preview);
            }
        }

        let mut items = self.read_all(&clinic_collection)?;
        items.extend(self.read_all(GLOBAL_BILLING_COLLECTION)?.into_iter().map(|mut item| {
            item.entry("shared").or_insert(Value::Bool(true));
            item
        }));
        Ok(items)
    }

    /// Seed the default catalog into `collection`.
    ///
    /// With seeding off, nothing is written and the catalog is returned as it
    /// would have been exported.
    fn seed_billing(
        &mut self,
        collection: &str,
        stats: &mut ExportStats,
    ) -> StoreResult<Option<Vec<Record>>> {
        let records = default_billing_records(Utc::now());

        if !self.options.seed_billing {
            info!(collection, items = records.len(), "billing collection empty, seeding skipped");
            stats.billing_seed_pending = true;
            return Ok(Some(records.iter().map(with_string_id).collect()));
        }

        let mut batch = WriteBatch::new();
        for record in &records {
            if let Some(id) = record_id(record) {
                batch.set(id, payload(record));
            }
        }
        info!(collection, items = batch.len(), "seeding default billing items");
        self.store.commit(collection, batch)?;
        stats.seeded_billing = true;
        Ok(None)
    }
}

fn degrade(warnings: &mut Vec<String>, collection: &str, error: &dyn std::fmt::Display) {
    let message = format!("failed to read {collection}, exporting it empty: {error}");
    warn!("{message}");
    warnings.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::cell::RefCell;

    fn fast<'a>() -> ExportOptions<'a> {
        ExportOptions {
            readiness: crate::store::ReadinessPolicy {
                attempts: 1,
                interval: std::time::Duration::ZERO,
            },
            ..ExportOptions::default()
        }
    }

    fn seeded_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert("patients", "p1", json!({"name": "A"}));
        store.insert("users", "u1", json!({"name": "Dr", "personalSettings": {"x": 1}}));
        store.insert("billingItems", "4001", json!({"price": 150}));
        store.insert("patientPackages", "k1", json!({"patientId": "p1"}));
        store.set_kv_tree(json!({
            "herbInventory": {"h1": 3},
            "appointments": {"a1": {}},
            "onlineConsultations": {}
        }));
        store
    }

    #[test]
    fn test_export_collects_everything() {
        let mut store = seeded_store();
        let outcome = Exporter::with_options(&mut store, fast()).export().unwrap();
        let doc = outcome.document;

        assert_eq!(doc.patients[0]["id"], "p1");
        assert_eq!(doc.users[0]["personalSettings"]["x"], 1);
        assert_eq!(doc.billing_items.len(), 1);
        assert_eq!(doc.patient_packages.len(), 1);

        let rtdb = doc.rtdb.unwrap();
        assert!(rtdb.contains_key("herbInventory"));
        assert!(!rtdb.contains_key("appointments"));
        assert!(!rtdb.contains_key("onlineConsultations"));
        assert!(outcome.warnings.is_empty());
        assert!(!outcome.stats.seeded_billing);
    }

    #[test]
    fn test_export_appends_all_consultation_pages() {
        let mut store = MemoryStore::new();
        for i in 0..7 {
            store.insert("consultations", &format!("c{i}"), json!({"n": i}));
        }
        let options = ExportOptions {
            consultation_page_size: 3,
            ..fast()
        };

        let outcome = Exporter::with_options(&mut store, options).export().unwrap();
        assert_eq!(outcome.document.consultations.len(), 7);
        assert_eq!(outcome.stats.consultation_pages, 3);
    }

    #[test]
    fn test_export_keeps_pages_before_continuation_failure() {
        let mut store = MemoryStore::new();
        for i in 0..7 {
            store.insert("consultations", &format!("c{i}"), json!({}));
        }
        store.fail_pages_after("consultations", 2);
        let options = ExportOptions {
            consultation_page_size: 3,
            ..fast()
        };

        let outcome = Exporter::with_options(&mut store, options).export().unwrap();
        assert_eq!(outcome.document.consultations.len(), 6);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_export_fails_without_patients() {
        let mut store = seeded_store();
        store.fail_reads("patients");
        let result = Exporter::with_options(&mut store, fast()).export();
        assert!(matches!(result, Err(SyncError::Fetch { collection, .. }) if collection == "patients"));
    }

    #[test]
    fn test_export_degrades_optional_collections() {
        let mut store = seeded_store();
        store.fail_reads("users");
        store.fail_reads("patientPackages");
        store.fail_kv_reads();

        let outcome = Exporter::with_options(&mut store, fast()).export().unwrap();
        assert!(outcome.document.users.is_empty());
        assert!(outcome.document.patient_packages.is_empty());
        assert!(outcome.document.rtdb.is_none());
        assert_eq!(outcome.warnings.len(), 3);
    }

    #[test]
    fn test_export_seeds_default_billing() {
        let mut store = MemoryStore::new();
        let outcome = Exporter::with_options(&mut store, fast()).export().unwrap();

        assert!(outcome.stats.seeded_billing);
        assert_eq!(outcome.document.billing_items.len(), 7);
        assert_eq!(store.collection("billingItems").len(), 7);
    }

    #[test]
    fn test_export_without_seeding_leaves_store_untouched() {
        let mut store = MemoryStore::new();
        let options = ExportOptions {
            seed_billing: false,
            clinic_id: Some("c1".into()),
            ..fast()
        };

        let outcome = Exporter::with_options(&mut store, options).export().unwrap();

        assert!(!outcome.stats.seeded_billing);
        assert!(outcome.stats.billing_seed_pending);
        assert_eq!(outcome.document.billing_items.len(), 7);
        assert_eq!(outcome.document.billing_items[0]["id"], "4001");
        assert!(store.commits().is_empty());
        assert!(store.collection("clinics/c1/billingItems").is_empty());
    }

    #[test]
    fn test_export_clinic_scope_marks_global_items_shared() {
        let mut store = MemoryStore::new();
        store.insert("clinics/c1/billingItems", "b1", json!({"price": 1}));
        store.insert("globalBillingItems", "g1", json!({"price": 2}));
        store.insert("globalBillingItems", "g2", json!({"price": 3, "shared": false}));
        let options = ExportOptions {
            clinic_id: Some("c1".into()),
            ..fast()
        };

        let outcome = Exporter::with_options(&mut store, options).export().unwrap();
        let items = outcome.document.billing_items;
        assert_eq!(items.len(), 3);
        assert!(items[0].get("shared").is_none());
        assert_eq!(items[1]["shared"], true);
        assert_eq!(items[2]["shared"], false);
    }

    #[test]
    fn test_export_reports_six_steps() {
        let calls = RefCell::new(Vec::new());
        let mut store = seeded_store();
        let options = fast().with_progress(|d: usize, t: usize| calls.borrow_mut().push((d, t)));

        Exporter::with_options(&mut store, options).export().unwrap();
        assert_eq!(
            *calls.borrow(),
            vec![(1, 6), (2, 6), (3, 6), (4, 6), (5, 6), (6, 6)]
        );
    }
}
