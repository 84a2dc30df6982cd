//! In-memory application cache.
//!
//! Everything the clinic UI reads without going to the store: patient and
//! consultation lists, users, billing items, paginated patient views, usage
//! counts and the herb inventory. After a restore the cache is rebuilt from
//! the imported arrays alone, then a subset is persisted to the local cache
//! directory so the next start sees the restored data immediately.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::debug;

use crate::model::record::with_string_id;
use crate::model::{BackupDocument, Record};
use crate::store::{RemoteStore, StoreResult};
use crate::sync::normalize::{normalize_consultation, parse_backup_date};

/// Patients per page when no setting overrides it.
pub const DEFAULT_PATIENTS_PER_PAGE: usize = 10;

/// Clinic id used for cache file names when none is selected.
pub const DEFAULT_CLINIC_KEY: &str = "local-default";

/// Cached application state.
#[derive(Debug, Clone)]
pub struct ApplicationCache {
    /// Patients, newest first.
    pub patients: Vec<Record>,
    /// Consultations, normalized.
    pub consultations: Vec<Record>,
    /// Users with every field, including personal settings.
    pub users: Vec<Record>,
    /// Users without personal settings, for listings.
    pub user_list: Vec<Record>,
    pub billing_items: Vec<Record>,
    pub billing_loaded: bool,
    pub patient_count: usize,
    /// Patient pages keyed by 1-based page number. Page 1 always exists.
    pub patient_pages: BTreeMap<usize, Vec<Record>>,
    /// Consultations per patient id.
    pub usage_counts: BTreeMap<String, usize>,
    pub inventory: Value,
    pub inventory_initialized: bool,
    patients_per_page: usize,
}

impl Default for ApplicationCache {
    fn default() -> Self {
        Self::new(DEFAULT_PATIENTS_PER_PAGE)
    }
}

impl ApplicationCache {
    /// Create an empty cache paginating patients `patients_per_page` at a time.
    #[must_use]
    pub fn new(patients_per_page: usize) -> Self {
        Self {
            patients: Vec::new(),
            consultations: Vec::new(),
            users: Vec::new(),
            user_list: Vec::new(),
            billing_items: Vec::new(),
            billing_loaded: false,
            patient_count: 0,
            patient_pages: BTreeMap::from([(1, Vec::new())]),
            usage_counts: BTreeMap::new(),
            inventory: Value::Object(serde_json::Map::new()),
            inventory_initialized: false,
            patients_per_page: patients_per_page.max(1),
        }
    }

    /// Patients per page.
    #[must_use]
    pub fn patients_per_page(&self) -> usize {
        self.patients_per_page
    }

    /// Replace every cached collection with the contents of `document`.
    ///
    /// Nothing is read from the store. The inventory is left alone; it is
    /// reloaded separately after the key-value step.
    pub fn rebuild_from(&mut self, document: &BackupDocument) {
        let mut patients: Vec<Record> = document.patients.iter().map(with_string_id).collect();
        patients.sort_by_key(|p| std::cmp::Reverse(created_at_millis(p)));

        self.consultations = document
            .consultations
            .iter()
            .map(|c| {
                let mut clone = c.clone();
                normalize_consultation(&mut clone);
                clone
            })
            .collect();

        self.users = document.users.iter().map(with_string_id).collect();
        self.user_list = self
            .users
            .iter()
            .map(|u| {
                let mut trimmed = u.clone();
                trimmed.remove("personalSettings");
                trimmed
            })
            .collect();

        self.billing_items = document.billing_items.clone();
        self.billing_loaded = true;

        self.patient_count = patients.len();
        self.patients = patients;
        self.rebuild_pages();
        self.compute_usage_counts();

        debug!(
            patients = self.patient_count,
            consultations = self.consultations.len(),
            pages = self.patient_pages.len(),
            "application cache rebuilt"
        );
    }

    fn rebuild_pages(&mut self) {
        self.patient_pages = self
            .patients
            .chunks(self.patients_per_page)
            .enumerate()
            .map(|(i, chunk)| (i + 1, chunk.to_vec()))
            .collect();
        self.patient_pages.entry(1).or_default();
    }

    /// Recount consultations per patient.
    pub fn compute_usage_counts(&mut self) {
        self.usage_counts.clear();
        for consultation in &self.consultations {
            if let Some(patient_id) = consultation
                .get("patientId")
                .and_then(crate::model::record::id_string)
            {
                *self.usage_counts.entry(patient_id).or_default() += 1;
            }
        }
    }

    /// One page of patients, if it exists.
    #[must_use]
    pub fn page(&self, number: usize) -> Option<&[Record]> {
        self.patient_pages.get(&number).map(Vec::as_slice)
    }

    /// Consultations dated on `day` (UTC).
    #[must_use]
    pub fn consultations_on(&self, day: NaiveDate) -> Vec<&Record> {
        self.consultations
            .iter()
            .filter(|c| {
                c.get("date")
                    .and_then(parse_backup_date)
                    .is_some_and(|d| d.date_naive() == day)
            })
            .collect()
    }

    /// Reload the herb inventory from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails. The cache is unchanged then.
    pub fn reload_inventory<S: RemoteStore + ?Sized>(
        &mut self,
        store: &S,
        path: &str,
    ) -> StoreResult<()> {
        let value = store.kv_read(path)?;
        self.inventory = value.unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        self.inventory_initialized = true;
        Ok(())
    }

    /// Use `value` as the inventory without consulting the store.
    pub fn assign_inventory(&mut self, value: Value) {
        self.inventory = value;
        self.inventory_initialized = true;
    }

    /// Write `patients.json` and `billingItems_<clinic>.json` into `dir`.
    ///
    /// Returns the paths written.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or either file cannot be written.
    pub fn persist(&self, dir: &Path, clinic_id: Option<&str>) -> std::io::Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;

        let clinic = clinic_id
            .and_then(sanitize_key)
            .unwrap_or_else(|| DEFAULT_CLINIC_KEY.to_string());

        let patients_path = dir.join("patients.json");
        write_json(&patients_path, &self.patients)?;

        let billing_path = dir.join(format!("billingItems_{clinic}.json"));
        write_json(&billing_path, &self.billing_items)?;

        Ok(vec![patients_path, billing_path])
    }
}

/// Creation time of a record in epoch milliseconds, 0 when unknown.
fn created_at_millis(record: &Record) -> i64 {
    record
        .get("createdAt")
        .and_then(parse_backup_date)
        .as_ref()
        .map_or(0, DateTime::<Utc>::timestamp_millis)
}

fn write_json(path: &Path, records: &[Record]) -> std::io::Result<()> {
    let content = serde_json::to_string(records)?;
    let mut file = fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

/// Make a clinic id safe to embed in a file name.
fn sanitize_key(key: &str) -> Option<String> {
    let sanitized: String = key
        .trim()
        .chars()
        .map(|c| {
            if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_whitespace()
            {
                '_'
            } else {
                c
            }
        })
        .take(100)
        .collect();

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Views that display cached data and must be redrawn after a restore.
///
/// Every method defaults to a no-op so headless callers need not care.
pub trait ViewRefresher {
    /// Redraw the patient list.
    fn patient_list(&mut self, _cache: &ApplicationCache) {}

    /// Reload today's appointments.
    fn today_appointments(&mut self, _cache: &ApplicationCache) {}

    /// Recompute dashboard statistics.
    fn statistics(&mut self, _cache: &ApplicationCache) {}
}
