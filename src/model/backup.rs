//! The backup document and its collections.
//!
//! A backup is one JSON object holding the full contents of every named
//! collection plus an optional filtered snapshot of the key-value tree:
//!
//! ```json
//! {
//!   "patients": [{"id": "1", "name": "..."}],
//!   "consultations": [],
//!   "users": [],
//!   "billingItems": [],
//!   "patientPackages": [],
//!   "rtdb": {"herbInventory": {}}
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::record::Record;

/// Key-value keys that hold live, time-sensitive state.
///
/// They are never captured by an export and never overwritten by a restore.
pub const KV_DENYLIST: [&str; 4] = [
    "appointments",
    "consultations",
    "consultation",
    "onlineConsultations",
];

/// Key-value keys that live under `clinics/<id>/` when a clinic is selected.
pub const CLINIC_SCOPED_KEYS: [&str; 3] = ["herbInventory", "herbInventorySlice", "scheduleShifts"];

/// Key-value key holding the herb inventory.
pub const INVENTORY_KEY: &str = "herbInventory";

/// Collection of billing items shared by every clinic.
pub const GLOBAL_BILLING_COLLECTION: &str = "globalBillingItems";

/// First non-empty `/` segment of a key-value key.
///
/// Stores treat `"/appointments"`, `"appointments/"` and `"appointments/x"`
/// as paths under `appointments`, so that is the key they touch.
#[must_use]
pub fn top_level_key(key: &str) -> &str {
    key.split('/').find(|segment| !segment.is_empty()).unwrap_or("")
}

/// Whether a key-value key is excluded from backups.
///
/// Path-form keys are judged by their top-level segment.
#[must_use]
pub fn is_denylisted(key: &str) -> bool {
    KV_DENYLIST.contains(&top_level_key(key))
}

/// Drop every denylisted key from a key-value snapshot.
#[must_use]
pub fn filter_kv(snapshot: Map<String, Value>) -> Map<String, Value> {
    snapshot
        .into_iter()
        .filter(|(key, _)| !is_denylisted(key))
        .collect()
}

/// Collection holding one clinic's own billing items.
#[must_use]
pub fn clinic_billing_collection(clinic_id: &str) -> String {
    format!("clinics/{clinic_id}/billingItems")
}

/// Key-value path a restored key is written to.
///
/// Clinic-scoped keys move under `clinics/<id>/` when a clinic is selected.
#[must_use]
pub fn kv_restore_path(key: &str, clinic_id: Option<&str>) -> String {
    match clinic_id {
        Some(clinic) if CLINIC_SCOPED_KEYS.contains(&top_level_key(key)) => {
            format!("clinics/{clinic}/{}", key.trim_start_matches('/'))
        }
        _ => key.to_string(),
    }
}

/// The named record collections, in restore order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionName {
    /// Patient records.
    Patients,
    /// Consultation (visit) records.
    Consultations,
    /// Staff user accounts, including nested personal settings.
    Users,
    /// Billable items and their prices.
    BillingItems,
    /// Prepaid treatment packages held by patients.
    PatientPackages,
}

impl CollectionName {
    /// Every collection, in the fixed restore order.
    pub const ALL: [Self; 5] = [
        Self::Patients,
        Self::Consultations,
        Self::Users,
        Self::BillingItems,
        Self::PatientPackages,
    ];

    /// The collection name used by the store and the backup file.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Patients => "patients",
            Self::Consultations => "consultations",
            Self::Users => "users",
            Self::BillingItems => "billingItems",
            Self::PatientPackages => "patientPackages",
        }
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CollectionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown collection: {s}"))
    }
}

/// A complete clinic backup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    /// All patients.
    #[serde(default, deserialize_with = "lenient_records")]
    pub patients: Vec<Record>,
    /// All consultations.
    #[serde(default, deserialize_with = "lenient_records")]
    pub consultations: Vec<Record>,
    /// All users.
    #[serde(default, deserialize_with = "lenient_records")]
    pub users: Vec<Record>,
    /// All billing items.
    #[serde(default, deserialize_with = "lenient_records")]
    pub billing_items: Vec<Record>,
    /// All patient packages.
    #[serde(default, deserialize_with = "lenient_records")]
    pub patient_packages: Vec<Record>,
    /// Filtered key-value snapshot, when one was captured.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_kv"
    )]
    pub rtdb: Option<Map<String, Value>>,
}

impl BackupDocument {
    /// Parse a backup from JSON text.
    ///
    /// The top level must be an object. Collection fields that are missing or
    /// not arrays become empty; array entries that are not objects are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON or the top level is not an object.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom(
                "backup must be a JSON object with collection arrays",
            ));
        }
        serde_json::from_value(value)
    }

    /// Pretty-printed JSON text of the backup.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Records of one collection.
    #[must_use]
    pub fn collection(&self, name: CollectionName) -> &[Record] {
        match name {
            CollectionName::Patients => &self.patients,
            CollectionName::Consultations => &self.consultations,
            CollectionName::Users => &self.users,
            CollectionName::BillingItems => &self.billing_items,
            CollectionName::PatientPackages => &self.patient_packages,
        }
    }

    /// Number of restore steps this backup needs: one per collection, plus
    /// one when a key-value snapshot is present.
    #[must_use]
    pub fn restore_steps(&self) -> usize {
        CollectionName::ALL.len() + usize::from(self.rtdb.is_some())
    }

    /// Total number of records across all collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        CollectionName::ALL
            .iter()
            .map(|c| self.collection(*c).len())
            .sum()
    }
}

fn lenient_records<'de, D>(deserializer: D) -> Result<Vec<Record>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_kv<'de, D>(deserializer: D) -> Result<Option<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => Some(map),
        _ => None,
    })
}
