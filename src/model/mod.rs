//! Data models for clinic backups.
//!
//! This module contains:
//! - Record (opaque JSON entity keyed by `id`)
//! - BackupDocument and the collection names
//! - The default billing catalog

pub mod backup;
pub mod billing;
pub mod record;

pub use backup::{
    clinic_billing_collection, filter_kv, is_denylisted, kv_restore_path, BackupDocument,
    CollectionName, CLINIC_SCOPED_KEYS, GLOBAL_BILLING_COLLECTION, INVENTORY_KEY, KV_DENYLIST,
};
pub use billing::{default_billing_records, BillingCategory, DEFAULT_BILLING_ITEMS};
pub use record::{record_id, Record};
