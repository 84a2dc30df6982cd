//! Collection reconciliation.
//!
//! [`replace_collection`] makes a collection hold exactly the records of a
//! backup: documents missing from the backup are deleted, every backup record
//! is written in full. Writes go through one running [`WriteBatch`] that is
//! committed each time it reaches [`crate::store::MAX_BATCH_OPS`] and once more at the end,
//! so no commit ever carries more than the store's per-request ceiling.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::model::record::{payload, record_id};
use crate::model::Record;
use crate::store::{RemoteStore, WriteBatch};
use crate::sync::hash::{content_hash, has_changed};
use crate::sync::types::{CollectionPlan, ReconcileStats, SyncResult};

/// Accumulates writes for one collection and flushes them at the ceiling.
struct BatchWriter<'s, S: RemoteStore + ?Sized> {
    store: &'s mut S,
    collection: &'s str,
    batch: WriteBatch,
    stats: ReconcileStats,
}

impl<'s, S: RemoteStore + ?Sized> BatchWriter<'s, S> {
    fn new(store: &'s mut S, collection: &'s str) -> Self {
        Self {
            store,
            collection,
            batch: WriteBatch::new(),
            stats: ReconcileStats::default(),
        }
    }

    fn delete(&mut self, id: String) -> SyncResult<()> {
        self.batch.delete(id);
        self.stats.deleted += 1;
        self.flush_if_full()
    }

    fn set(&mut self, id: String, record: &Record) -> SyncResult<()> {
        self.batch.set(id, payload(record));
        self.stats.upserted += 1;
        self.flush_if_full()
    }

    fn flush_if_full(&mut self) -> SyncResult<()> {
        if self.batch.is_full() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> SyncResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        debug!(collection = self.collection, ops = batch.len(), "committing batch");
        self.store.commit(self.collection, batch)?;
        self.stats.batches += 1;
        Ok(())
    }

    fn finish(mut self) -> SyncResult<ReconcileStats> {
        self.flush()?;
        Ok(self.stats)
    }
}

/// Replace the contents of `collection` with `items`.
///
/// Existing ids are read first. Ids absent from `items` are deleted, then
/// every item with a usable id is written (id stripped from the payload).
/// Items without an id are skipped. If `items` repeats an id, the later
/// record wins.
///
/// Batches already committed stay committed when a later one fails.
///
/// # Errors
///
/// Returns an error if the existing ids cannot be read or a batch commit fails.
pub fn replace_collection<S: RemoteStore + ?Sized>(
    store: &mut S,
    collection: &str,
    items: &[Record],
) -> SyncResult<ReconcileStats> {
    let existing = store.list_ids(collection)?;

    let mut skipped = 0;
    let mut upserts = Vec::with_capacity(items.len());
    for item in items {
        match record_id(item) {
            Some(id) => upserts.push((id, item)),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(collection, skipped, "skipping records without an id");
    }

    let incoming: HashSet<&str> = upserts.iter().map(|(id, _)| id.as_str()).collect();
    let to_delete: Vec<String> = existing
        .into_iter()
        .filter(|id| !incoming.contains(id.as_str()))
        .collect();

    let mut writer = BatchWriter::new(store, collection);
    for id in to_delete {
        writer.delete(id)?;
    }
    for (id, item) in upserts {
        writer.set(id, item)?;
    }

    let mut stats = writer.finish()?;
    stats.skipped = skipped;
    Ok(stats)
}

/// Work out what [`replace_collection`] would do, without writing.
///
/// Existing documents are compared with incoming records by content hash.
///
/// # Errors
///
/// Returns an error if the collection cannot be read.
pub fn plan_collection<S: RemoteStore + ?Sized>(
    store: &S,
    collection: &str,
    items: &[Record],
) -> SyncResult<CollectionPlan> {
    let existing: BTreeMap<String, String> = store
        .list_all(collection)?
        .into_iter()
        .map(|doc| (doc.id, content_hash(&doc.fields)))
        .collect();

    let mut plan = CollectionPlan {
        collection: collection.to_string(),
        ..CollectionPlan::default()
    };

    let mut incoming: BTreeMap<String, String> = BTreeMap::new();
    for item in items {
        match record_id(item) {
            Some(id) => {
                incoming.insert(id, content_hash(&payload(item)));
            }
            None => plan.skipped += 1,
        }
    }

    for (id, hash) in &incoming {
        match existing.get(id) {
            None => plan.to_create += 1,
            Some(stored) if has_changed(hash, Some(stored)) => plan.to_update += 1,
            Some(_) => plan.unchanged += 1,
        }
    }
    plan.to_delete = existing.keys().filter(|id| !incoming.contains_key(*id)).count();

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{json, Value};

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_replace_deletes_missing_and_writes_all() {
        let mut store = MemoryStore::new();
        store.insert("patients", "1", json!({"name": "OLD"}));
        store.insert("patients", "2", json!({"name": "B"}));
        store.insert("patients", "3", json!({"name": "C"}));

        let items = records(json!([{"id": 1, "name": "A"}, {"id": "4", "name": "D"}]));
        let stats = replace_collection(&mut store, "patients", &items).unwrap();

        assert_eq!(stats.deleted, 2);
        assert_eq!(stats.upserted, 2);
        assert_eq!(stats.batches, 1);

        let docs = store.collection("patients");
        assert_eq!(docs.keys().collect::<Vec<_>>(), ["1", "4"]);
        assert_eq!(docs["1"], json!({"name": "A"}).as_object().cloned().unwrap());
    }

    #[test]
    fn test_replace_with_empty_clears_collection() {
        let mut store = MemoryStore::new();
        store.insert("users", "u1", json!({}));

        let stats = replace_collection(&mut store, "users", &[]).unwrap();
        assert_eq!(stats.deleted, 1);
        assert!(store.collection("users").is_empty());
    }

    #[test]
    fn test_replace_empty_to_empty_commits_nothing() {
        let mut store = MemoryStore::new();
        let stats = replace_collection(&mut store, "users", &[]).unwrap();
        assert_eq!(stats, ReconcileStats::default());
        assert!(store.commits().is_empty());
    }

    #[test]
    fn test_replace_skips_records_without_id() {
        let mut store = MemoryStore::new();
        let items = records(json!([{"name": "no id"}, {"id": null}, {"id": "ok"}]));

        let stats = replace_collection(&mut store, "patients", &items).unwrap();
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.upserted, 1);
        assert_eq!(store.collection("patients").len(), 1);
    }

    #[test]
    fn test_replace_splits_batches_at_ceiling() {
        let mut store = MemoryStore::new();
        for i in 0..700 {
            store.insert("consultations", &format!("old{i:04}"), json!({}));
        }
        let items: Vec<Record> = (0..300)
            .map(|i| json!({"id": format!("new{i:04}")}).as_object().cloned().unwrap())
            .collect();

        let stats = replace_collection(&mut store, "consultations", &items).unwrap();
        assert_eq!(stats.batches, 2);
        let sizes: Vec<usize> = store.commits().iter().map(|c| c.total()).collect();
        assert_eq!(sizes, vec![500, 500]);
        assert_eq!(store.commits()[1].deletes, 200);
        assert_eq!(store.commits()[1].sets, 300);
    }

    #[test]
    fn test_duplicate_ids_later_wins() {
        let mut store = MemoryStore::new();
        let items = records(json!([{"id": "1", "v": 1}, {"id": "1", "v": 2}]));

        replace_collection(&mut store, "patients", &items).unwrap();
        assert_eq!(store.collection("patients")["1"]["v"], 2);
    }

    #[test]
    fn test_failed_commit_is_reported() {
        let mut store = MemoryStore::new();
        store.fail_writes("users");
        let items = records(json!([{"id": "u1"}]));
        assert!(replace_collection(&mut store, "users", &items).is_err());
    }

    #[test]
    fn test_plan_counts_changes() {
        let mut store = MemoryStore::new();
        store.insert("patients", "1", json!({"name": "A"}));
        store.insert("patients", "2", json!({"name": "B"}));
        store.insert("patients", "3", json!({"name": "C"}));

        let items = records(json!([
            {"id": "1", "name": "A"},
            {"id": "2", "name": "B2"},
            {"id": "9", "name": "Z"},
            {"name": "no id"}
        ]));
        let plan = plan_collection(&store, "patients", &items).unwrap();

        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.to_update, 1);
        assert_eq!(plan.to_create, 1);
        assert_eq!(plan.to_delete, 1);
        assert_eq!(plan.skipped, 1);
        assert!(plan.has_changes());
        assert!(store.commits().is_empty());
    }
}
