//! In-memory store implementation.
//!
//! Holds collections and the key-value tree in ordinary maps. Besides serving
//! as the fake for sync tests, it records every committed batch and can be
//! told to refuse specific reads or writes, which is how partial-failure
//! behavior is exercised.

use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use super::{
    path_segments, set_value_at, value_at, BatchOp, Document, DocumentPage, RemoteStore,
    StoreError, StoreResult, WriteBatch,
};

/// A committed batch, as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Target collection.
    pub collection: String,
    /// Number of delete operations.
    pub deletes: usize,
    /// Number of set operations.
    pub sets: usize,
}

impl CommitRecord {
    /// Total operations in the batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.deletes + self.sets
    }
}

/// Map-backed [`RemoteStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: BTreeMap<String, BTreeMap<String, Map<String, Value>>>,
    kv: Map<String, Value>,
    commits: Vec<CommitRecord>,
    kv_writes: Vec<String>,
    ready_after: Cell<u32>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
    failing_kv_paths: HashSet<String>,
    failing_kv_read: bool,
    page_failure: Option<(String, usize)>,
    pages_served: Cell<usize>,
}

impl MemoryStore {
    /// Create an empty store that is immediately ready.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report not-ready for the first `polls` readiness checks.
    #[must_use]
    pub fn with_ready_after(self, polls: u32) -> Self {
        self.ready_after.set(polls);
        self
    }

    /// Insert a document directly, bypassing batches and the commit log.
    pub fn insert(&mut self, collection: &str, id: &str, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    /// Replace the whole key-value tree.
    pub fn set_kv_tree(&mut self, tree: Value) {
        self.kv = match tree {
            Value::Object(map) => map,
            _ => Map::new(),
        };
    }

    /// Refuse every read of `collection`.
    pub fn fail_reads(&mut self, collection: &str) {
        self.failing_reads.insert(collection.to_string());
    }

    /// Refuse every batch committed to `collection`.
    pub fn fail_writes(&mut self, collection: &str) {
        self.failing_writes.insert(collection.to_string());
    }

    /// Refuse key-value writes to exactly `path`.
    pub fn fail_kv_write(&mut self, path: &str) {
        self.failing_kv_paths.insert(path.to_string());
    }

    /// Refuse every key-value read.
    pub fn fail_kv_reads(&mut self) {
        self.failing_kv_read = true;
    }

    /// Serve `pages` pages of `collection`, then refuse continuation requests.
    pub fn fail_pages_after(&mut self, collection: &str, pages: usize) {
        self.page_failure = Some((collection.to_string(), pages));
    }

    /// Every batch committed so far, in order.
    #[must_use]
    pub fn commits(&self) -> &[CommitRecord] {
        &self.commits
    }

    /// Every key-value path written so far, in order.
    #[must_use]
    pub fn kv_writes(&self) -> &[String] {
        &self.kv_writes
    }

    /// Snapshot of a collection as id → payload.
    #[must_use]
    pub fn collection(&self, collection: &str) -> BTreeMap<String, Map<String, Value>> {
        self.collections.get(collection).cloned().unwrap_or_default()
    }

    fn check_read(&self, collection: &str) -> StoreResult<()> {
        if self.failing_reads.contains(collection) {
            return Err(StoreError::Rejected {
                target: collection.to_string(),
                reason: "read refused".to_string(),
            });
        }
        Ok(())
    }

    fn documents(&self, collection: &str) -> impl Iterator<Item = Document> + '_ {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|docs| docs.iter())
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
    }
}

impl RemoteStore for MemoryStore {
    fn is_ready(&self) -> bool {
        let remaining = self.ready_after.get();
        if remaining == 0 {
            return true;
        }
        self.ready_after.set(remaining - 1);
        false
    }

    fn list_ids(&self, collection: &str) -> StoreResult<Vec<String>> {
        self.check_read(collection)?;
        Ok(self.documents(collection).map(|d| d.id).collect())
    }

    fn list_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.check_read(collection)?;
        Ok(self.documents(collection).collect())
    }

    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.check_read(collection)?;
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    fn list_page(
        &self,
        collection: &str,
        limit: usize,
        after: Option<&str>,
    ) -> StoreResult<DocumentPage> {
        self.check_read(collection)?;

        if let Some((failing, served)) = &self.page_failure {
            if failing == collection && after.is_some() && self.pages_served.get() >= *served {
                return Err(StoreError::Unavailable(format!(
                    "page continuation for '{collection}' refused"
                )));
            }
        }
        self.pages_served.set(self.pages_served.get() + 1);

        let limit = limit.max(1);
        let mut documents: Vec<Document> = self
            .documents(collection)
            .filter(|d| after.is_none_or(|cursor| d.id.as_str() > cursor))
            .take(limit + 1)
            .collect();

        let next_cursor = if documents.len() > limit {
            documents.truncate(limit);
            documents.last().map(|d| d.id.clone())
        } else {
            None
        };

        Ok(DocumentPage {
            documents,
            next_cursor,
        })
    }

    fn commit(&mut self, collection: &str, batch: WriteBatch) -> StoreResult<()> {
        batch.check_size()?;
        if self.failing_writes.contains(collection) {
            return Err(StoreError::Rejected {
                target: collection.to_string(),
                reason: "write refused".to_string(),
            });
        }

        let mut record = CommitRecord {
            collection: collection.to_string(),
            deletes: 0,
            sets: 0,
        };
        let docs = self.collections.entry(collection.to_string()).or_default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Delete { id } => {
                    docs.remove(&id);
                    record.deletes += 1;
                }
                BatchOp::Set { id, data } => {
                    docs.insert(id, data);
                    record.sets += 1;
                }
            }
        }
        self.commits.push(record);
        Ok(())
    }

    fn kv_read_all(&self) -> StoreResult<Option<Value>> {
        if self.failing_kv_read {
            return Err(StoreError::Unavailable("key-value read refused".to_string()));
        }
        if self.kv.is_empty() {
            return Ok(None);
        }
        Ok(Some(Value::Object(self.kv.clone())))
    }

    fn kv_read(&self, path: &str) -> StoreResult<Option<Value>> {
        let segments = path_segments(path)?;
        if self.failing_kv_read {
            return Err(StoreError::Unavailable("key-value read refused".to_string()));
        }
        let root = Value::Object(self.kv.clone());
        Ok(value_at(&root, &segments).cloned())
    }

    fn kv_write(&mut self, path: &str, value: Value) -> StoreResult<()> {
        let segments = path_segments(path)?;
        if self.failing_kv_paths.contains(path) {
            return Err(StoreError::Rejected {
                target: path.to_string(),
                reason: "write refused".to_string(),
            });
        }
        let mut root = Value::Object(std::mem::take(&mut self.kv));
        set_value_at(&mut root, &segments, value);
        self.kv = match root {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.kv_writes.push(path.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_commit_applies_ops_in_order() {
        let mut store = MemoryStore::new();
        store.insert("patients", "1", json!({"name": "OLD"}));

        let mut batch = WriteBatch::new();
        batch.delete("1");
        batch.set("1", fields(json!({"name": "NEW"})));
        store.commit("patients", batch).unwrap();

        let doc = store.get("patients", "1").unwrap().unwrap();
        assert_eq!(doc.fields, fields(json!({"name": "NEW"})));
        assert_eq!(store.commits()[0].total(), 2);
    }

    #[test]
    fn test_failed_commit_leaves_collection_untouched() {
        let mut store = MemoryStore::new();
        store.insert("users", "u1", json!({"name": "A"}));
        store.fail_writes("users");

        let mut batch = WriteBatch::new();
        batch.delete("u1");
        assert!(store.commit("users", batch).is_err());
        assert!(store.get("users", "u1").unwrap().is_some());
        assert!(store.commits().is_empty());
    }

    #[test]
    fn test_list_page_walks_cursor() {
        let mut store = MemoryStore::new();
        for id in ["a", "b", "c", "d", "e"] {
            store.insert("consultations", id, json!({}));
        }

        let first = store.list_page("consultations", 2, None).unwrap();
        assert_eq!(first.documents.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("b"));

        let second = store.list_page("consultations", 2, Some("b")).unwrap();
        assert_eq!(second.documents[0].id, "c");

        let last = store.list_page("consultations", 2, Some("d")).unwrap();
        assert_eq!(last.documents.len(), 1);
        assert!(!last.has_more());
    }

    #[test]
    fn test_kv_roundtrip() {
        let mut store = MemoryStore::new();
        assert!(store.kv_read_all().unwrap().is_none());

        store.kv_write("clinics/c1/scheduleShifts", json!([1, 2])).unwrap();
        assert_eq!(
            store.kv_read("clinics/c1/scheduleShifts").unwrap(),
            Some(json!([1, 2]))
        );
        assert_eq!(store.kv_writes(), ["clinics/c1/scheduleShifts"]);
    }

    #[test]
    fn test_ready_countdown() {
        let store = MemoryStore::new().with_ready_after(2);
        assert!(!store.is_ready());
        assert!(!store.is_ready());
        assert!(store.is_ready());
    }
}
