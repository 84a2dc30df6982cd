//! Document and key-value store layer.
//!
//! The sync routines never talk to a concrete database. They go through
//! [`RemoteStore`], which models the two halves of the clinic backend:
//!
//! - **Document collections**: named sets of JSON documents keyed by id,
//!   written through size-limited [`WriteBatch`]es.
//! - **Key-value tree**: a single JSON tree addressed by `/`-separated paths,
//!   holding operational state (inventory, schedules, live appointments).
//!
//! # Submodules
//!
//! - [`memory`] - In-memory store with failure injection (tests, dry runs)
//! - [`schema`] - SQLite schema definitions
//! - [`sqlite`] - Durable SQLite-backed store

pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::thread;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Maximum number of operations a single batch commit may carry.
///
/// This mirrors the hard per-request ceiling of the hosted document store.
pub const MAX_BATCH_OPS: usize = 500;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored value could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store is not reachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A batch exceeded [`MAX_BATCH_OPS`].
    #[error("Batch of {size} operations exceeds the limit of {max}")]
    BatchTooLarge {
        /// Operations in the rejected batch.
        size: usize,
        /// The configured ceiling.
        max: usize,
    },

    /// The store refused an operation (permission, quota, injected failure).
    #[error("Operation on '{target}' rejected: {reason}")]
    Rejected {
        /// Collection name or key-value path.
        target: String,
        /// Why it was refused.
        reason: String,
    },

    /// A key-value path is empty or malformed.
    #[error("Invalid key-value path: '{0}'")]
    InvalidPath(String),
}

/// A document as stored: the id is the storage key, not a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Storage key.
    pub id: String,
    /// Document payload, never containing the storage key.
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create a document from an id and its payload.
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// One page of an id-ordered collection scan.
#[derive(Debug, Clone, Default)]
pub struct DocumentPage {
    /// Documents on this page, ordered by id.
    pub documents: Vec<Document>,
    /// Cursor to pass as `after` for the next page, `None` on the last page.
    pub next_cursor: Option<String>,
}

impl DocumentPage {
    /// Whether the backend reports more pages after this one.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// A single write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Remove the document with this id.
    Delete {
        /// Document id.
        id: String,
    },
    /// Create or overwrite the document with this id.
    Set {
        /// Document id.
        id: String,
        /// Full replacement payload.
        data: Map<String, Value>,
    },
}

/// An ordered set of writes committed together.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a delete.
    pub fn delete(&mut self, id: impl Into<String>) {
        self.ops.push(BatchOp::Delete { id: id.into() });
    }

    /// Queue a full overwrite.
    pub fn set(&mut self, id: impl Into<String>, data: Map<String, Value>) {
        self.ops.push(BatchOp::Set {
            id: id.into(),
            data,
        });
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether the batch has reached [`MAX_BATCH_OPS`].
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ops.len() >= MAX_BATCH_OPS
    }

    /// The queued operations in order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consume the batch, yielding its operations.
    #[must_use]
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    /// Reject batches over the ceiling before they reach storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BatchTooLarge`] when the batch is over the limit.
    pub fn check_size(&self) -> StoreResult<()> {
        if self.ops.len() > MAX_BATCH_OPS {
            return Err(StoreError::BatchTooLarge {
                size: self.ops.len(),
                max: MAX_BATCH_OPS,
            });
        }
        Ok(())
    }
}

/// Capability interface for the clinic's backing data service.
///
/// Reads are authoritative: implementations must never answer from a
/// trimmed or cached projection.
pub trait RemoteStore {
    /// Whether the data layer has finished initializing.
    fn is_ready(&self) -> bool;

    /// All document ids in a collection (order unspecified).
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    fn list_ids(&self, collection: &str) -> StoreResult<Vec<String>>;

    /// All documents in a collection, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be read.
    fn list_all(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// A single document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// One page of documents with ids strictly greater than `after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be read.
    fn list_page(
        &self,
        collection: &str,
        limit: usize,
        after: Option<&str>,
    ) -> StoreResult<DocumentPage>;

    /// Apply every operation in the batch, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch is too large or the write is refused.
    fn commit(&mut self, collection: &str, batch: WriteBatch) -> StoreResult<()>;

    /// The entire key-value tree, or `None` when it holds nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    fn kv_read_all(&self) -> StoreResult<Option<Value>>;

    /// The subtree at a `/`-separated path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the read fails.
    fn kv_read(&self, path: &str) -> StoreResult<Option<Value>>;

    /// Overwrite the subtree at a `/`-separated path wholesale.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the write fails.
    fn kv_write(&mut self, path: &str, value: Value) -> StoreResult<()>;
}

/// Polling schedule for [`wait_until_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Maximum number of polls.
    pub attempts: u32,
    /// Delay between polls.
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 100,
            interval: Duration::from_millis(50),
        }
    }
}

/// Block until the store reports ready or the policy is exhausted.
///
/// Returns `false` on timeout. The timeout is not fatal: callers go ahead and
/// let individual operations fail on their own.
pub fn wait_until_ready<S: RemoteStore + ?Sized>(store: &S, policy: ReadinessPolicy) -> bool {
    for attempt in 0..policy.attempts {
        if store.is_ready() {
            if attempt > 0 {
                debug!(attempt, "store became ready");
            }
            return true;
        }
        thread::sleep(policy.interval);
    }

    if store.is_ready() {
        return true;
    }

    warn!(
        attempts = policy.attempts,
        interval_ms = u64::try_from(policy.interval.as_millis()).unwrap_or(u64::MAX),
        "store not ready after polling, continuing anyway"
    );
    false
}

/// Split a key-value path into its non-empty segments.
///
/// # Errors
///
/// Returns [`StoreError::InvalidPath`] if no segment remains.
pub fn path_segments(path: &str) -> StoreResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Walk `root` along `segments`, returning the value found there.
#[must_use]
pub fn value_at<'v>(root: &'v Value, segments: &[&str]) -> Option<&'v Value> {
    segments
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(*segment))
}

/// Replace the value at `segments` under `root`, creating objects on the way.
///
/// Writing `null` removes the entry, matching the hosted tree semantics where
/// a null subtree does not exist.
pub fn set_value_at(root: &mut Value, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for segment in parents {
        node = ensure_object(node)
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = ensure_object(node);
    if value.is_null() {
        map.remove(*last);
    } else {
        map.insert((*last).to_string(), value);
    }
}

/// Coerce a node into an object, discarding any scalar it held.
fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_batch_fills_at_ceiling() {
        let mut batch = WriteBatch::new();
        for i in 0..MAX_BATCH_OPS - 1 {
            batch.delete(i.to_string());
        }
        assert!(!batch.is_full());
        batch.set("last", Map::new());
        assert!(batch.is_full());
        assert!(batch.check_size().is_ok());

        batch.delete("overflow");
        assert!(matches!(
            batch.check_size(),
            Err(StoreError::BatchTooLarge { size: 501, max: 500 })
        ));
    }

    #[test]
    fn test_path_segments_rejects_empty() {
        assert_eq!(path_segments("a/b").unwrap(), vec!["a", "b"]);
        assert_eq!(path_segments("/a//b/").unwrap(), vec!["a", "b"]);
        assert!(matches!(path_segments("//"), Err(StoreError::InvalidPath(_))));
    }

    #[test]
    fn test_set_value_at_creates_parents() {
        let mut root = json!({});
        set_value_at(&mut root, &["clinics", "c1", "herbInventory"], json!({"h1": 3}));
        assert_eq!(root, json!({"clinics": {"c1": {"herbInventory": {"h1": 3}}}}));
        assert_eq!(
            value_at(&root, &["clinics", "c1", "herbInventory", "h1"]),
            Some(&json!(3))
        );
    }

    #[test]
    fn test_set_value_at_replaces_subtree_wholesale() {
        let mut root = json!({"settings": {"a": 1, "b": 2}});
        set_value_at(&mut root, &["settings"], json!({"c": 3}));
        assert_eq!(root, json!({"settings": {"c": 3}}));
    }

    #[test]
    fn test_set_value_at_null_removes() {
        let mut root = json!({"a": {"b": 1, "c": 2}});
        set_value_at(&mut root, &["a", "b"], Value::Null);
        assert_eq!(root, json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_wait_until_ready_times_out_without_error() {
        let store = MemoryStore::new().with_ready_after(u32::MAX);
        let policy = ReadinessPolicy {
            attempts: 3,
            interval: Duration::from_millis(1),
        };
        assert!(!wait_until_ready(&store, policy));
    }

    #[test]
    fn test_wait_until_ready_polls_until_ready() {
        let store = MemoryStore::new().with_ready_after(2);
        let policy = ReadinessPolicy {
            attempts: 10,
            interval: Duration::from_millis(1),
        };
        assert!(wait_until_ready(&store, policy));
    }
}
