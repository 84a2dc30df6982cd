//! SQLite store implementation.
//!
//! This module provides the durable local backend for the clinic data,
//! implementing [`RemoteStore`] on top of a single SQLite file. Batch
//! commits run inside one IMMEDIATE transaction so a batch either lands
//! whole or not at all.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::schema::apply_schema;
use super::{
    path_segments, set_value_at, value_at, BatchOp, Document, DocumentPage, RemoteStore,
    StoreResult, WriteBatch,
};

/// SQLite-based clinic store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a store at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a store with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    super::StoreError::Unavailable(format!(
                        "cannot create {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Names of every collection that currently holds documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn collection_names(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT collection FROM documents ORDER BY collection")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Number of documents in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn read_top_level(&self, key: &str) -> StoreResult<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv_entries WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        raw.map(|text| serde_json::from_str(&text).map_err(Into::into))
            .transpose()
    }
}

fn decode_document(id: String, data: &str) -> StoreResult<Document> {
    let fields: Map<String, Value> = serde_json::from_str(data)?;
    Ok(Document { id, fields })
}

impl RemoteStore for SqliteStore {
    fn is_ready(&self) -> bool {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    fn list_ids(&self, collection: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT doc_id FROM documents WHERE collection = ?1")?;
        let ids = stmt
            .query_map([collection], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn list_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_id, data FROM documents WHERE collection = ?1 ORDER BY doc_id",
        )?;
        let rows = stmt
            .query_map([collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, data)| decode_document(id, &data))
            .collect()
    }

    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND doc_id = ?2",
                [collection, id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|data| decode_document(id.to_string(), &data))
            .transpose()
    }

    fn list_page(
        &self,
        collection: &str,
        limit: usize,
        after: Option<&str>,
    ) -> StoreResult<DocumentPage> {
        let limit = limit.max(1);
        // One extra row tells us whether another page exists.
        let fetch = i64::try_from(limit + 1).unwrap_or(i64::MAX);

        let mut stmt = self.conn.prepare(
            "SELECT doc_id, data FROM documents
             WHERE collection = ?1 AND (?2 IS NULL OR doc_id > ?2)
             ORDER BY doc_id LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![collection, after, fetch], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut documents = rows
            .into_iter()
            .map(|(id, data)| decode_document(id, &data))
            .collect::<StoreResult<Vec<_>>>()?;

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
        let now = chrono::Utc::now().timestamp_millis();

        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        for op in batch.ops() {
            match op {
                BatchOp::Delete { id } => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2",
                        [collection, id.as_str()],
                    )?;
                }
                BatchOp::Set { id, data } => {
                    let payload = serde_json::to_string(data)?;
                    tx.execute(
                        "INSERT INTO documents (collection, doc_id, data, updated_at)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(collection, doc_id) DO UPDATE SET
                           data = excluded.data,
                           updated_at = excluded.updated_at",
                        rusqlite::params![collection, id, payload, now],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn kv_read_all(&self) -> StoreResult<Option<Value>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv_entries ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut tree = Map::new();
        for (key, text) in rows {
            tree.insert(key, serde_json::from_str(&text)?);
        }
        Ok(Some(Value::Object(tree)))
    }

    fn kv_read(&self, path: &str) -> StoreResult<Option<Value>> {
        let segments = path_segments(path)?;
        let Some(top) = self.read_top_level(segments[0])? else {
            return Ok(None);
        };
        Ok(value_at(&top, &segments[1..]).cloned())
    }

    fn kv_write(&mut self, path: &str, value: Value) -> StoreResult<()> {
        let segments = path_segments(path)?;
        let key = segments[0];
        let now = chrono::Utc::now().timestamp_millis();

        let top = if segments.len() == 1 {
            value
        } else {
            let mut top = self.read_top_level(key)?.unwrap_or(Value::Null);
            set_value_at(&mut top, &segments[1..], value);
            top
        };

        if top.is_null() || top.as_object().is_some_and(Map::is_empty) {
            self.conn
                .execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
            return Ok(());
        }

        self.conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![key, serde_json::to_string(&top)?, now],
        )?;
        Ok(())
    }
}
