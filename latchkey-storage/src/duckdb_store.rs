//! DuckDB-backed ordered store.
//!
//! Every child is kept as a JSON blob in `nodes`. Top-level integer fields
//! are extracted into `node_index` on write, so any numeric child field can
//! serve as the order key of a range read without a schema declaration.

use crate::error::{StorageError, StorageResult};
use crate::ordered::{validate_path, OrderedStore, RangeRead, Snapshot, StoreEntry};
use crate::StoreConfig;
use async_trait::async_trait;
use duckdb::{params, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Ordered store persisted in a DuckDB database file.
///
/// Connection work runs on the blocking pool, so a slow query never stalls
/// the async worker that awaits it.
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Opens or creates a store at the given path.
    ///
    /// An unclean shutdown can leave a `.wal` file that DuckDB refuses to
    /// replay. When the first open fails and one is present it is removed and
    /// the open retried once.
    pub fn open(path: &Path, config: &StoreConfig) -> StorageResult<Self> {
        let conn = match Connection::open(path) {
            Ok(conn) => conn,
            Err(e) => {
                let wal = wal_path(path);
                if !wal.exists() {
                    return Err(e.into());
                }
                warn!(db = %path.display(), wal = %wal.display(), "open failed, discarding WAL: {e}");
                std::fs::remove_file(&wal)?;
                Connection::open(path)?
            }
        };
        apply_limits(&conn, config)?;
        initialize_node_schema(&conn)?;
        info!(db = %path.display(), memory_limit = %config.memory_limit, threads = config.threads, "store opened");
        Ok(Self::from_conn(conn))
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_node_schema(&conn)?;
        Ok(Self::from_conn(conn))
    }

    fn from_conn(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run CHECKPOINT for maintenance.
    pub async fn maintenance(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch("CHECKPOINT")?;
            Ok(())
        })
        .await
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn);
            op(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Task(format!("DuckDB task failed: {e}")))?
    }
}

/// Acquire the connection lock, recovering from poison left by a panic in
/// another holder.
fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| {
        warn!("recovering from poisoned DuckDB connection mutex");
        poisoned.into_inner()
    })
}

/// `store.duckdb` -> `store.duckdb.wal`, `store` -> `store.wal`.
fn wal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".wal");
    PathBuf::from(name)
}

fn apply_limits(conn: &Connection, config: &StoreConfig) -> StorageResult<()> {
    let memory_limit = config.memory_limit.replace('\'', "");
    conn.execute_batch(&format!(
        "PRAGMA memory_limit='{memory_limit}'; PRAGMA threads={};",
        config.threads.max(1)
    ))?;
    Ok(())
}

fn decode_rows(rows: Vec<(String, String)>) -> StorageResult<Vec<StoreEntry>> {
    rows.into_iter()
        .map(|(key, json)| Ok(StoreEntry::new(key, serde_json::from_str(&json)?)))
        .collect()
}

#[async_trait]
impl OrderedStore for DuckDbStore {
    async fn range_read(&self, collection: &str, range: &RangeRead) -> StorageResult<Snapshot> {
        range.validate()?;
        let direction = if range.from_end { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT n.key, n.value_json FROM node_index i \
             JOIN nodes n ON n.collection = i.collection AND n.key = i.key \
             WHERE i.collection = ? AND i.field = ? AND i.num_value >= ? AND i.num_value <= ? \
             ORDER BY i.num_value {direction}, i.key {direction} LIMIT {}",
            range.limit
        );

        let owned_collection = collection.to_string();
        let order_key = range.order_key.clone();
        let (start, end) = (range.start, range.end);
        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![owned_collection, order_key, start, end], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut entries = decode_rows(rows)?;
        if range.from_end {
            entries.reverse();
        }

        debug!(
            collection,
            order_key = %range.order_key,
            start = range.start,
            end = range.end,
            returned = entries.len(),
            "range read"
        );
        Ok(Snapshot::new(entries))
    }

    async fn list(&self, collection: &str) -> StorageResult<Snapshot> {
        let collection = collection.to_string();
        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT key, value_json FROM nodes WHERE collection = ? ORDER BY key")?;
                let rows = stmt
                    .query_map(params![collection], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(Snapshot::new(decode_rows(rows)?))
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>> {
        validate_path(collection, key)?;
        let (collection, key) = (collection.to_string(), key.to_string());
        let json = self
            .with_conn(move |conn| {
                let result = conn.query_row(
                    "SELECT value_json FROM nodes WHERE collection = ? AND key = ?",
                    params![collection, key],
                    |row| row.get::<_, String>(0),
                );
                match result {
                    Ok(json) => Ok(Some(json)),
                    Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        json.map(|json| serde_json::from_str(&json).map_err(StorageError::from))
            .transpose()
    }

    async fn write(&self, collection: &str, key: &str, value: Value) -> StorageResult<()> {
        validate_path(collection, key)?;
        let json = serde_json::to_string(&value)?;
        let indexed = indexed_fields(&value);
        let (collection, key) = (collection.to_string(), key.to_string());

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO nodes (collection, key, value_json) VALUES (?, ?, ?)",
                params![collection, key, json],
            )?;

            // Never delete and re-insert the same index row in one transaction.
            let existing: Vec<String> = {
                let mut stmt =
                    tx.prepare("SELECT field FROM node_index WHERE collection = ? AND key = ?")?;
                let fields = stmt
                    .query_map(params![collection, key], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                fields
            };
            for stale in existing
                .iter()
                .filter(|field| !indexed.iter().any(|(name, _)| name == *field))
            {
                tx.execute(
                    "DELETE FROM node_index WHERE collection = ? AND key = ? AND field = ?",
                    params![collection, key, stale],
                )?;
            }
            for (field, num_value) in &indexed {
                tx.execute(
                    "INSERT OR REPLACE INTO node_index (collection, key, field, num_value) VALUES (?, ?, ?, ?)",
                    params![collection, key, field, num_value],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> StorageResult<()> {
        validate_path(collection, key)?;
        let (collection, key) = (collection.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM node_index WHERE collection = ? AND key = ?",
                params![collection, key],
            )?;
            tx.execute(
                "DELETE FROM nodes WHERE collection = ? AND key = ?",
                params![collection, key],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

/// Top-level integer fields of an object value, in field-name order.
fn indexed_fields(value: &Value) -> Vec<(String, i64)> {
    value
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(name, v)| v.as_i64().map(|n| (name.clone(), n)))
                .collect()
        })
        .unwrap_or_default()
}

fn initialize_node_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS nodes (
            collection VARCHAR NOT NULL,
            key VARCHAR NOT NULL,
            value_json TEXT NOT NULL,
            PRIMARY KEY (collection, key)
        );
        CREATE TABLE IF NOT EXISTS node_index (
            collection VARCHAR NOT NULL,
            key VARCHAR NOT NULL,
            field VARCHAR NOT NULL,
            num_value BIGINT NOT NULL,
            PRIMARY KEY (collection, key, field)
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_fields_keeps_integers_only() {
        let value = serde_json::json!({"time": 1700, "name": "Ada", "ratio": 0.5, "count": -3});
        let fields = indexed_fields(&value);
        assert_eq!(
            fields,
            vec![("count".to_string(), -3), ("time".to_string(), 1700)]
        );
    }

    #[test]
    fn indexed_fields_of_scalar_is_empty() {
        assert!(indexed_fields(&serde_json::json!(42)).is_empty());
    }

    #[test]
    fn wal_sits_next_to_the_database() {
        assert_eq!(wal_path(Path::new("/data/latchkey.duckdb")), PathBuf::from("/data/latchkey.duckdb.wal"));
        assert_eq!(wal_path(Path::new("store")), PathBuf::from("store.wal"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn held_connection_does_not_stall_the_runtime() {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.write("checkins", "a", serde_json::json!({"time": 1})).await.unwrap();

        let guard = lock(&store.conn);
        let reader = tokio::spawn({
            let store = store.clone();
            async move { store.get("checkins", "a").await }
        });
        // The runtime's only thread keeps running timers while the read waits.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!reader.is_finished());
        drop(guard);

        let value = tokio::time::timeout(std::time::Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(value, Some(serde_json::json!({"time": 1})));
    }
}
