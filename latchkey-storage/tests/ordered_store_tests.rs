use latchkey_storage::{
    DuckDbStore, MemoryStore, OrderedStore, RangeRead, StorageError, StoreConfig,
};
use pretty_assertions::assert_eq;
use serde_json::json;

const COLLECTION: &str = "users/u1/CheckIns";

fn range(start: i64, end: i64, limit: usize, from_end: bool) -> RangeRead {
    RangeRead {
        order_key: "time".into(),
        start,
        end,
        limit,
        from_end,
    }
}

async fn seed(store: &dyn OrderedStore) {
    for (key, time) in [("a", 500), ("b", 100), ("c", 300), ("d", 200), ("e", 400)] {
        store
            .write(COLLECTION, key, json!({"name": key, "time": time}))
            .await
            .unwrap();
    }
}

fn keys(snapshot: &latchkey_storage::Snapshot) -> Vec<String> {
    snapshot.iter().map(|e| e.key.clone()).collect()
}

// ── Shared contract ─────────────────────────────────────────────

async fn range_read_from_start_is_ascending(store: &dyn OrderedStore) {
    seed(store).await;
    let snap = store.range_read(COLLECTION, &range(0, 1000, 3, false)).await.unwrap();
    assert_eq!(keys(&snap), vec!["b", "d", "c"]);
}

async fn range_read_from_end_is_still_ascending(store: &dyn OrderedStore) {
    seed(store).await;
    let snap = store.range_read(COLLECTION, &range(0, 1000, 2, true)).await.unwrap();
    assert_eq!(keys(&snap), vec!["e", "a"]);
}

async fn range_bounds_are_inclusive(store: &dyn OrderedStore) {
    seed(store).await;
    let snap = store.range_read(COLLECTION, &range(200, 400, 10, false)).await.unwrap();
    assert_eq!(keys(&snap), vec!["d", "c", "e"]);
}

async fn ties_are_broken_by_key(store: &dyn OrderedStore) {
    for key in ["z", "m", "a"] {
        store.write(COLLECTION, key, json!({"time": 7})).await.unwrap();
    }
    let snap = store.range_read(COLLECTION, &range(7, 7, 10, false)).await.unwrap();
    assert_eq!(keys(&snap), vec!["a", "m", "z"]);
    let tail = store.range_read(COLLECTION, &range(7, 7, 2, true)).await.unwrap();
    assert_eq!(keys(&tail), vec!["m", "z"]);
}

async fn children_without_order_key_are_skipped(store: &dyn OrderedStore) {
    store.write(COLLECTION, "x", json!({"name": "no time"})).await.unwrap();
    store.write(COLLECTION, "y", json!({"time": "not a number"})).await.unwrap();
    store.write(COLLECTION, "z", json!({"time": 10})).await.unwrap();
    let snap = store.range_read(COLLECTION, &range(i64::MIN, i64::MAX, 10, false)).await.unwrap();
    assert_eq!(keys(&snap), vec!["z"]);
}

async fn overwrite_reindexes(store: &dyn OrderedStore) {
    store.write(COLLECTION, "k", json!({"time": 10})).await.unwrap();
    store.write(COLLECTION, "k", json!({"time": 90})).await.unwrap();
    let low = store.range_read(COLLECTION, &range(0, 50, 10, false)).await.unwrap();
    assert!(!low.exists());
    let high = store.range_read(COLLECTION, &range(50, 100, 10, false)).await.unwrap();
    assert_eq!(keys(&high), vec!["k"]);
}

async fn delete_is_idempotent(store: &dyn OrderedStore) {
    seed(store).await;
    store.delete(COLLECTION, "c").await.unwrap();
    store.delete(COLLECTION, "c").await.unwrap();
    store.delete(COLLECTION, "never-existed").await.unwrap();
    assert!(store.get(COLLECTION, "c").await.unwrap().is_none());
    let snap = store.range_read(COLLECTION, &range(0, 1000, 10, false)).await.unwrap();
    assert_eq!(keys(&snap), vec!["b", "d", "e", "a"]);
}

async fn get_and_list(store: &dyn OrderedStore) {
    seed(store).await;
    let value = store.get(COLLECTION, "a").await.unwrap().unwrap();
    assert_eq!(value, json!({"name": "a", "time": 500}));
    let all = store.list(COLLECTION).await.unwrap();
    assert_eq!(keys(&all), vec!["a", "b", "c", "d", "e"]);
    assert!(!store.list("users/u2/CheckIns").await.unwrap().exists());
}

async fn out_of_range_limits_are_rejected(store: &dyn OrderedStore) {
    for limit in [0, usize::MAX] {
        let err = store.range_read(COLLECTION, &range(0, 10, limit, false)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRange(_)));
    }
}

async fn bad_keys_are_rejected(store: &dyn OrderedStore) {
    let err = store.write(COLLECTION, "", json!({})).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidPath(_)));
    let err = store.write(COLLECTION, "a/b", json!({})).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidPath(_)));
}

async fn scalar_cells_round_trip(store: &dyn OrderedStore) {
    store.write("users/u1", "ConcurrentCheckIns", json!(4)).await.unwrap();
    assert_eq!(
        store.get("users/u1", "ConcurrentCheckIns").await.unwrap(),
        Some(json!(4))
    );
}

macro_rules! contract_tests {
    ($module:ident, $make:expr) => {
        mod $module {
            use super::*;

            #[tokio::test]
            async fn range_read_from_start_is_ascending() {
                super::range_read_from_start_is_ascending(&$make).await;
            }

            #[tokio::test]
            async fn range_read_from_end_is_still_ascending() {
                super::range_read_from_end_is_still_ascending(&$make).await;
            }

            #[tokio::test]
            async fn range_bounds_are_inclusive() {
                super::range_bounds_are_inclusive(&$make).await;
            }

            #[tokio::test]
            async fn ties_are_broken_by_key() {
                super::ties_are_broken_by_key(&$make).await;
            }

            #[tokio::test]
            async fn children_without_order_key_are_skipped() {
                super::children_without_order_key_are_skipped(&$make).await;
            }

            #[tokio::test]
            async fn overwrite_reindexes() {
                super::overwrite_reindexes(&$make).await;
            }

            #[tokio::test]
            async fn delete_is_idempotent() {
                super::delete_is_idempotent(&$make).await;
            }

            #[tokio::test]
            async fn get_and_list() {
                super::get_and_list(&$make).await;
            }

            #[tokio::test]
            async fn out_of_range_limits_are_rejected() {
                super::out_of_range_limits_are_rejected(&$make).await;
            }

            #[tokio::test]
            async fn bad_keys_are_rejected() {
                super::bad_keys_are_rejected(&$make).await;
            }

            #[tokio::test]
            async fn scalar_cells_round_trip() {
                super::scalar_cells_round_trip(&$make).await;
            }
        }
    };
}

contract_tests!(memory, MemoryStore::new());
contract_tests!(duckdb_in_memory, DuckDbStore::open_in_memory().unwrap());

// ── Backend specifics ───────────────────────────────────────────

#[tokio::test]
async fn memory_clones_share_data() {
    let store = MemoryStore::new();
    let clone = store.clone();
    clone.write(COLLECTION, "a", json!({"time": 1})).await.unwrap();
    assert_eq!(store.len(COLLECTION).await, 1);
    store.delete(COLLECTION, "a").await.unwrap();
    assert_eq!(clone.len(COLLECTION).await, 0);
}

#[tokio::test]
async fn duckdb_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("latchkey.duckdb");
    let config = StoreConfig::default();

    {
        let store = DuckDbStore::open(&path, &config).unwrap();
        store.write(COLLECTION, "a", json!({"name": "Ada", "time": 42})).await.unwrap();
        store.maintenance().await.unwrap();
    }

    let reopened = DuckDbStore::open(&path, &config).unwrap();
    let snap = reopened.range_read(COLLECTION, &range(0, 100, 5, false)).await.unwrap();
    assert_eq!(keys(&snap), vec!["a"]);
    assert_eq!(snap.entries()[0].value["name"], "Ada");
}

#[tokio::test]
async fn duckdb_reopens_past_a_corrupt_wal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("latchkey.duckdb");
    let config = StoreConfig::default();

    {
        let store = DuckDbStore::open(&path, &config).unwrap();
        store.write(COLLECTION, "a", json!({"time": 42})).await.unwrap();
        store.maintenance().await.unwrap();
    }
    std::fs::write(dir.path().join("latchkey.duckdb.wal"), b"not a write-ahead log").unwrap();

    let reopened = DuckDbStore::open(&path, &config).unwrap();
    assert_eq!(reopened.get(COLLECTION, "a").await.unwrap(), Some(json!({"time": 42})));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn duckdb_concurrent_calls_share_one_worker() {
    let store = DuckDbStore::open_in_memory().unwrap();
    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let key = format!("k{i:02}");
                store.write(COLLECTION, &key, json!({"time": i})).await.unwrap();
                store.get(COLLECTION, &key).await.unwrap()
            })
        })
        .collect();

    let all = tokio::time::timeout(std::time::Duration::from_secs(30), async {
        let mut values = Vec::new();
        for task in tasks {
            values.push(task.await.unwrap());
        }
        values
    })
    .await
    .unwrap();

    assert!(all.iter().all(Option::is_some));
    let snap = store.range_read(COLLECTION, &range(0, 100, 100, false)).await.unwrap();
    assert_eq!(snap.len(), 32);
}

#[tokio::test]
async fn duckdb_overwrite_drops_stale_index_fields() {
    let store = DuckDbStore::open_in_memory().unwrap();
    store.write(COLLECTION, "k", json!({"time": 10, "seq": 1})).await.unwrap();
    store.write(COLLECTION, "k", json!({"time": 20})).await.unwrap();

    let by_seq = RangeRead {
        order_key: "seq".into(),
        ..range(0, 100, 5, false)
    };
    assert!(!store.range_read(COLLECTION, &by_seq).await.unwrap().exists());
    let by_time = store.range_read(COLLECTION, &range(20, 20, 5, false)).await.unwrap();
    assert_eq!(keys(&by_time), vec!["k"]);
}

#[test]
fn store_config_defaults() {
    let config = StoreConfig::default();
    assert_eq!(config.memory_limit, "128MB");
    assert_eq!(config.threads, 1);
}
