//! Shared fixtures for check-in integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use latchkey_checkins::{CheckInBrowser, CheckInConfig, FixedClock, QueryFilters, Session, SortOrder};
use latchkey_storage::{MemoryStore, OrderedStore, RangeRead, Snapshot, StorageError, StorageResult};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, Notify};

pub const USER: &str = "u1";
pub const LOFT: &str = "15550102000";
pub const CABIN: &str = "15550103000";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

pub fn hours(n: i64) -> Duration {
    Duration::hours(n)
}

pub fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}

/// Id of the `i`th seeded check-in; ids sort the same way as times.
pub fn id(i: usize) -> String {
    format!("c{i:02}")
}

pub fn ids(indices: impl IntoIterator<Item = usize>) -> Vec<String> {
    indices.into_iter().map(id).collect()
}

pub fn page_ids(records: &[latchkey_checkins::CheckIn]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub session: Session,
    pub config: CheckInConfig,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        Self {
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(FixedClock::new(t0())),
            session: Session::new(USER),
            config: CheckInConfig::default(),
        }
    }

    pub fn browser(&self) -> CheckInBrowser {
        self.browser_on(self.store.clone())
    }

    pub fn browser_on(&self, store: Arc<dyn OrderedStore>) -> CheckInBrowser {
        CheckInBrowser::new(store, self.session.clone(), self.config.clone(), self.clock.clone())
    }

    /// Browser with the default window and the given page size and order.
    pub fn paged_browser(&self, limit: usize, order: SortOrder) -> CheckInBrowser {
        let browser = self.browser();
        browser.set_filters(self.filters(limit, order)).unwrap();
        browser
    }

    pub fn filters(&self, limit: usize, order: SortOrder) -> QueryFilters {
        QueryFilters {
            order,
            limit,
            ..self.config.default_filters(t0())
        }
    }

    pub async fn seed(&self, key: &str, name: &str, property: &str, time: DateTime<Utc>) {
        self.store
            .write(
                &self.session.check_ins_path(),
                key,
                json!({"name": name, "property": property, "time": time.timestamp_millis()}),
            )
            .await
            .unwrap();
    }

    /// Seed `count` check-ins one hour apart starting an hour from now, all
    /// at the loft.
    pub async fn seed_hourly(&self, count: usize) {
        for i in 0..count {
            self.seed(&id(i), &format!("Guest {i}"), LOFT, t0() + hours(i as i64 + 1))
                .await;
        }
    }

    pub async fn seed_property(&self, number: &str, name: &str, dtmf: Option<&str>) {
        let mut value = json!({"name": name});
        if let Some(dtmf) = dtmf {
            value["dtmf"] = Value::from(dtmf);
        }
        self.store
            .write(&self.session.properties_path(), number, value)
            .await
            .unwrap();
    }

    pub async fn counter(&self, key: &str) -> Option<Value> {
        self.store.get(&self.session.user_path(), key).await.unwrap()
    }
}

// ── Fault injection ─────────────────────────────────────────────

/// Wraps a store and fails range reads, property lookups, or writes on demand.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    pub fail_range_reads: AtomicBool,
    pub fail_property_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_range_reads: AtomicBool::new(false),
            fail_property_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_range_reads(&self, fail: bool) {
        self.fail_range_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail `get` on any `.../Properties` collection.
    pub fn fail_property_reads(&self, fail: bool) {
        self.fail_property_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderedStore for FlakyStore {
    async fn range_read(&self, collection: &str, range: &RangeRead) -> StorageResult<Snapshot> {
        if self.fail_range_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected read failure".into()));
        }
        self.inner.range_read(collection, range).await
    }

    async fn list(&self, collection: &str) -> StorageResult<Snapshot> {
        self.inner.list(collection).await
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>> {
        if self.fail_property_reads.load(Ordering::SeqCst) && collection.ends_with("/Properties") {
            return Err(StorageError::Unavailable("injected property read failure".into()));
        }
        self.inner.get(collection, key).await
    }

    async fn write(&self, collection: &str, key: &str, value: Value) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected write failure".into()));
        }
        self.inner.write(collection, key, value).await
    }

    async fn delete(&self, collection: &str, key: &str) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected write failure".into()));
        }
        self.inner.delete(collection, key).await
    }
}

/// Holds the first range read until released, so a later load can overtake
/// it.
pub struct GatedStore {
    pub inner: Arc<MemoryStore>,
    pub entered: Notify,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let store = Self {
            inner,
            entered: Notify::new(),
            gate: Mutex::new(Some(rx)),
        };
        (store, tx)
    }
}

#[async_trait]
impl OrderedStore for GatedStore {
    async fn range_read(&self, collection: &str, range: &RangeRead) -> StorageResult<Snapshot> {
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            self.entered.notify_one();
            let _ = gate.await;
        }
        self.inner.range_read(collection, range).await
    }

    async fn list(&self, collection: &str) -> StorageResult<Snapshot> {
        self.inner.list(collection).await
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>> {
        self.inner.get(collection, key).await
    }

    async fn write(&self, collection: &str, key: &str, value: Value) -> StorageResult<()> {
        self.inner.write(collection, key, value).await
    }

    async fn delete(&self, collection: &str, key: &str) -> StorageResult<()> {
        self.inner.delete(collection, key).await
    }
}
