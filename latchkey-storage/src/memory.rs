//! In-process ordered store backed by nested `BTreeMap`s.

use crate::error::StorageResult;
use crate::ordered::{order_value, validate_path, OrderedStore, RangeRead, Snapshot, StoreEntry};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

/// Ordered store kept entirely in memory. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of children currently stored in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl OrderedStore for MemoryStore {
    async fn range_read(&self, collection: &str, range: &RangeRead) -> StorageResult<Snapshot> {
        range.validate()?;
        let collections = self.collections.read().await;
        let Some(children) = collections.get(collection) else {
            return Ok(Snapshot::default());
        };

        let mut matched: Vec<(i64, &String, &Value)> = children
            .iter()
            .filter_map(|(key, value)| {
                let ordered = order_value(value, &range.order_key)?;
                range.contains(ordered).then_some((ordered, key, value))
            })
            .collect();
        matched.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let skip = if range.from_end {
            matched.len().saturating_sub(range.limit)
        } else {
            0
        };

        let entries = matched
            .into_iter()
            .skip(skip)
            .take(range.limit)
            .map(|(_, key, value)| StoreEntry::new(key.clone(), value.clone()))
            .collect();
        Ok(Snapshot::new(entries))
    }

    async fn list(&self, collection: &str) -> StorageResult<Snapshot> {
        let collections = self.collections.read().await;
        let entries = collections
            .get(collection)
            .map(|children| {
                children
                    .iter()
                    .map(|(key, value)| StoreEntry::new(key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Snapshot::new(entries))
    }

    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>> {
        validate_path(collection, key)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|children| children.get(key))
            .cloned())
    }

    async fn write(&self, collection: &str, key: &str, value: Value) -> StorageResult<()> {
        validate_path(collection, key)?;
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> StorageResult<()> {
        validate_path(collection, key)?;
        let mut collections = self.collections.write().await;
        if let Some(children) = collections.get_mut(collection) {
            children.remove(key);
            if children.is_empty() {
                collections.remove(collection);
            }
        }
        Ok(())
    }
}
