//! The ordered key-value contract shared by every storage backend.
//!
//! A store is a set of named collections. Each collection maps string keys to
//! JSON values. Range reads order the children of one collection by a numeric
//! child field (ties broken by key) and return them ascending, whichever end
//! the limit was applied from.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use serde_json::Value;

/// A single child of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    pub key: String,
    pub value: Value,
}

impl StoreEntry {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Ordered result of a read. Empty when nothing matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: Vec<StoreEntry>,
}

impl Snapshot {
    pub fn new(entries: Vec<StoreEntry>) -> Self {
        Self { entries }
    }

    /// True when the read produced at least one child.
    pub fn exists(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StoreEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[StoreEntry] {
        &self.entries
    }
}

impl IntoIterator for Snapshot {
    type Item = StoreEntry;
    type IntoIter = std::vec::IntoIter<StoreEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a StoreEntry;
    type IntoIter = std::slice::Iter<'a, StoreEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Parameters of a range read. Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRead {
    /// Numeric child field the collection is ordered by.
    pub order_key: String,
    pub start: i64,
    pub end: i64,
    /// Maximum number of children returned.
    pub limit: usize,
    /// Apply the limit from the high end of the range instead of the low end.
    pub from_end: bool,
}

impl RangeRead {
    pub fn validate(&self) -> StorageResult<()> {
        if self.limit == 0 {
            return Err(StorageError::InvalidRange("limit must be at least 1".into()));
        }
        if i64::try_from(self.limit).is_err() {
            return Err(StorageError::InvalidRange(format!("limit {} is too large", self.limit)));
        }
        if self.order_key.is_empty() {
            return Err(StorageError::InvalidRange("order key is empty".into()));
        }
        Ok(())
    }

    /// Whether an order value falls inside the inclusive bounds.
    pub fn contains(&self, value: i64) -> bool {
        self.start <= value && value <= self.end
    }
}

/// Storage seam used by every higher layer.
///
/// Writes and deletes are idempotent. Implementations delegate timeouts to
/// their own transport.
#[async_trait]
pub trait OrderedStore: Send + Sync {
    /// Children of `collection` whose `order_key` field lies in the range,
    /// ascending by (order value, key).
    async fn range_read(&self, collection: &str, range: &RangeRead) -> StorageResult<Snapshot>;

    /// All children of `collection`, ascending by key.
    async fn list(&self, collection: &str) -> StorageResult<Snapshot>;

    /// A single child, if present.
    async fn get(&self, collection: &str, key: &str) -> StorageResult<Option<Value>>;

    /// Full overwrite of a child.
    async fn write(&self, collection: &str, key: &str, value: Value) -> StorageResult<()>;

    /// Remove a child. Removing a missing child is not an error.
    async fn delete(&self, collection: &str, key: &str) -> StorageResult<()>;
}

/// Reject keys and collection names that cannot address a single child.
pub(crate) fn validate_path(collection: &str, key: &str) -> StorageResult<()> {
    if collection.is_empty() {
        return Err(StorageError::InvalidPath("collection is empty".into()));
    }
    if key.is_empty() || key.contains('/') {
        return Err(StorageError::InvalidPath(format!(
            "invalid key {key:?} in {collection}"
        )));
    }
    Ok(())
}

pub(crate) fn order_value(value: &Value, order_key: &str) -> Option<i64> {
    value.get(order_key).and_then(Value::as_i64)
}
