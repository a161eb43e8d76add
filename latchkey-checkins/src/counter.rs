//! Approximate aggregate counters kept in a single store cell.
//!
//! Read-modify-write without a transaction: concurrent writers can lose
//! updates, which is acceptable because the value is advisory.

use crate::error::{CheckInError, CheckInResult, Operation};
use latchkey_storage::OrderedStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle on one counter cell.
#[derive(Clone)]
pub struct RowCounter {
    store: Arc<dyn OrderedStore>,
    collection: String,
    key: String,
}

impl RowCounter {
    pub fn new(store: Arc<dyn OrderedStore>, collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            key: key.into(),
        }
    }

    fn target(&self) -> String {
        format!("{}/{}", self.collection, self.key)
    }

    /// Current value; a missing or non-numeric cell reads as zero.
    pub async fn read(&self) -> CheckInResult<i64> {
        let value = self
            .store
            .get(&self.collection, &self.key)
            .await
            .map_err(|e| CheckInError::read(Operation::Count, self.target(), e))?;

        Ok(match value {
            None | Some(Value::Null) => 0,
            Some(v) => v.as_i64().unwrap_or_else(|| {
                warn!(cell = %self.target(), value = %v, "counter cell is not an integer, treating as 0");
                0
            }),
        })
    }

    /// Add `delta` and return the new total. A zero delta is a pure read.
    pub async fn adjust(&self, delta: i64) -> CheckInResult<i64> {
        let current = self.read().await?;
        let total = current.saturating_add(delta);
        if delta != 0 {
            self.set(total).await?;
            debug!(cell = %self.target(), delta, total, "counter adjusted");
        }
        Ok(total)
    }

    /// Overwrite the cell.
    pub async fn set(&self, total: i64) -> CheckInResult<()> {
        self.store
            .write(&self.collection, &self.key, Value::from(total))
            .await
            .map_err(|e| CheckInError::write(Operation::Count, self.target(), e))
    }
}
