//! Ordered key-value storage for Latchkey.
//!
//! Provides the [`OrderedStore`] seam that the check-in engine reads and
//! writes through, plus two backends:
//!
//! - [`MemoryStore`] keeps collections in process memory (tests, previews)
//! - [`DuckDbStore`] persists them in a DuckDB database file
//!
//! # Architecture
//!
//! - A store holds named collections of JSON children keyed by string
//! - Range reads order a collection by a numeric child field, ties by key
//! - Results always come back ascending; `from_end` only picks which end the
//!   limit is applied from

mod duckdb_store;
mod error;
mod memory;
mod ordered;

pub use duckdb_store::DuckDbStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use ordered::{OrderedStore, RangeRead, Snapshot, StoreEntry};

use serde::{Deserialize, Serialize};

/// Resource settings for the DuckDB backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// DuckDB `memory_limit` pragma value (e.g., "128MB").
    pub memory_limit: String,

    /// DuckDB worker thread count.
    pub threads: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memory_limit: "128MB".to_string(),
            threads: 1,
        }
    }
}
