//! Core data types for check-in browsing.

use crate::codec::normalize_number;
use crate::error::{CheckInError, CheckInResult};
use crate::status::{CheckInStatus, StatusClassifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display order of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending by time.
    Oldest,
    /// Descending by time.
    Newest,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oldest => "oldest",
            Self::Newest => "newest",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = CheckInError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oldest" => Ok(Self::Oldest),
            "newest" => Ok(Self::Newest),
            other => Err(CheckInError::InvalidFilters(format!(
                "unknown sort order {other:?}"
            ))),
        }
    }
}

/// Largest page a single load may request.
pub const MAX_PAGE_SIZE: usize = 1_000;

/// User-adjustable query parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    pub order: SortOrder,
    /// Page size, between 1 and [`MAX_PAGE_SIZE`].
    pub limit: usize,
    pub min_date: DateTime<Utc>,
    pub max_date: DateTime<Utc>,
    /// Raw property identifier; formatting is ignored when matching.
    pub property_filter: Option<String>,
    /// Plain substring keywords; a record matches if any keyword matches.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl QueryFilters {
    pub fn validate(&self) -> CheckInResult<()> {
        if self.limit == 0 {
            return Err(CheckInError::InvalidFilters("limit must be at least 1".into()));
        }
        if self.limit > MAX_PAGE_SIZE {
            return Err(CheckInError::InvalidFilters(format!(
                "limit {} exceeds the maximum page size of {MAX_PAGE_SIZE}",
                self.limit
            )));
        }
        if self.min_date > self.max_date {
            return Err(CheckInError::InvalidFilters(format!(
                "min date {} is after max date {}",
                self.min_date, self.max_date
            )));
        }
        Ok(())
    }

    /// True when a post-filter can drop fetched records.
    pub fn has_post_filter(&self) -> bool {
        self.property_filter.is_some() || self.keywords.iter().any(|k| !k.is_empty())
    }

    /// Whether a decoded record passes the property and keyword filters.
    pub fn matches(&self, record: &CheckIn) -> bool {
        if let Some(filter) = &self.property_filter {
            if normalize_number(filter) != normalize_number(&record.property_ref) {
                return false;
            }
        }
        let keywords: Vec<&str> = self
            .keywords
            .iter()
            .map(String::as_str)
            .filter(|k| !k.is_empty())
            .collect();
        keywords.is_empty()
            || keywords.iter().any(|keyword| {
                record.name.contains(keyword)
                    || record.property_ref.contains(keyword)
                    || record.property_name.contains(keyword)
            })
    }
}

/// Time watermarks of the currently rendered page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub first_time: Option<DateTime<Utc>>,
    pub last_time: Option<DateTime<Utc>>,
}

impl Cursor {
    /// Cursor spanning a rendered page, or `None` for an empty page.
    pub fn spanning(records: &[CheckIn]) -> Option<Self> {
        let first = records.first()?;
        let last = records.last()?;
        Some(Self {
            first_time: Some(first.time),
            last_time: Some(last.time),
        })
    }

    pub fn is_unset(&self) -> bool {
        self.first_time.is_none() && self.last_time.is_none()
    }
}

/// A check-in in display form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: String,
    pub name: String,
    /// Raw property identifier exactly as stored.
    pub property_ref: String,
    /// Resolved property name, or the unresolved sentinel.
    pub property_name: String,
    pub time: DateTime<Utc>,
    /// Derived at render time; never persisted.
    pub status: CheckInStatus,
}

impl CheckIn {
    /// Status relative to a fresh `now`. Statuses go stale as the clock moves.
    pub fn status_at(&self, classifier: &StatusClassifier, now: DateTime<Utc>) -> CheckInStatus {
        classifier.classify(self.time, now)
    }
}

/// User input for creating or overwriting a check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInDraft {
    pub name: String,
    /// Property identifier in any formatting; normalized before storage.
    pub property: String,
    pub time: DateTime<Utc>,
}

impl CheckInDraft {
    pub fn new(name: impl Into<String>, property: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            property: property.into(),
            time,
        }
    }

    pub fn validate(&self) -> CheckInResult<()> {
        if self.name.trim().is_empty() {
            return Err(CheckInError::InvalidRecord("guest name is empty".into()));
        }
        if normalize_number(&self.property).is_empty() {
            return Err(CheckInError::InvalidRecord(format!(
                "property {:?} has no digits",
                self.property
            )));
        }
        Ok(())
    }
}

/// An immutable rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<CheckIn>,
    pub order: SortOrder,
    /// Advisory page number; only the cursor drives navigation.
    pub index: i64,
    /// Load generation that produced this page.
    pub generation: u64,
}

impl Page {
    pub fn empty(order: SortOrder) -> Self {
        Self {
            records: Vec::new(),
            order,
            index: 0,
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }
}
