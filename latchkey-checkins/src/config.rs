//! Check-in engine configuration.

use crate::types::{QueryFilters, SortOrder, MAX_PAGE_SIZE};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Configuration for check-in browsing, sweeping, and access checks.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckInConfig {
    /// Window before and after a check-in time during which it is open.
    pub grace_period_ms: i64,

    /// How far ahead of now the default query window reaches.
    pub look_ahead_ms: i64,

    /// Default page size for a fresh browser.
    pub default_page_size: usize,

    /// Default display order for a fresh browser.
    pub default_order: SortOrder,

    /// Age past a check-in time after which the sweep removes it.
    pub expiry_ms: i64,

    /// Upper bound on refill fetches when a post-filter thins out a page.
    pub max_filter_rounds: usize,

    /// Maximum check-ins inspected when validating an inbound call.
    pub access_scan_limit: usize,
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 2 * HOUR_MS,
            look_ahead_ms: 30 * DAY_MS,
            default_page_size: 25,
            default_order: SortOrder::Newest,
            expiry_ms: 2 * HOUR_MS,
            max_filter_rounds: 8,
            access_scan_limit: 256,
        }
    }
}

impl CheckInConfig {
    pub fn grace(&self) -> Duration {
        Duration::milliseconds(self.grace_period_ms)
    }

    /// Filters a fresh browser starts with: from one grace period ago until
    /// the look-ahead horizon.
    pub fn default_filters(&self, now: DateTime<Utc>) -> QueryFilters {
        QueryFilters {
            order: self.default_order,
            limit: self.default_page_size.clamp(1, MAX_PAGE_SIZE),
            min_date: now - Duration::milliseconds(self.grace_period_ms),
            max_date: now + Duration::milliseconds(self.look_ahead_ms),
            property_filter: None,
            keywords: Vec::new(),
        }
    }
}
