//! Keyset pagination over the time-ordered check-in collection.
//!
//! Range bounds are inclusive, so every seeded read overfetches by one and
//! drops the record sitting on the seed. Reads always come back ascending;
//! pages shown newest first are reversed after trimming.

use crate::codec::TIME_FIELD;
use crate::error::{CheckInError, CheckInResult};
use crate::types::{Cursor, QueryFilters, SortOrder};
use chrono::{DateTime, Utc};
use latchkey_storage::RangeRead;

/// Navigation verb issued by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    First,
    Next,
    Previous,
}

/// A navigation request bound to the watermark it continues from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    First,
    Next { after: DateTime<Utc> },
    Previous { before: DateTime<Utc> },
}

impl PageRequest {
    /// Bind a direction to the cursor of the rendered page. Next and
    /// Previous need a page to have been rendered first.
    pub fn from_cursor(direction: Direction, cursor: &Cursor) -> CheckInResult<Self> {
        match direction {
            Direction::First => Ok(Self::First),
            Direction::Next => cursor
                .last_time
                .map(|after| Self::Next { after })
                .ok_or_else(|| {
                    CheckInError::InvalidPagingState("next requested before any page was rendered".into())
                }),
            Direction::Previous => cursor
                .first_time
                .map(|before| Self::Previous { before })
                .ok_or_else(|| {
                    CheckInError::InvalidPagingState(
                        "previous requested before any page was rendered".into(),
                    )
                }),
        }
    }
}

/// Which end of a seeded read may hold the boundary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Unseeded read; nothing to drop.
    None,
    /// Read upward from the seed; the boundary is the first record.
    Leading(i64),
    /// Read downward to the seed; the boundary is the last record.
    Trailing(i64),
}

/// Physical read parameters plus the post-processing a page needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeQuery {
    pub start: i64,
    pub end: i64,
    /// Records requested, including the overfetched boundary slot.
    pub limit: usize,
    pub from_end: bool,
    pub boundary: Boundary,
    /// Reverse the ascending read to produce the display order.
    pub reverse: bool,
}

impl RangeQuery {
    /// Records a page may hold once the boundary is trimmed.
    pub fn page_size(&self) -> usize {
        match self.boundary {
            Boundary::None => self.limit,
            Boundary::Leading(_) | Boundary::Trailing(_) => self.limit.saturating_sub(1),
        }
    }

    pub fn to_range_read(&self) -> RangeRead {
        RangeRead {
            order_key: TIME_FIELD.to_string(),
            start: self.start,
            end: self.end,
            limit: self.limit,
            from_end: self.from_end,
        }
    }

    /// Whether a read that returned `fetched` records reached the end of the
    /// range in the travel direction.
    pub fn exhausted(&self, fetched: usize) -> bool {
        fetched < self.limit
    }

    /// Query for the next batch past `edge`, travelling the same way. Used
    /// to refill pages thinned by a post-filter.
    pub fn continue_from(&self, edge: i64, page_size: usize) -> Self {
        if self.from_end {
            Self {
                end: edge,
                limit: page_size.saturating_add(1),
                boundary: Boundary::Trailing(edge),
                ..*self
            }
        } else {
            Self {
                start: edge,
                limit: page_size.saturating_add(1),
                boundary: Boundary::Leading(edge),
                ..*self
            }
        }
    }
}

/// Compute the read for a navigation request. Pure; performs no I/O.
///
/// The window's lower bound is widened by one grace period so check-ins
/// that are still open stay visible.
pub fn compute_range(
    request: &PageRequest,
    filters: &QueryFilters,
    grace_ms: i64,
) -> CheckInResult<RangeQuery> {
    filters.validate()?;
    let lower = filters.min_date.timestamp_millis().saturating_sub(grace_ms);
    let upper = filters.max_date.timestamp_millis();
    let size = filters.limit;
    let newest = filters.order == SortOrder::Newest;

    let query = match (*request, filters.order) {
        (PageRequest::First, _) => RangeQuery {
            start: lower,
            end: upper,
            limit: size,
            from_end: newest,
            boundary: Boundary::None,
            reverse: newest,
        },
        (PageRequest::Next { after }, SortOrder::Oldest) => {
            let seed = after.timestamp_millis();
            RangeQuery {
                start: seed,
                end: upper,
                limit: size.saturating_add(1),
                from_end: false,
                boundary: Boundary::Leading(seed),
                reverse: false,
            }
        }
        (PageRequest::Next { after }, SortOrder::Newest) => {
            let seed = after.timestamp_millis();
            RangeQuery {
                start: lower,
                end: seed,
                limit: size.saturating_add(1),
                from_end: true,
                boundary: Boundary::Trailing(seed),
                reverse: true,
            }
        }
        (PageRequest::Previous { before }, SortOrder::Oldest) => {
            let seed = before.timestamp_millis();
            RangeQuery {
                start: lower,
                end: seed,
                limit: size.saturating_add(1),
                from_end: true,
                boundary: Boundary::Trailing(seed),
                reverse: false,
            }
        }
        (PageRequest::Previous { before }, SortOrder::Newest) => {
            let seed = before.timestamp_millis();
            RangeQuery {
                start: seed,
                end: upper,
                limit: size.saturating_add(1),
                from_end: false,
                boundary: Boundary::Leading(seed),
                reverse: true,
            }
        }
    };
    Ok(query)
}

/// Drop the overfetched record from an ascending read.
///
/// The record on the seed is dropped when present. If it is gone (deleted
/// since the page was rendered) and the read is over-full, the record at the
/// far end goes instead. At most one record is removed.
pub fn trim_overfetch<T>(mut items: Vec<T>, query: &RangeQuery, time_of: impl Fn(&T) -> i64) -> Vec<T> {
    let page_size = query.page_size();
    match query.boundary {
        Boundary::None => {
            items.truncate(page_size);
        }
        Boundary::Leading(seed) => {
            if items.first().is_some_and(|item| time_of(item) == seed) {
                items.remove(0);
            } else if items.len() > page_size {
                items.pop();
            }
        }
        Boundary::Trailing(seed) => {
            if items.last().is_some_and(|item| time_of(item) == seed) {
                items.pop();
            } else if items.len() > page_size {
                items.remove(0);
            }
        }
    }
    items
}

/// Put an ascending page into display order.
pub fn into_display_order<T>(mut items: Vec<T>, query: &RangeQuery) -> Vec<T> {
    if query.reverse {
        items.reverse();
    }
    items
}
