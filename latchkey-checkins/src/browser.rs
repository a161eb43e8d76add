//! Check-in browsing session: paging, filtering, and mutations.
//!
//! A browser owns no record identity. Every navigation rebuilds the page from
//! the store, and every mutation is followed by a full reload of the first
//! page. A new page is assembled completely before it replaces the displayed
//! one, so a failed load leaves the previous page and cursor in place.
//!
//! Loads are tagged with a generation number. A load that finishes after a
//! newer one has started is discarded instead of overwriting newer state.

use crate::clock::Clock;
use crate::codec::RecordCodec;
use crate::config::CheckInConfig;
use crate::counter::RowCounter;
use crate::error::{CheckInError, CheckInResult, Operation};
use crate::paging::{
    compute_range, into_display_order, trim_overfetch, Direction, PageRequest,
};
use crate::properties::PropertyDirectory;
use crate::session::{Session, CONCURRENT_CHECK_INS};
use crate::status::StatusClassifier;
use crate::types::{CheckIn, CheckInDraft, Cursor, Page, QueryFilters};
use chrono::{DateTime, Utc};
use latchkey_storage::OrderedStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of a page load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// A non-empty page replaced the displayed one.
    Rendered(Arc<Page>),
    /// Nothing in the requested direction. The cursor is unchanged.
    Empty,
    /// A newer load started while this one was in flight; its result was
    /// discarded.
    Superseded,
}

impl LoadOutcome {
    /// The rendered page, if any.
    pub fn page(&self) -> Option<&Arc<Page>> {
        match self {
            Self::Rendered(page) => Some(page),
            Self::Empty | Self::Superseded => None,
        }
    }

    /// Records of the load; empty unless a page was rendered.
    pub fn records(&self) -> &[CheckIn] {
        match self {
            Self::Rendered(page) => &page.records,
            Self::Empty | Self::Superseded => &[],
        }
    }
}

struct BrowserState {
    filters: QueryFilters,
    cursor: Cursor,
    page: Arc<Page>,
    total: Option<i64>,
    properties: Arc<PropertyDirectory>,
}

/// Paged view over one session's check-ins.
pub struct CheckInBrowser {
    store: Arc<dyn OrderedStore>,
    session: Session,
    config: CheckInConfig,
    clock: Arc<dyn Clock>,
    codec: RecordCodec,
    counter: RowCounter,
    generation: AtomicU64,
    state: Mutex<BrowserState>,
}

impl CheckInBrowser {
    pub fn new(
        store: Arc<dyn OrderedStore>,
        session: Session,
        config: CheckInConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let filters = config.default_filters(clock.now());
        let counter = RowCounter::new(store.clone(), session.user_path(), CONCURRENT_CHECK_INS);
        let codec = RecordCodec::new(StatusClassifier::new(config.grace()));
        Self {
            state: Mutex::new(BrowserState {
                page: Arc::new(Page::empty(filters.order)),
                filters,
                cursor: Cursor::default(),
                total: None,
                properties: Arc::new(PropertyDirectory::default()),
            }),
            store,
            session,
            config,
            clock,
            codec,
            counter,
            generation: AtomicU64::new(0),
        }
    }

    /// Acquire the state lock, recovering from poison. The lock is never held
    /// across an await point.
    fn lock_state(&self) -> MutexGuard<'_, BrowserState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("[CheckInBrowser] recovering from poisoned state mutex");
            poisoned.into_inner()
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &CheckInConfig {
        &self.config
    }

    pub fn filters(&self) -> QueryFilters {
        self.lock_state().filters.clone()
    }

    /// Replace the filters. Loads already in flight are superseded; call
    /// [`Self::load_first_page`] to render under the new filters.
    pub fn set_filters(&self, filters: QueryFilters) -> CheckInResult<()> {
        filters.validate()?;
        let mut state = self.lock_state();
        self.generation.fetch_add(1, Ordering::SeqCst);
        state.filters = filters;
        Ok(())
    }

    pub fn cursor(&self) -> Cursor {
        self.lock_state().cursor
    }

    pub fn current_page(&self) -> Arc<Page> {
        self.lock_state().page.clone()
    }

    /// Advisory page number of the displayed page.
    pub fn page_index(&self) -> i64 {
        self.lock_state().page.index
    }

    /// Last successfully read approximate total.
    pub fn total(&self) -> Option<i64> {
        self.lock_state().total
    }

    pub fn properties(&self) -> Arc<PropertyDirectory> {
        self.lock_state().properties.clone()
    }

    pub fn set_properties(&self, properties: PropertyDirectory) {
        self.lock_state().properties = Arc::new(properties);
    }

    /// Reload the property directory. On failure the previous one is kept.
    pub async fn refresh_properties(&self) -> CheckInResult<()> {
        match PropertyDirectory::load(self.store.as_ref(), &self.session).await {
            Ok(directory) => {
                debug!(count = directory.len(), "property directory refreshed");
                self.set_properties(directory);
                Ok(())
            }
            Err(e) => {
                error!(user = self.session.user_id(), "failed refreshing properties: {e}");
                Err(e)
            }
        }
    }

    /// Re-read the approximate total. On failure the displayed total is kept.
    pub async fn refresh_total(&self) -> CheckInResult<i64> {
        match self.counter.adjust(0).await {
            Ok(total) => {
                self.lock_state().total = Some(total);
                Ok(total)
            }
            Err(e) => {
                warn!(user = self.session.user_id(), "failed reading check-in total: {e}");
                Err(e)
            }
        }
    }

    /// The displayed page with statuses recomputed against the clock.
    pub fn render_current(&self) -> Page {
        let now = self.clock.now();
        let mut page = (*self.current_page()).clone();
        for record in &mut page.records {
            record.status = record.status_at(self.codec.classifier(), now);
        }
        page
    }

    pub async fn load_first_page(&self) -> CheckInResult<LoadOutcome> {
        self.load_page(Direction::First).await
    }

    pub async fn load_next_page(&self) -> CheckInResult<LoadOutcome> {
        self.load_page(Direction::Next).await
    }

    pub async fn load_previous_page(&self) -> CheckInResult<LoadOutcome> {
        self.load_page(Direction::Previous).await
    }

    /// Load a page in `direction` and, if it is non-empty and still current,
    /// make it the displayed page.
    pub async fn load_page(&self, direction: Direction) -> CheckInResult<LoadOutcome> {
        let (filters, cursor, properties) = {
            let state = self.lock_state();
            (state.filters.clone(), state.cursor, state.properties.clone())
        };

        let request = match PageRequest::from_cursor(direction, &cursor) {
            Ok(request) => request,
            Err(e) => {
                error!(?direction, "rejected page load: {e}");
                return Err(e);
            }
        };
        // Only a load that will reach the store may supersede one in flight.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let now = self.clock.now();
        let records = match self.fetch_page(&request, &filters, &properties, now).await {
            Ok(records) => records,
            Err(e) => {
                error!(
                    operation = %Operation::Load,
                    user = self.session.user_id(),
                    ?direction,
                    "failed loading check-ins: {e}"
                );
                return Err(e);
            }
        };

        let mut state = self.lock_state();
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, ?direction, "discarding superseded page load");
            return Ok(LoadOutcome::Superseded);
        }

        let Some(next_cursor) = Cursor::spanning(&records) else {
            if direction == Direction::First {
                state.page = Arc::new(Page {
                    records: Vec::new(),
                    order: filters.order,
                    index: 0,
                    generation,
                });
                state.cursor = Cursor::default();
            }
            debug!(?direction, "no check-ins in requested direction");
            return Ok(LoadOutcome::Empty);
        };

        let index = match direction {
            Direction::First => 0,
            Direction::Next => state.page.index + 1,
            Direction::Previous => (state.page.index - 1).max(0),
        };
        let page = Arc::new(Page {
            records,
            order: filters.order,
            index,
            generation,
        });
        state.page = page.clone();
        state.cursor = next_cursor;

        info!(
            ?direction,
            index,
            count = page.len(),
            order = filters.order.as_str(),
            "check-in page rendered"
        );
        Ok(LoadOutcome::Rendered(page))
    }

    /// Read, decode, trim, and filter one page in display order.
    ///
    /// Without a post-filter this is a single read. With one, further reads
    /// past the far edge refill the page until it is full, the range runs
    /// out, or the round budget is spent.
    async fn fetch_page(
        &self,
        request: &PageRequest,
        filters: &QueryFilters,
        properties: &PropertyDirectory,
        now: DateTime<Utc>,
    ) -> CheckInResult<Vec<CheckIn>> {
        let path = self.session.check_ins_path();
        let page_size = filters.limit;
        let mut query = compute_range(request, filters, self.config.grace_period_ms)?;
        let rounds = if filters.has_post_filter() {
            self.config.max_filter_rounds.max(1)
        } else {
            1
        };

        let mut batches: Vec<Vec<CheckIn>> = Vec::new();
        let mut matched = 0;
        for round in 0..rounds {
            let snapshot = self
                .store
                .range_read(&path, &query.to_range_read())
                .await
                .map_err(|e| CheckInError::read(Operation::Load, &path, e))?;
            let fetched = snapshot.len();

            let decoded = snapshot
                .iter()
                .map(|entry| self.codec.decode(entry, properties, now))
                .collect::<CheckInResult<Vec<_>>>()?;
            let trimmed = trim_overfetch(decoded, &query, |r| r.time.timestamp_millis());
            let far_edge = if query.from_end {
                trimmed.first()
            } else {
                trimmed.last()
            }
            .map(|r| r.time.timestamp_millis());

            let batch: Vec<CheckIn> = trimmed.into_iter().filter(|r| filters.matches(r)).collect();
            matched += batch.len();
            batches.push(batch);
            debug!(round, fetched, matched, "check-in batch read");

            let Some(edge) = far_edge else { break };
            if matched >= page_size || query.exhausted(fetched) {
                break;
            }
            query = query.continue_from(edge, page_size);
        }

        // Batches travel away from the seed; stitch them back into ascending
        // order and keep the records closest to the seed.
        let mut ascending: Vec<CheckIn> = if query.from_end {
            batches.into_iter().rev().flatten().collect()
        } else {
            batches.into_iter().flatten().collect()
        };
        if ascending.len() > page_size {
            if query.from_end {
                let excess = ascending.len() - page_size;
                ascending.drain(..excess);
            } else {
                ascending.truncate(page_size);
            }
        }
        Ok(into_display_order(ascending, &query))
    }

    /// Store a new check-in and resynchronize. Returns the new id.
    pub async fn create(&self, draft: &CheckInDraft) -> CheckInResult<String> {
        draft.validate()?;
        let id = Uuid::now_v7().to_string();
        let value = self.codec.encode_draft(draft)?;
        let path = self.session.check_ins_path();

        if let Err(e) = self.store.write(&path, &id, value).await {
            error!(operation = %Operation::Create, id = %id, "failed writing check-in: {e}");
            return Err(CheckInError::write(Operation::Create, format!("{path}/{id}"), e));
        }
        info!(id = %id, user = self.session.user_id(), "check-in created");

        self.adjust_total(1).await;
        self.resync(Operation::Create, &id).await;
        Ok(id)
    }

    /// Overwrite a check-in and resynchronize. An unknown id is created and
    /// counted.
    pub async fn edit(&self, id: &str, draft: &CheckInDraft) -> CheckInResult<()> {
        draft.validate()?;
        let value = self.codec.encode_draft(draft)?;
        let path = self.session.check_ins_path();
        let existed = match self.store.get(&path, id).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                error!(operation = %Operation::Edit, id, "failed reading check-in: {e}");
                return Err(CheckInError::read(Operation::Edit, format!("{path}/{id}"), e));
            }
        };

        if let Err(e) = self.store.write(&path, id, value).await {
            error!(operation = %Operation::Edit, id, "failed writing check-in: {e}");
            return Err(CheckInError::write(Operation::Edit, format!("{path}/{id}"), e));
        }
        info!(id, existed, user = self.session.user_id(), "check-in edited");

        // Editing an unknown id creates the record.
        if !existed {
            self.adjust_total(1).await;
        }
        self.resync(Operation::Edit, id).await;
        Ok(())
    }

    /// Delete a check-in and resynchronize. Deleting a missing id leaves the
    /// total untouched.
    pub async fn delete(&self, id: &str) -> CheckInResult<()> {
        let path = self.session.check_ins_path();
        let existed = match self.store.get(&path, id).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                error!(operation = %Operation::Delete, id, "failed reading check-in: {e}");
                return Err(CheckInError::read(Operation::Delete, format!("{path}/{id}"), e));
            }
        };

        if let Err(e) = self.store.delete(&path, id).await {
            error!(operation = %Operation::Delete, id, "failed deleting check-in: {e}");
            return Err(CheckInError::write(Operation::Delete, format!("{path}/{id}"), e));
        }
        info!(id, existed, user = self.session.user_id(), "check-in deleted");

        if existed {
            self.adjust_total(-1).await;
        }
        self.resync(Operation::Delete, id).await;
        Ok(())
    }

    async fn adjust_total(&self, delta: i64) {
        match self.counter.adjust(delta).await {
            Ok(total) => self.lock_state().total = Some(total),
            Err(e) => warn!(delta, "failed updating check-in total, keeping previous: {e}"),
        }
    }

    /// Full reload after a mutation. The mutation itself already succeeded,
    /// so a failed reload is reported but not returned.
    async fn resync(&self, operation: Operation, id: &str) {
        if let Err(e) = self.load_first_page().await {
            error!(%operation, id, "failed reloading check-ins after mutation: {e}");
        }
    }
}
