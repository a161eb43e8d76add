//! Expiry sweep: removes check-ins whose window has long passed and resets
//! the live check-in counter to what remains.

use crate::codec::RawCheckIn;
use crate::config::CheckInConfig;
use crate::counter::RowCounter;
use crate::error::{CheckInError, CheckInResult, Operation};
use crate::session::{Session, CONCURRENT_CHECK_INS};
use chrono::{DateTime, Utc};
use latchkey_storage::OrderedStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one sweep over a user's check-ins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: usize,
    pub remaining: usize,
    /// Children that could not be parsed; left in place and counted as
    /// remaining.
    pub skipped: usize,
}

/// True when a check-in at `time_ms` is past its expiry at `now`.
pub fn is_expired(time_ms: i64, expiry_ms: i64, now: DateTime<Utc>) -> bool {
    time_ms.saturating_add(expiry_ms) < now.timestamp_millis()
}

/// Delete every expired check-in of `session` and set the live counter to
/// the number left.
pub async fn sweep_expired(
    store: Arc<dyn OrderedStore>,
    session: &Session,
    config: &CheckInConfig,
    now: DateTime<Utc>,
) -> CheckInResult<SweepReport> {
    let path = session.check_ins_path();
    let snapshot = store
        .list(&path)
        .await
        .map_err(|e| CheckInError::read(Operation::Sweep, &path, e))?;

    let mut report = SweepReport::default();
    for entry in snapshot.iter() {
        let raw: RawCheckIn = match serde_json::from_value(entry.value.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(id = %entry.key, "sweep skipping unreadable check-in: {e}");
                report.skipped += 1;
                report.remaining += 1;
                continue;
            }
        };

        if is_expired(raw.time, config.expiry_ms, now) {
            store
                .delete(&path, &entry.key)
                .await
                .map_err(|e| CheckInError::write(Operation::Sweep, format!("{path}/{}", entry.key), e))?;
            debug!(id = %entry.key, time = raw.time, "expired check-in removed");
            report.removed += 1;
        } else {
            report.remaining += 1;
        }
    }

    let counter = RowCounter::new(store, session.user_path(), CONCURRENT_CHECK_INS);
    counter.set(report.remaining as i64).await?;

    info!(
        user = session.user_id(),
        removed = report.removed,
        remaining = report.remaining,
        skipped = report.skipped,
        "expiry sweep finished"
    );
    Ok(report)
}
