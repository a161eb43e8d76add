//! Door-phone call log.
//!
//! Each inbound call is stored under `users/<uid>/CallLog/<epoch ms>` with the
//! caller's number and whether the door was opened.

use crate::error::{CheckInError, CheckInResult, Operation};
use crate::properties::PropertyDirectory;
use crate::session::Session;
use chrono::{DateTime, Utc};
use latchkey_storage::OrderedStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Stored form of one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub caller: String,
    #[serde(default)]
    pub success: bool,
}

/// Storage key for a call at `at`: whole seconds, rounded, in milliseconds.
pub fn call_key(at: DateTime<Utc>) -> String {
    let seconds = (at.timestamp_millis() + 500).div_euclid(1000);
    (seconds * 1000).to_string()
}

/// A call in display form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallLogEntry {
    pub at: DateTime<Utc>,
    pub caller: String,
    /// Resolved property name, or the unresolved sentinel.
    pub property_name: String,
    pub success: bool,
}

impl CallLogEntry {
    pub fn status_mark(&self) -> &'static str {
        if self.success { "✅" } else { "❌" }
    }

    /// e.g. `October 21, 2026 at 14:03:05`, in UTC.
    pub fn time_label(&self) -> String {
        self.at.format("%B %d, %Y at %H:%M:%S").to_string()
    }
}

/// Calls of `session`, newest first, at most `limit` of them when given.
pub async fn load_call_log(
    store: &dyn OrderedStore,
    session: &Session,
    properties: &PropertyDirectory,
    limit: Option<usize>,
) -> CheckInResult<Vec<CallLogEntry>> {
    let path = session.call_log_path();
    let snapshot = store
        .list(&path)
        .await
        .map_err(|e| CheckInError::read(Operation::CallLog, &path, e))?;

    let mut entries = Vec::with_capacity(snapshot.len());
    for entry in snapshot {
        let at = match entry.key.parse::<i64>().ok().and_then(DateTime::<Utc>::from_timestamp_millis) {
            Some(at) => at,
            None => {
                warn!(key = %entry.key, "skipping call log entry with non-timestamp key");
                continue;
            }
        };
        let record: CallRecord = match serde_json::from_value(entry.value) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %entry.key, "skipping malformed call log entry: {e}");
                continue;
            }
        };
        entries.push(CallLogEntry {
            at,
            property_name: properties.display_name(&record.caller),
            caller: record.caller,
            success: record.success,
        });
    }

    entries.sort_by(|a, b| b.at.cmp(&a.at));
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    debug!(user = session.user_id(), count = entries.len(), "call log loaded");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn call_keys_round_to_whole_seconds() {
        assert_eq!(call_key(Utc.timestamp_millis_opt(1_700_000_000_499).unwrap()), "1700000000000");
        assert_eq!(call_key(Utc.timestamp_millis_opt(1_700_000_000_500).unwrap()), "1700000001000");
    }

    #[test]
    fn labels() {
        let entry = CallLogEntry {
            at: Utc.with_ymd_and_hms(2026, 10, 1, 14, 3, 5).unwrap(),
            caller: "15550102000".into(),
            property_name: "Loft".into(),
            success: false,
        };
        assert_eq!(entry.time_label(), "October 01, 2026 at 14:03:05");
        assert_eq!(entry.status_mark(), "❌");
    }
}
