//! Per-user addressing of every collection and counter cell.

use serde::{Deserialize, Serialize};

/// Shared collection mapping property numbers to the owning user id.
pub const PERMITTED_NUMBERS: &str = "permittedNumbers";

/// Counter cell holding the approximate number of live check-ins.
pub const CONCURRENT_CHECK_INS: &str = "ConcurrentCheckIns";

/// Counter cell holding the number of calls ever recorded.
pub const HISTORIC_CALL_COUNT: &str = "HistoricCallCount";

/// The user whose data an engine instance reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session {
    user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Collection holding this user's counter cells.
    pub fn user_path(&self) -> String {
        format!("users/{}", self.user_id)
    }

    pub fn check_ins_path(&self) -> String {
        format!("users/{}/CheckIns", self.user_id)
    }

    pub fn properties_path(&self) -> String {
        format!("users/{}/Properties", self.user_id)
    }

    pub fn call_log_path(&self) -> String {
        format!("users/{}/CallLog", self.user_id)
    }
}
