//! Door-phone access checks.
//!
//! A property's door phone calls in from the property's own number. The call
//! is granted when that number is registered and one of its check-ins is
//! inside its grace window right now.

use crate::call_log::{call_key, CallRecord};
use crate::clock::Clock;
use crate::codec::{normalize_number, RawCheckIn, TIME_FIELD};
use crate::config::CheckInConfig;
use crate::counter::RowCounter;
use crate::error::{CheckInError, CheckInResult, Operation};
use crate::properties::Property;
use crate::session::{Session, HISTORIC_CALL_COUNT, PERMITTED_NUMBERS};
use chrono::{DateTime, Utc};
use latchkey_storage::{OrderedStore, RangeRead};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What to do with an inbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The number is not a registered property.
    Rejected,
    /// Registered, but no check-in is open.
    Denied { user_id: String },
    /// Open the door. `dtmf` is `None` when the property has no tones set.
    Granted {
        user_id: String,
        guest_name: String,
        dtmf: Option<String>,
    },
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

/// Handles inbound calls against the shared store.
pub struct AccessDesk {
    store: Arc<dyn OrderedStore>,
    config: CheckInConfig,
    clock: Arc<dyn Clock>,
}

impl AccessDesk {
    pub fn new(store: Arc<dyn OrderedStore>, config: CheckInConfig, clock: Arc<dyn Clock>) -> Self {
        Self { store, config, clock }
    }

    /// Decide an inbound call and record it in the owner's call log.
    ///
    /// Failing to read the door tones or to record the call is logged; the
    /// decision still stands.
    pub async fn handle_call(&self, raw_caller: &str) -> CheckInResult<AccessDecision> {
        let number = normalize_number(raw_caller);
        if number.is_empty() {
            return Err(CheckInError::InvalidCaller(raw_caller.to_string()));
        }

        let owner = self
            .store
            .get(PERMITTED_NUMBERS, &number)
            .await
            .map_err(|e| CheckInError::read(Operation::Access, format!("{PERMITTED_NUMBERS}/{number}"), e))?;
        let Some(Value::String(user_id)) = owner else {
            info!(caller = %number, "rejecting call from unregistered number");
            return Ok(AccessDecision::Rejected);
        };

        let session = Session::new(user_id.clone());
        let now = self.clock.now();
        let decision = match self.find_open_check_in(&session, &number, now).await? {
            Some(check_in) => {
                let dtmf = match self.dtmf_for(&session, &number).await {
                    Ok(dtmf) => dtmf,
                    Err(e) => {
                        error!(user = session.user_id(), caller = %number, "failed reading door tones: {e}");
                        None
                    }
                };
                AccessDecision::Granted {
                    dtmf,
                    guest_name: check_in.name,
                    user_id,
                }
            }
            None => AccessDecision::Denied { user_id },
        };

        if let Err(e) = self.record_call(&session, &number, decision.is_granted(), now).await {
            error!(user = session.user_id(), caller = %number, "failed recording call: {e}");
        }
        info!(
            user = session.user_id(),
            caller = %number,
            granted = decision.is_granted(),
            "call handled"
        );
        Ok(decision)
    }

    /// A check-in at `number` whose grace window contains `now`.
    async fn find_open_check_in(
        &self,
        session: &Session,
        number: &str,
        now: DateTime<Utc>,
    ) -> CheckInResult<Option<RawCheckIn>> {
        let path = session.check_ins_path();
        let now_ms = now.timestamp_millis();
        let range = RangeRead {
            order_key: TIME_FIELD.to_string(),
            start: now_ms.saturating_sub(self.config.grace_period_ms),
            end: now_ms.saturating_add(self.config.grace_period_ms),
            limit: self.config.access_scan_limit.max(1),
            from_end: false,
        };
        let snapshot = self
            .store
            .range_read(&path, &range)
            .await
            .map_err(|e| CheckInError::read(Operation::Access, &path, e))?;
        debug!(user = session.user_id(), candidates = snapshot.len(), "scanning open check-ins");

        for entry in snapshot {
            match serde_json::from_value::<RawCheckIn>(entry.value) {
                Ok(raw) if normalize_number(&raw.property_ref) == number => return Ok(Some(raw)),
                Ok(_) => {}
                Err(e) => warn!(id = %entry.key, "ignoring unreadable check-in: {e}"),
            }
        }
        Ok(None)
    }

    async fn dtmf_for(&self, session: &Session, number: &str) -> CheckInResult<Option<String>> {
        let path = session.properties_path();
        let value = self
            .store
            .get(&path, number)
            .await
            .map_err(|e| CheckInError::read(Operation::Access, format!("{path}/{number}"), e))?;
        let Some(value) = value else {
            warn!(user = session.user_id(), number, "permitted number has no property record");
            return Ok(None);
        };
        match serde_json::from_value::<Property>(value) {
            Ok(property) => Ok(property.dtmf.filter(|d| !d.is_empty())),
            Err(e) => {
                warn!(user = session.user_id(), number, "unreadable property record: {e}");
                Ok(None)
            }
        }
    }

    async fn record_call(
        &self,
        session: &Session,
        number: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> CheckInResult<()> {
        let path = session.call_log_path();
        let key = call_key(now);
        let record = CallRecord {
            caller: number.to_string(),
            success,
        };
        self.store
            .write(&path, &key, serde_json::to_value(&record)?)
            .await
            .map_err(|e| CheckInError::write(Operation::Access, format!("{path}/{key}"), e))?;

        RowCounter::new(self.store.clone(), session.user_path(), HISTORIC_CALL_COUNT)
            .adjust(1)
            .await?;
        Ok(())
    }
}
