//! Conversion between the stored and displayed forms of a check-in.
//!
//! Stored form is flat: `{ "name": .., "property": "<digits>", "time": <epoch ms> }`.
//! Display form carries a typed instant, the resolved property name, and the
//! derived status.

use crate::error::{CheckInError, CheckInResult};
use crate::properties::PropertyDirectory;
use crate::status::StatusClassifier;
use crate::types::{CheckIn, CheckInDraft};
use chrono::{DateTime, Utc};
use latchkey_storage::StoreEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Child field check-ins are ordered by.
pub const TIME_FIELD: &str = "time";

/// Strip everything but ASCII digits, so "+1 (555) 010-2000" and
/// "15550102000" address the same property.
pub fn normalize_number(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Stored form of a check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCheckIn {
    pub name: String,
    #[serde(rename = "property")]
    pub property_ref: String,
    pub time: i64,
}

/// Decodes stored check-ins into display form and back.
#[derive(Debug, Clone, Copy)]
pub struct RecordCodec {
    classifier: StatusClassifier,
}

impl RecordCodec {
    pub fn new(classifier: StatusClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &StatusClassifier {
        &self.classifier
    }

    /// Decode one stored child. Unknown properties resolve to the sentinel
    /// name; malformed payloads are errors.
    pub fn decode(
        &self,
        entry: &StoreEntry,
        properties: &PropertyDirectory,
        now: DateTime<Utc>,
    ) -> CheckInResult<CheckIn> {
        let raw: RawCheckIn = serde_json::from_value(entry.value.clone())
            .map_err(|e| CheckInError::decode(&entry.key, e.to_string()))?;
        let time = DateTime::<Utc>::from_timestamp_millis(raw.time).ok_or_else(|| {
            CheckInError::decode(&entry.key, format!("time {} is out of range", raw.time))
        })?;

        Ok(CheckIn {
            id: entry.key.clone(),
            property_name: properties.display_name(&raw.property_ref),
            name: raw.name,
            property_ref: raw.property_ref,
            time,
            status: self.classifier.classify(time, now),
        })
    }

    /// Stored form of a decoded record. The status is dropped and the
    /// property reference is written back untouched.
    pub fn encode(&self, record: &CheckIn) -> CheckInResult<Value> {
        Ok(serde_json::to_value(RawCheckIn {
            name: record.name.clone(),
            property_ref: record.property_ref.clone(),
            time: record.time.timestamp_millis(),
        })?)
    }

    /// Stored form of user input; the property identifier is normalized.
    pub fn encode_draft(&self, draft: &CheckInDraft) -> CheckInResult<Value> {
        Ok(serde_json::to_value(RawCheckIn {
            name: draft.name.trim().to_string(),
            property_ref: normalize_number(&draft.property),
            time: draft.time.timestamp_millis(),
        })?)
    }
}
