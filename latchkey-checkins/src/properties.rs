//! Property lookup: raw identifiers to display names.
//!
//! Properties live under `users/<uid>/Properties/<digits>`. The directory is
//! a snapshot refreshed independently of check-in browsing.

use crate::codec::normalize_number;
use crate::error::{CheckInError, CheckInResult, Operation};
use crate::session::{Session, PERMITTED_NUMBERS};
use latchkey_storage::OrderedStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Display name used when a check-in references an unknown property.
pub const UNRESOLVED_PROPERTY: &str = "undefined";

/// A rentable property reachable through its door phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Normalized phone number; also the storage key.
    #[serde(default)]
    pub number: String,
    pub name: String,
    #[serde(default)]
    pub dtmf: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl Property {
    pub fn new(number: &str, name: impl Into<String>) -> Self {
        Self {
            number: normalize_number(number),
            name: name.into(),
            dtmf: None,
            address: None,
        }
    }

    pub fn with_dtmf(mut self, dtmf: impl Into<String>) -> Self {
        self.dtmf = Some(dtmf.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// True when `raw` names this property, ignoring formatting.
    pub fn matches_key(&self, raw: &str) -> bool {
        let wanted = normalize_number(raw);
        !wanted.is_empty() && normalize_number(&self.number) == wanted
    }

    /// `+C (AAA) BBB-CCCC`, with everything before the last ten digits as
    /// the country code. Shorter numbers are returned as-is.
    pub fn phone_string(&self) -> String {
        let digits = normalize_number(&self.number);
        if digits.len() < 10 {
            return digits;
        }
        let (country, local) = digits.split_at(digits.len() - 10);
        format!(
            "+{country} ({}) {}-{}",
            &local[..3],
            &local[3..6],
            &local[6..]
        )
    }
}

/// Snapshot of a user's properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyDirectory {
    properties: Vec<Property>,
}

impl PropertyDirectory {
    pub fn new(properties: Vec<Property>) -> Self {
        Self { properties }
    }

    /// Read every property of a session. Children that fail to parse are
    /// skipped with a warning.
    pub async fn load(store: &dyn OrderedStore, session: &Session) -> CheckInResult<Self> {
        let path = session.properties_path();
        let snapshot = store
            .list(&path)
            .await
            .map_err(|e| CheckInError::read(Operation::Properties, &path, e))?;

        let mut properties = Vec::with_capacity(snapshot.len());
        for entry in snapshot {
            match serde_json::from_value::<Property>(entry.value) {
                Ok(mut property) => {
                    property.number = entry.key;
                    properties.push(property);
                }
                Err(e) => warn!(key = %entry.key, "skipping malformed property: {e}"),
            }
        }
        Ok(Self { properties })
    }

    /// Save a property and permit calls from its number.
    pub async fn register(
        store: &dyn OrderedStore,
        session: &Session,
        property: &Property,
    ) -> CheckInResult<()> {
        let number = normalize_number(&property.number);
        if number.is_empty() {
            return Err(CheckInError::InvalidRecord(format!(
                "property {:?} has no digits",
                property.name
            )));
        }
        let mut stored = property.clone();
        stored.number = number.clone();

        let path = session.properties_path();
        store
            .write(&path, &number, serde_json::to_value(&stored)?)
            .await
            .map_err(|e| CheckInError::write(Operation::Properties, format!("{path}/{number}"), e))?;
        store
            .write(PERMITTED_NUMBERS, &number, Value::String(session.user_id().to_string()))
            .await
            .map_err(|e| {
                CheckInError::write(Operation::Properties, format!("{PERMITTED_NUMBERS}/{number}"), e)
            })?;

        info!(user = session.user_id(), number = %number, "property registered");
        Ok(())
    }

    /// Remove a property and revoke its number.
    pub async fn unregister(
        store: &dyn OrderedStore,
        session: &Session,
        number: &str,
    ) -> CheckInResult<()> {
        let number = normalize_number(number);
        let path = session.properties_path();
        store
            .delete(&path, &number)
            .await
            .map_err(|e| CheckInError::write(Operation::Properties, format!("{path}/{number}"), e))?;
        store
            .delete(PERMITTED_NUMBERS, &number)
            .await
            .map_err(|e| {
                CheckInError::write(Operation::Properties, format!("{PERMITTED_NUMBERS}/{number}"), e)
            })?;

        info!(user = session.user_id(), number = %number, "property removed");
        Ok(())
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// The property a raw identifier refers to.
    pub fn find(&self, raw: &str) -> CheckInResult<&Property> {
        self.properties
            .iter()
            .find(|p| p.matches_key(raw))
            .ok_or_else(|| CheckInError::PropertyNotFound(raw.to_string()))
    }

    /// Display name for a raw identifier, falling back to the sentinel.
    pub fn display_name(&self, raw: &str) -> String {
        self.find(raw)
            .map(|p| p.name.clone())
            .unwrap_or_else(|_| UNRESOLVED_PROPERTY.to_string())
    }
}
