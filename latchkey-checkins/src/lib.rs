//! Check-in browsing for Latchkey.
//!
//! Guests check in at a property for a scheduled time. This crate pages
//! through a user's check-ins in either time order, keeps an approximate
//! count of them, labels each with a status relative to now, and answers the
//! property's door phone when a guest arrives.
//!
//! # Architecture
//!
//! - [`CheckInBrowser`] is a paging session over one user's check-ins. It
//!   holds a cursor (the first and last time of the rendered page) and
//!   derives every navigation from it; pages are rebuilt from the store on
//!   every move and after every mutation
//! - [`paging`] holds the pure range computation and boundary trimming
//! - [`RecordCodec`] maps stored children to [`CheckIn`]s, resolving
//!   property names through a [`PropertyDirectory`]
//! - [`StatusClassifier`] labels a check-in relative to a grace period
//! - [`sweep_expired`] and [`AccessDesk`] are the server-side jobs: expiry
//!   cleanup and door-phone access checks
//!
//! All storage goes through [`latchkey_storage::OrderedStore`].

pub mod access;
pub mod browser;
pub mod call_log;
pub mod clock;
pub mod codec;
pub mod config;
pub mod counter;
pub mod error;
pub mod paging;
pub mod properties;
pub mod session;
pub mod status;
pub mod sweep;
pub mod types;

pub use access::{AccessDecision, AccessDesk};
pub use browser::{CheckInBrowser, LoadOutcome};
pub use call_log::{load_call_log, CallLogEntry, CallRecord};
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{normalize_number, RawCheckIn, RecordCodec};
pub use config::CheckInConfig;
pub use counter::RowCounter;
pub use error::{CheckInError, CheckInResult, Operation};
pub use paging::{Direction, PageRequest, RangeQuery};
pub use properties::{Property, PropertyDirectory, UNRESOLVED_PROPERTY};
pub use session::Session;
pub use status::{CheckInStatus, StatusClassifier};
pub use sweep::{sweep_expired, SweepReport};
pub use types::{CheckIn, CheckInDraft, Cursor, Page, QueryFilters, SortOrder, MAX_PAGE_SIZE};
