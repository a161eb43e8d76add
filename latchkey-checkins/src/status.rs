//! Time-window status labels for check-ins.
//!
//! A check-in is open from one grace period before its time until one grace
//! period after it. The label tells the guest how long until the window
//! opens, or how long until it closes once closing is within the hour.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Derived status of a check-in relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CheckInStatus {
    ClosingIn(i64),
    Open,
    LessThanAMinute,
    InMinutes(i64),
    InHours(i64),
    InDays(i64),
    On(NaiveDate),
}

impl fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClosingIn(n) => {
                write!(f, "closing in {n} minute{}", if *n != 1 { "s" } else { "" })
            }
            Self::Open => f.write_str("open"),
            Self::LessThanAMinute => f.write_str("less than a minute"),
            Self::InMinutes(n) => write!(f, "in {n} minute{}", plural(*n)),
            Self::InHours(n) => write!(f, "in {n} hour{}", plural(*n)),
            Self::InDays(n) => write!(f, "in {n} day{}", plural(*n)),
            Self::On(date) => write!(f, "{}", date.format("%B %-d, %Y")),
        }
    }
}

fn plural(n: i64) -> &'static str {
    if n > 1 { "s" } else { "" }
}

/// Pure classifier parameterized by the grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusClassifier {
    grace_ms: i64,
}

impl StatusClassifier {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace_ms: grace.num_milliseconds(),
        }
    }

    pub fn grace(&self) -> Duration {
        Duration::milliseconds(self.grace_ms)
    }

    /// Classify `target` against `now`. First matching rule wins.
    pub fn classify(&self, target: DateTime<Utc>, now: DateTime<Utc>) -> CheckInStatus {
        let target_ms = i128::from(target.timestamp_millis());
        let now_ms = i128::from(now.timestamp_millis());
        let grace = i128::from(self.grace_ms);

        let until_close = target_ms + grace - now_ms;
        let minutes_before_close = round_half_up(until_close, MINUTE_MS);
        if minutes_before_close > -1 && minutes_before_close < 60 {
            return CheckInStatus::ClosingIn(minutes_before_close);
        }

        let until_open = target_ms - grace - now_ms;
        let minutes_before_open = round_half_up(until_open, MINUTE_MS);
        if minutes_before_open < 0 {
            return CheckInStatus::Open;
        }
        if minutes_before_open < 1 {
            return CheckInStatus::LessThanAMinute;
        }
        if minutes_before_open < 60 {
            return CheckInStatus::InMinutes(minutes_before_open);
        }

        let hours_before_open = round_half_up(until_open, HOUR_MS);
        if hours_before_open < 24 {
            return CheckInStatus::InHours(hours_before_open);
        }

        let days_before_open = round_half_up(until_open, DAY_MS);
        if days_before_open < 7 {
            return CheckInStatus::InDays(days_before_open);
        }

        CheckInStatus::On(target.date_naive())
    }
}

/// Divide and round halves toward positive infinity.
fn round_half_up(value: i128, unit: i64) -> i64 {
    let unit = i128::from(unit);
    let rounded = (2 * value + unit).div_euclid(2 * unit);
    i64::try_from(rounded).unwrap_or(if rounded < 0 { i64::MIN } else { i64::MAX })
}
