//! Microsecond time values with a reserved "unset" sentinel.
//!
//! `Time::UNSET` is `u64::MAX`, so an absent time sorts after every real
//! time under plain integer ordering. Calculations rely on that: `max`
//! of a set and an unset value is unset, and `<` against an unset best
//! is always true.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A non-negative duration in microseconds, or [`Time::UNSET`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(u64);

impl Time {
    pub const UNSET: Time = Time(u64::MAX);
    pub const ZERO: Time = Time(0);

    /// `u64::MAX` maps onto the sentinel, same as on the wire.
    pub const fn from_micros(us: u64) -> Self {
        Time(us)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_set(self) -> bool {
        self.0 != u64::MAX
    }

    pub const fn is_unset(self) -> bool {
        self.0 == u64::MAX
    }

    pub fn micros(self) -> Option<u64> {
        self.is_set().then_some(self.0)
    }

    /// Sum of two times. Unset if either side is unset or the sum would
    /// collide with the sentinel.
    pub fn checked_add(self, other: Time) -> Time {
        if self.is_unset() || other.is_unset() {
            return Time::UNSET;
        }
        match self.0.checked_add(other.0) {
            Some(sum) if sum != u64::MAX => Time(sum),
            _ => Time::UNSET,
        }
    }

    /// Difference clamped at zero. Unset if either side is unset.
    pub fn saturating_sub(self, other: Time) -> Time {
        if self.is_unset() || other.is_unset() {
            return Time::UNSET;
        }
        Time(self.0.saturating_sub(other.0))
    }

    /// Render for a timer display.
    ///
    /// Hours and minutes only appear when non-zero. Sub-minute values always
    /// carry milliseconds; longer values carry them only when `long` is set.
    pub fn format(self, long: bool) -> String {
        let Some(us) = self.micros() else {
            return "-".to_string();
        };

        let total_ms = us / 1000;
        let ms = total_ms % 1000;
        let total_secs = total_ms / 1000;
        let secs = total_secs % 60;
        let mins = (total_secs / 60) % 60;
        let hrs = total_secs / 3600;

        match (hrs, mins, long) {
            (h, m, true) if h > 0 => format!("{h}:{m:02}:{secs:02}.{ms:03}"),
            (h, m, false) if h > 0 => format!("{h}:{m:02}:{secs:02}"),
            (_, m, true) if m > 0 => format!("{m}:{secs:02}.{ms:03}"),
            (_, m, false) if m > 0 => format!("{m}:{secs:02}"),
            _ => format!("{secs}.{ms:03}"),
        }
    }
}

impl Default for Time {
    fn default() -> Self {
        Time::UNSET
    }
}

/// Storage/wire form: decimal microseconds, or `-` when unset.
impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.micros() {
            Some(us) => write!(f, "{us}"),
            None => f.write_str("-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time value: {0:?}")]
pub struct ParseTimeError(pub String);

impl FromStr for Time {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            return Ok(Time::UNSET);
        }
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseTimeError(s.to_string()));
        }
        s.parse::<u64>()
            .map(Time)
            .map_err(|_| ParseTimeError(s.to_string()))
    }
}

/// Signed difference between a current time and a comparison time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "micros", rename_all = "snake_case")]
pub enum Delta {
    /// Current is faster than the comparison by this much.
    Ahead(Time),
    /// Current is slower than (or equal to) the comparison by this much.
    Behind(Time),
}

impl Delta {
    pub fn between(current: Time, comparison: Time) -> Option<Delta> {
        if current.is_unset() || comparison.is_unset() {
            return None;
        }
        if current < comparison {
            Some(Delta::Ahead(comparison.saturating_sub(current)))
        } else {
            Some(Delta::Behind(current.saturating_sub(comparison)))
        }
    }

    pub fn format(self, long: bool) -> String {
        match self {
            Delta::Ahead(t) => format!("-{}", t.format(long)),
            Delta::Behind(t) => format!("+{}", t.format(long)),
        }
    }
}
