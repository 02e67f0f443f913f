//! TTL Module
//!
//! Resolves the caller's TTL once into whatever encoding a backend expects:
//! an absolute instant for the in-memory map, or the native dual
//! relative/absolute seconds value for segment and daemon clients.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, TimeDelta, Utc};

use crate::error::{CacheError, Result};

// == Public Constants ==
/// Largest native expiry still read as relative seconds (30 days).
///
/// Native clients treat anything above this as an absolute Unix timestamp.
pub const NATIVE_RELATIVE_LIMIT: i64 = 60 * 60 * 24 * 30;

/// Native expiry value meaning "never expire".
pub const NATIVE_NO_EXPIRY: i64 = 0;

/// Native expiry value for a span that is already over.
pub const NATIVE_EXPIRED: i64 = -1;

// == Ttl ==
/// Time-to-live supplied with `set` and `set_multiple`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// No TTL given: backend default or never expire
    #[default]
    Absent,
    /// Relative seconds from now
    Seconds(u64),
    /// Calendar-aware interval added to now
    Interval(Interval),
}

impl Ttl {
    // == Expires At ==
    /// Absolute expiry instant, or None for "never".
    ///
    /// Zero and negative spans are not special-cased; they produce an
    /// instant at or before `now`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Ttl::Absent => None,
            Ttl::Seconds(seconds) => Some(
                i64::try_from(*seconds)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|delta| now.checked_add_signed(delta))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            Ttl::Interval(interval) => Some(interval.after(now)),
        }
    }

    // == Native Expiry ==
    /// Expiry in the dual encoding of segment and daemon clients.
    ///
    /// Spans up to `NATIVE_RELATIVE_LIMIT` are emitted as relative seconds,
    /// longer ones as an absolute Unix timestamp so they cannot be misread.
    /// Fractional seconds round up, so a short positive span never becomes
    /// the never-expire sentinel.
    ///
    /// # Arguments
    /// * `now` - The instant relative spans are measured from
    ///
    /// # Returns
    /// - `NATIVE_NO_EXPIRY` for `Ttl::Absent`
    /// - `NATIVE_EXPIRED` for a span of zero
    /// - the span itself if it is negative or within `NATIVE_RELATIVE_LIMIT`
    /// - `now` plus the span as a Unix timestamp otherwise
    pub fn native_expiry(&self, now: DateTime<Utc>) -> i64 {
        let seconds = match self {
            Ttl::Absent => return NATIVE_NO_EXPIRY,
            Ttl::Seconds(seconds) => i64::try_from(*seconds).unwrap_or(i64::MAX),
            Ttl::Interval(interval) => whole_seconds(interval.after(now) - now),
        };

        match seconds {
            NATIVE_NO_EXPIRY => NATIVE_EXPIRED,
            s if s <= NATIVE_RELATIVE_LIMIT => s,
            s => now.timestamp().saturating_add(s),
        }
    }

    /// Returns true for `Ttl::Absent`.
    pub fn is_absent(&self) -> bool {
        matches!(self, Ttl::Absent)
    }
}

/// Seconds in `span`, rounding positive fractions up and negative ones toward zero.
fn whole_seconds(span: TimeDelta) -> i64 {
    let seconds = span.num_seconds();
    if span > TimeDelta::seconds(seconds) {
        seconds + 1
    } else {
        seconds
    }
}

impl From<u64> for Ttl {
    fn from(seconds: u64) -> Self {
        Ttl::Seconds(seconds)
    }
}

impl From<Interval> for Ttl {
    fn from(interval: Interval) -> Self {
        Ttl::Interval(interval)
    }
}

impl From<TimeDelta> for Ttl {
    fn from(delta: TimeDelta) -> Self {
        Ttl::Interval(Interval::from(delta))
    }
}

impl From<std::time::Duration> for Ttl {
    fn from(duration: std::time::Duration) -> Self {
        Ttl::Interval(Interval::from(
            TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX),
        ))
    }
}

impl<T: Into<Ttl>> From<Option<T>> for Ttl {
    fn from(ttl: Option<T>) -> Self {
        ttl.map(Into::into).unwrap_or(Ttl::Absent)
    }
}

// == Interval ==
/// A duration specification: whole calendar months plus an exact span.
///
/// Parsed from ISO-8601 durations such as `PT1S`, `P1M2DT3H` or `-P2W`.
/// Years count as twelve months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    months: i32,
    delta: TimeDelta,
}

impl Interval {
    pub fn new(months: i32, delta: TimeDelta) -> Self {
        Self { months, delta }
    }

    /// Interval of whole seconds.
    pub fn seconds(seconds: i64) -> Self {
        Self::from(TimeDelta::try_seconds(seconds).unwrap_or(if seconds < 0 {
            TimeDelta::MIN
        } else {
            TimeDelta::MAX
        }))
    }

    /// Interval of whole calendar months.
    pub fn months(months: i32) -> Self {
        Self::new(months, TimeDelta::zero())
    }

    pub fn calendar_months(&self) -> i32 {
        self.months
    }

    pub fn delta(&self) -> TimeDelta {
        self.delta
    }

    fn is_negative(&self) -> bool {
        self.months < 0 || self.delta < TimeDelta::zero()
    }

    // == After ==
    /// Resolves the interval against `now`, saturating at the chrono range.
    ///
    /// Months are applied first, clamping to the end of shorter months, then
    /// the exact span.
    ///
    /// # Arguments
    /// * `now` - The instant the interval is added to
    ///
    /// # Returns
    /// The resulting instant, or `MIN_UTC`/`MAX_UTC` if it falls outside the
    /// representable range
    pub fn after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let shifted = if self.months >= 0 {
            now.checked_add_months(Months::new(self.months.unsigned_abs()))
        } else {
            now.checked_sub_months(Months::new(self.months.unsigned_abs()))
        };

        shifted
            .and_then(|instant| instant.checked_add_signed(self.delta))
            .unwrap_or(if self.is_negative() {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }
}

impl From<TimeDelta> for Interval {
    fn from(delta: TimeDelta) -> Self {
        Self::new(0, delta)
    }
}

impl FromStr for Interval {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CacheError::InvalidInterval(s.to_string());

        let (negative, unsigned) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let body = unsigned.strip_prefix('P').ok_or_else(invalid)?;
        let (date_part, time_part) = match body.split_once('T') {
            Some((_, "")) => return Err(invalid()),
            Some((date, time)) => (date, time),
            None => (body, ""),
        };

        let date = designators(date_part).ok_or_else(invalid)?;
        let time = designators(time_part).ok_or_else(invalid)?;
        if date.is_empty() && time.is_empty() {
            return Err(invalid());
        }

        let mut months: i64 = 0;
        let mut seconds: i64 = 0;
        for (value, unit) in date {
            let (total, factor) = match unit {
                'Y' => (&mut months, 12),
                'M' => (&mut months, 1),
                'W' => (&mut seconds, 7 * 86_400),
                'D' => (&mut seconds, 86_400),
                _ => return Err(invalid()),
            };
            let step = value.checked_mul(factor).ok_or_else(invalid)?;
            *total = total.checked_add(step).ok_or_else(invalid)?;
        }
        for (value, unit) in time {
            let factor = match unit {
                'H' => 3_600,
                'M' => 60,
                'S' => 1,
                _ => return Err(invalid()),
            };
            let step = value.checked_mul(factor).ok_or_else(invalid)?;
            seconds = seconds.checked_add(step).ok_or_else(invalid)?;
        }

        let sign = if negative { -1 } else { 1 };
        let months = i32::try_from(months * sign).map_err(|_| invalid())?;
        let delta = TimeDelta::try_seconds(seconds * sign).ok_or_else(invalid)?;
        Ok(Self::new(months, delta))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.is_negative();
        let months = self.months.unsigned_abs();
        let seconds = self.delta.num_seconds().unsigned_abs();

        if negative {
            f.write_str("-")?;
        }
        f.write_str("P")?;
        if months > 0 {
            write!(f, "{}M", months)?;
        }
        if seconds > 0 || months == 0 {
            write!(f, "T{}S", seconds)?;
        }
        Ok(())
    }
}

/// Splits `1Y2M` into `[(1, 'Y'), (2, 'M')]`; None on a dangling number or unit.
fn designators(part: &str) -> Option<Vec<(i64, char)>> {
    let mut out = Vec::new();
    let mut digits = String::new();

    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if digits.is_empty() {
                return None;
            }
            out.push((digits.parse().ok()?, c));
            digits.clear();
        }
    }

    digits.is_empty().then_some(out)
}
