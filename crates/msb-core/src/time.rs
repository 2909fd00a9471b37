//! Fixed-point microsecond time types.
//!
//! [`TimeDelta`] is a signed microsecond count used for presentation times and
//! durations. [`DecodeTimestamp`] wraps a `TimeDelta` so that decode order and
//! presentation order can never be mixed up by accident.
//!
//! Two sentinels sit outside the normal value range: [`TimeDelta::NO_TIMESTAMP`]
//! (`i64::MIN`) and [`TimeDelta::INFINITE`] (`i64::MAX`). Both serialize as the
//! raw integer, so they survive a serde round trip unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

// ---------------------------------------------------------------------------
// TimeDelta
// ---------------------------------------------------------------------------

/// A signed duration or presentation time with microsecond resolution.
///
/// Arithmetic saturates instead of wrapping.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeDelta(i64);

impl TimeDelta {
    /// Zero duration.
    pub const ZERO: TimeDelta = TimeDelta(0);

    /// "No timestamp" sentinel, the most negative representable value.
    pub const NO_TIMESTAMP: TimeDelta = TimeDelta(i64::MIN);

    /// "Infinite duration" sentinel, the largest representable value.
    pub const INFINITE: TimeDelta = TimeDelta(i64::MAX);

    #[must_use]
    pub const fn from_microseconds(us: i64) -> Self {
        Self(us)
    }

    #[must_use]
    pub const fn from_milliseconds(ms: i64) -> Self {
        Self(ms.saturating_mul(1_000))
    }

    #[must_use]
    pub const fn from_seconds(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    /// Build from fractional seconds, rounding to the nearest microsecond.
    #[must_use]
    pub fn from_seconds_f64(secs: f64) -> Self {
        let us = (secs * 1_000_000.0).round();
        if us.is_nan() {
            return Self::NO_TIMESTAMP;
        }
        // `as` saturates for out-of-range floats.
        Self(us as i64)
    }

    #[must_use]
    pub const fn in_microseconds(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn in_milliseconds(self) -> i64 {
        self.0 / 1_000
    }

    #[must_use]
    pub fn in_seconds_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    #[must_use]
    pub const fn is_no_timestamp(self) -> bool {
        self.0 == i64::MIN
    }

    #[must_use]
    pub const fn is_infinite(self) -> bool {
        self.0 == i64::MAX
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for TimeDelta {
    type Output = TimeDelta;

    fn add(self, rhs: TimeDelta) -> TimeDelta {
        TimeDelta(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for TimeDelta {
    fn add_assign(&mut self, rhs: TimeDelta) {
        *self = *self + rhs;
    }
}

impl Sub for TimeDelta {
    type Output = TimeDelta;

    fn sub(self, rhs: TimeDelta) -> TimeDelta {
        TimeDelta(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for TimeDelta {
    fn sub_assign(&mut self, rhs: TimeDelta) {
        *self = *self - rhs;
    }
}

impl Mul<i64> for TimeDelta {
    type Output = TimeDelta;

    fn mul(self, rhs: i64) -> TimeDelta {
        TimeDelta(self.0.saturating_mul(rhs))
    }
}

impl Neg for TimeDelta {
    type Output = TimeDelta;

    fn neg(self) -> TimeDelta {
        TimeDelta(self.0.saturating_neg())
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_no_timestamp() {
            write!(f, "none")
        } else if self.is_infinite() {
            write!(f, "inf")
        } else {
            write!(f, "{:.6}s", self.in_seconds_f64())
        }
    }
}

// ---------------------------------------------------------------------------
// DecodeTimestamp
// ---------------------------------------------------------------------------

/// A point on the decode timeline.
///
/// Kept distinct from presentation time; convert explicitly with
/// [`DecodeTimestamp::from_presentation_time`] and
/// [`DecodeTimestamp::to_presentation_time`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DecodeTimestamp(TimeDelta);

impl DecodeTimestamp {
    /// Decode timestamp zero.
    pub const ZERO: DecodeTimestamp = DecodeTimestamp(TimeDelta::ZERO);

    #[must_use]
    pub const fn from_presentation_time(time: TimeDelta) -> Self {
        Self(time)
    }

    #[must_use]
    pub const fn to_presentation_time(self) -> TimeDelta {
        self.0
    }

    #[must_use]
    pub const fn from_microseconds(us: i64) -> Self {
        Self(TimeDelta::from_microseconds(us))
    }

    #[must_use]
    pub const fn from_milliseconds(ms: i64) -> Self {
        Self(TimeDelta::from_milliseconds(ms))
    }

    #[must_use]
    pub const fn in_microseconds(self) -> i64 {
        self.0.in_microseconds()
    }

    #[must_use]
    pub fn in_seconds_f64(self) -> f64 {
        self.0.in_seconds_f64()
    }
}

impl Add<TimeDelta> for DecodeTimestamp {
    type Output = DecodeTimestamp;

    fn add(self, rhs: TimeDelta) -> DecodeTimestamp {
        DecodeTimestamp(self.0 + rhs)
    }
}

impl AddAssign<TimeDelta> for DecodeTimestamp {
    fn add_assign(&mut self, rhs: TimeDelta) {
        self.0 += rhs;
    }
}

impl Sub<TimeDelta> for DecodeTimestamp {
    type Output = DecodeTimestamp;

    fn sub(self, rhs: TimeDelta) -> DecodeTimestamp {
        DecodeTimestamp(self.0 - rhs)
    }
}

impl Sub for DecodeTimestamp {
    type Output = TimeDelta;

    fn sub(self, rhs: DecodeTimestamp) -> TimeDelta {
        self.0 - rhs.0
    }
}

impl fmt::Display for DecodeTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversions() {
        let t = TimeDelta::from_milliseconds(1_500);
        assert_eq!(t.in_microseconds(), 1_500_000);
        assert_eq!(t.in_milliseconds(), 1_500);
        assert_eq!(t.in_seconds_f64(), 1.5);
        assert_eq!(TimeDelta::from_seconds(2), TimeDelta::from_milliseconds(2_000));
        assert_eq!(TimeDelta::from_seconds_f64(0.000_25), TimeDelta::from_microseconds(250));
    }

    #[test]
    fn sentinels_sit_outside_normal_values() {
        let t = TimeDelta::from_seconds(3_600 * 24 * 365);
        assert!(TimeDelta::NO_TIMESTAMP < -t);
        assert!(TimeDelta::INFINITE > t);
        assert!(TimeDelta::NO_TIMESTAMP.is_no_timestamp());
        assert!(TimeDelta::INFINITE.is_infinite());
    }

    #[test]
    fn arithmetic_saturates() {
        assert_eq!(TimeDelta::INFINITE + TimeDelta::from_seconds(1), TimeDelta::INFINITE);
        assert_eq!(
            TimeDelta::NO_TIMESTAMP - TimeDelta::from_seconds(1),
            TimeDelta::NO_TIMESTAMP
        );
        assert_eq!(TimeDelta::from_milliseconds(10) * 2, TimeDelta::from_milliseconds(20));
    }

    #[test]
    fn sentinels_roundtrip_through_serde() {
        for t in [TimeDelta::NO_TIMESTAMP, TimeDelta::INFINITE, TimeDelta::ZERO] {
            let json = serde_json::to_string(&t).unwrap();
            let back: TimeDelta = serde_json::from_str(&json).unwrap();
            assert_eq!(back.in_microseconds(), t.in_microseconds());
        }
        assert_eq!(
            serde_json::to_string(&TimeDelta::NO_TIMESTAMP).unwrap(),
            i64::MIN.to_string()
        );
    }

    #[test]
    fn decode_timestamp_ordering_and_difference() {
        let a = DecodeTimestamp::from_milliseconds(10);
        let b = DecodeTimestamp::from_milliseconds(30);
        assert!(a < b);
        assert_eq!(b - a, TimeDelta::from_milliseconds(20));
        assert_eq!(a + TimeDelta::from_milliseconds(20), b);
        assert_eq!(
            DecodeTimestamp::from_presentation_time(TimeDelta::from_milliseconds(30)),
            b
        );
        assert_eq!(b.to_presentation_time(), TimeDelta::from_milliseconds(30));
    }

    #[test]
    fn display() {
        assert_eq!(TimeDelta::from_milliseconds(1_250).to_string(), "1.250000s");
        assert_eq!(TimeDelta::NO_TIMESTAMP.to_string(), "none");
        assert_eq!(TimeDelta::INFINITE.to_string(), "inf");
    }
}
