//! Event-time primitives.
//!
//! This module defines the three time types the rest of the engine is built
//! on:
//!
//! - [`Timestamp`]: a millisecond-precision instant, totally ordered and
//!   hashable, so it can key maps and be sorted deterministically.
//! - [`Duration`]: a signed millisecond span. Durations are closed under
//!   addition and subtraction, and a `Timestamp` shifts by a `Duration`.
//! - [`Span`]: a closed–open interval `[start, end)` — the unit of work the
//!   evaluator hands to every operator. All output knots of a batch must fall
//!   inside the batch's span.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A millisecond-precision instant.
///
/// Timestamps are plain signed milliseconds since an arbitrary epoch; the
/// engine only ever compares and shifts them, so the epoch never matters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Construct from raw milliseconds.
    #[inline]
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// The raw millisecond value.
    #[inline]
    pub const fn millis(self) -> i64 {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A signed span of time in milliseconds.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Duration(i64);

impl Duration {
    /// The zero-length duration.
    pub const ZERO: Duration = Duration(0);

    /// Construct from raw milliseconds.
    #[inline]
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Construct from whole seconds.
    #[inline]
    pub const fn from_secs(s: i64) -> Self {
        Self(s * 1_000)
    }

    /// The raw millisecond value.
    #[inline]
    pub const fn millis(self) -> i64 {
        self.0
    }

    /// True if this duration is strictly negative.
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// True if this duration is exactly zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;
    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;
    #[inline]
    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 - rhs.0)
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;
    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl Add for Duration {
    type Output = Duration;
    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl AddAssign for Duration {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Duration {
    type Output = Duration;
    #[inline]
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl SubAssign for Duration {
    #[inline]
    fn sub_assign(&mut self, rhs: Duration) {
        self.0 -= rhs.0;
    }
}

impl Neg for Duration {
    type Output = Duration;
    #[inline]
    fn neg(self) -> Duration {
        Duration(-self.0)
    }
}

/// A closed–open batch interval `[start, end)`.
///
/// Every call into an operator covers exactly one span; the operator must
/// return only knots whose timestamps fall inside it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Span {
    /// Inclusive batch start.
    pub start: Timestamp,
    /// Exclusive batch end.
    pub end: Timestamp,
}

impl Span {
    /// Construct a span `[start, end)`. Panics in debug builds if `end < start`.
    #[inline]
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(end >= start);
        Self { start, end }
    }

    /// True if the span contains no instants at all.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }

    /// True if `t` lies inside `[start, end)`.
    #[inline]
    pub fn contains(self, t: Timestamp) -> bool {
        self.start <= t && t < self.end
    }
}
