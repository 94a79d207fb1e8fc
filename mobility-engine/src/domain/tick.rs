//! Discrete simulation time.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// A point in discrete simulation time.
///
/// All temporal comparisons in the engine are made in ticks. Durations are
/// plain `i64` tick counts, so `Tick - Tick` yields an `i64` and
/// `Tick + i64` yields a `Tick`.
///
/// # Examples
///
/// ```
/// use mobility_engine::domain::Tick;
///
/// let depart = Tick::new(10);
/// let arrive = depart + 15;
/// assert_eq!(arrive - depart, 15);
/// assert!(arrive > depart);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tick(i64);

impl Tick {
    /// Create a tick from its raw value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw tick value.
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Returns the number of ticks from `earlier` to `self`, floored at zero.
    pub fn saturating_since(self, earlier: Tick) -> i64 {
        (self.0 - earlier.0).max(0)
    }
}

impl Add<i64> for Tick {
    type Output = Tick;

    fn add(self, rhs: i64) -> Tick {
        Tick(self.0.saturating_add(rhs))
    }
}

impl Sub<i64> for Tick {
    type Output = Tick;

    fn sub(self, rhs: i64) -> Tick {
        Tick(self.0.saturating_sub(rhs))
    }
}

impl Sub<Tick> for Tick {
    type Output = i64;

    fn sub(self, rhs: Tick) -> i64 {
        self.0.saturating_sub(rhs.0)
    }
}

impl From<i64> for Tick {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// An inclusive range of ticks, used to filter catalog listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickWindow {
    pub start: Tick,
    pub end: Tick,
}

impl TickWindow {
    /// Create a window. The bounds are swapped if given in reverse.
    pub fn new(start: Tick, end: Tick) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    /// Returns true if `tick` lies within the window (inclusive).
    pub fn contains(&self, tick: Tick) -> bool {
        tick >= self.start && tick <= self.end
    }
}
