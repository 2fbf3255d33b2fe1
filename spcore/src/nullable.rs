//! An `i64` that may carry no value at all.
//!
//! The aggregation algebra needs a "bottom" element: a robust bound
//! that does not exist yet. Bottom is *absorbing* for addition
//! (an offset applied to nothing is still nothing) and the
//! *identity* for `max` (nothing never wins). We tag explicitly
//! with an `Option` instead of hijacking `i64::MAX`, which would
//! alias a legitimate value after any addition overflowed into it.

use std::ops::Add;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Nullable(Option<i64>);

impl Nullable {
    pub const NONE: Nullable = Nullable(None);

    #[inline(always)]
    pub fn has_value(&self) -> bool {
        self.0.is_some()
    }

    #[inline(always)]
    pub fn value(&self) -> Option<i64> {
        self.0
    }

    /// Bottom is the identity: `max(bottom, x) = x`, and
    /// `max(bottom, bottom) = bottom`.
    #[inline(always)]
    pub fn max(self, other: Nullable) -> Nullable {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Nullable(Some(a.max(b))),
            (Some(a), None) => Nullable(Some(a)),
            (None, b) => Nullable(b),
        }
    }

    /// Strict comparison in which bottom loses against anything
    /// defined and nothing exceeds bottom... not even bottom.
    #[inline(always)]
    pub fn exceeds(self, other: Nullable) -> bool {
        match (self.0, other.0) {
            (Some(a), Some(b)) => a > b,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl From<i64> for Nullable {
    fn from(v: i64) -> Self {
        Nullable(Some(v))
    }
}

// Bottom is absorbing: offsetting a bound that does not exist
// cannot create one.
impl Add for Nullable {
    type Output = Nullable;

    fn add(self, other: Nullable) -> Nullable {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Nullable(Some(a + b)),
            _ => Nullable::NONE,
        }
    }
}

impl Add<i64> for Nullable {
    type Output = Nullable;

    fn add(self, other: i64) -> Nullable {
        Nullable(self.0.map(|a| a + other))
    }
}
