//! Closed integer ranges over versions.
//!
//! A [`Range`] is the validity interval of a graph entity: the set of
//! versions for which that entity (or one of its historic snapshots) is the
//! authoritative property holder.
//!
//! # Semantics
//!
//! | Operation | Result |
//! |-----------|--------|
//! | `intersect` | `None` (NIL) when disjoint, the shared point when touching, else the overlap |
//! | `union` | `{a, b}` when disjoint, `{a}` when equal, else the merged range |
//! | `overlaps` | `intersect(..).is_some()` |
//! | `contains` | `from <= point <= to` |
//! | `compact` | minimal sorted, pairwise-disjoint cover of the inputs |
//!
//! Both ends are inclusive. The open upper bound is [`Range::OPEN_END`].
//!
//! # Example
//!
//! ```rust
//! use chronograph::models::Range;
//!
//! let a = Range::new(1, 3)?;
//! let b = Range::new(3, 5)?;
//! assert_eq!(a.intersect(&b), Some(Range::point(3)));
//!
//! let live = Range::open(4);
//! assert!(live.contains(1_000));
//! assert!(!live.contains(3));
//! # Ok::<(), chronograph::Error>(())
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A closed interval `[from, to]` of versions.
///
/// Ordered by `from`, then by `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct Range {
    from: u64,
    to: u64,
}

/// Unchecked wire form, validated on deserialization.
#[derive(Serialize, Deserialize)]
struct RawRange {
    from: u64,
    to: u64,
}

impl TryFrom<RawRange> for Range {
    type Error = Error;

    fn try_from(raw: RawRange) -> Result<Self> {
        Self::new(raw.from, raw.to)
    }
}

impl From<Range> for RawRange {
    fn from(range: Range) -> Self {
        Self {
            from: range.from,
            to: range.to,
        }
    }
}

impl Range {
    /// Upper bound of a range that is still open.
    ///
    /// This is the largest value a validity stamp can hold, since stamps are
    /// stored as signed integer properties.
    #[allow(clippy::cast_sign_loss)]
    pub const OPEN_END: u64 = i64::MAX as u64;

    /// Creates the range `[from, to]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `from > to`.
    pub const fn new(from: u64, to: u64) -> Result<Self> {
        if from > to {
            return Err(Error::InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// Creates the open range `[from, OPEN_END]`.
    #[must_use]
    pub const fn open(from: u64) -> Self {
        let from = if from > Self::OPEN_END {
            Self::OPEN_END
        } else {
            from
        };
        Self {
            from,
            to: Self::OPEN_END,
        }
    }

    /// Creates the single-point range `[point, point]`.
    #[must_use]
    pub const fn point(point: u64) -> Self {
        Self {
            from: point,
            to: point,
        }
    }

    /// Returns the inclusive lower bound.
    #[must_use]
    pub const fn from(&self) -> u64 {
        self.from
    }

    /// Returns the inclusive upper bound.
    #[must_use]
    pub const fn to(&self) -> u64 {
        self.to
    }

    /// Returns true if the upper bound is [`Range::OPEN_END`].
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.to == Self::OPEN_END
    }

    /// Checks whether `point` lies within the range.
    #[must_use]
    pub const fn contains(&self, point: u64) -> bool {
        point >= self.from && point <= self.to
    }

    /// Returns the intersection of two ranges, or `None` if they are disjoint.
    ///
    /// Ranges that only touch at one point intersect in that point.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if self.to < other.from || self.from > other.to {
            return None;
        }
        if self.to == other.from {
            return Some(Self::point(self.to));
        }
        if self.from == other.to {
            return Some(Self::point(self.from));
        }
        Some(Self {
            from: self.from.max(other.from),
            to: self.to.min(other.to),
        })
    }

    /// Returns the union of two ranges.
    ///
    /// Disjoint ranges stay separate; anything else merges into one range.
    #[must_use]
    pub fn union(&self, other: &Self) -> BTreeSet<Self> {
        if !self.overlaps(other) {
            return BTreeSet::from([*self, *other]);
        }
        if self == other {
            return BTreeSet::from([*self]);
        }
        BTreeSet::from([self.merge(other)])
    }

    /// Checks whether the two ranges share at least one point.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.intersect(other).is_some()
    }

    /// Returns a copy of this range ending at `to`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `to` is before the lower bound.
    pub const fn close_at(&self, to: u64) -> Result<Self> {
        Self::new(self.from, to)
    }

    /// Merges a set of ranges into a minimal, sorted, pairwise-disjoint cover.
    ///
    /// Each pass takes the first remaining range and keeps absorbing any other
    /// range that overlaps it, restarting the scan after every absorption since
    /// a grown range may now reach ranges skipped earlier.
    #[must_use]
    pub fn compact<I>(ranges: I) -> Vec<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut remaining: Vec<Self> = ranges.into_iter().collect();
        let mut result = Vec::new();

        while !remaining.is_empty() {
            let mut current = remaining.remove(0);
            while let Some(index) = remaining.iter().position(|r| current.overlaps(r)) {
                let absorbed = remaining.remove(index);
                current = current.merge(&absorbed);
            }
            result.push(current);
        }

        result.sort();
        result
    }

    const fn merge(&self, other: &Self) -> Self {
        let from = if self.from < other.from {
            self.from
        } else {
            other.from
        };
        let to = if self.to > other.to {
            self.to
        } else {
            other.to
        };
        Self { from, to }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_open() {
            write!(f, "[{}, ∞)", self.from)
        } else {
            write!(f, "[{}, {}]", self.from, self.to)
        }
    }
}
