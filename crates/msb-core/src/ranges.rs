//! Disjoint, chronologically ordered presentation-time intervals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;
use std::slice::Iter;

use crate::time::TimeDelta;

/// A half-open `[start, end)` interval of presentation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeDelta,
    pub end: TimeDelta,
}

impl TimeRange {
    /// Length of the interval.
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn contains(&self, pos: TimeDelta) -> bool {
        self.start <= pos && pos < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Non-contiguous ranges of time, kept sorted and disjoint.
///
/// Adding an interval that overlaps or touches existing ones coalesces them
/// into a single entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    /// Create a new empty `TimeRanges`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `[start, end)`, merging with every range it overlaps or touches.
    ///
    /// Empty or inverted intervals are ignored.
    pub fn add(&mut self, start: TimeDelta, end: TimeDelta) {
        if start >= end {
            return;
        }

        let first = self.ranges.partition_point(|r| r.end < start);
        let mut merged = TimeRange { start, end };
        let mut last = first;
        while last < self.ranges.len() && self.ranges[last].start <= end {
            merged.start = merged.start.min(self.ranges[last].start);
            merged.end = merged.end.max(self.ranges[last].end);
            last += 1;
        }
        self.ranges.splice(first..last, std::iter::once(merged));
    }

    /// Returns the number of non-contiguous ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Start of the range at `idx`, or `None` when out of bounds.
    pub fn start(&self, idx: usize) -> Option<TimeDelta> {
        self.ranges.get(idx).map(|r| r.start)
    }

    /// End of the range at `idx`, or `None` when out of bounds.
    pub fn end(&self, idx: usize) -> Option<TimeDelta> {
        self.ranges.get(idx).map(|r| r.end)
    }

    /// Returns the range containing `pos`, if any.
    pub fn range_for(&self, pos: TimeDelta) -> Option<&TimeRange> {
        let idx = self.ranges.partition_point(|r| r.end <= pos);
        self.ranges.get(idx).filter(|r| r.start <= pos)
    }

    pub fn iter(&self) -> Iter<'_, TimeRange> {
        self.ranges.iter()
    }

    pub fn clear(&mut self) {
        self.ranges.clear()
    }
}

impl Index<usize> for TimeRanges {
    type Output = TimeRange;

    fn index(&self, index: usize) -> &Self::Output {
        &self.ranges[index]
    }
}

impl<'a> IntoIterator for &'a TimeRanges {
    type Item = &'a TimeRange;
    type IntoIter = Iter<'a, TimeRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

impl fmt::Display for TimeRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{r}")?;
        }
        write!(f, "}}")
    }
}
