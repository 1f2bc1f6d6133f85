//! Per-axis ownership ranges.
//!
//! A [`Partition`] splits the index range `0..extent` of one axis into
//! contiguous, rank-ordered blocks. It is built once when a grid is created
//! and never changes afterwards.

use std::ops::Range;

use crate::debug_invariants::DebugInvariants;
use crate::grid_error::GridError;

/// Contiguous, non-overlapping, rank-ordered blocks covering `0..extent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    extent: usize,
    starts: Vec<usize>,
    counts: Vec<usize>,
}

impl Partition {
    /// Balanced split of `extent` indices among `procs` workers.
    ///
    /// Counts differ by at most one; the first `extent % procs` workers get
    /// the extra index.
    pub fn new(extent: usize, procs: usize) -> Result<Self, GridError> {
        if extent == 0 {
            return Err(GridError::Dimension("axis extent must be at least 1".into()));
        }
        if procs == 0 {
            return Err(GridError::Dimension(
                "an axis needs at least one worker".into(),
            ));
        }
        if procs > extent {
            return Err(GridError::Dimension(format!(
                "cannot split {extent} indices among {procs} workers"
            )));
        }
        let base = extent / procs;
        let extra = extent % procs;
        let counts = (0..procs).map(|r| base + usize::from(r < extra)).collect();
        Self::from_counts(counts)
    }

    /// Partition with explicit per-worker counts (zero counts allowed).
    pub fn from_counts(counts: Vec<usize>) -> Result<Self, GridError> {
        if counts.is_empty() {
            return Err(GridError::Dimension(
                "an axis needs at least one worker".into(),
            ));
        }
        let mut starts = Vec::with_capacity(counts.len());
        let mut acc = 0usize;
        for &c in &counts {
            starts.push(acc);
            acc += c;
        }
        let part = Self {
            extent: acc,
            starts,
            counts,
        };
        part.debug_assert_invariants();
        Ok(part)
    }

    /// Same counts with the last worker's block one shorter.
    ///
    /// This is the ownership of a face-centred axis whose boundary faces are
    /// not stored.
    pub fn shrink_last(&self) -> Result<Self, GridError> {
        if self.extent < 2 {
            return Err(GridError::Dimension(format!(
                "extent {} leaves no interior faces",
                self.extent
            )));
        }
        let mut counts = self.counts.clone();
        let last = counts.len() - 1;
        if counts[last] == 0 {
            return Err(GridError::Dimension(format!(
                "last worker owns no index of an axis of extent {}",
                self.extent
            )));
        }
        counts[last] -= 1;
        if counts[last] == 0 && counts.len() > 1 {
            return Err(GridError::Dimension(format!(
                "last of {} workers would own no face of an axis of extent {}",
                counts.len(),
                self.extent
            )));
        }
        Self::from_counts(counts)
    }

    #[inline]
    pub fn extent(&self) -> usize {
        self.extent
    }

    /// Number of workers along this axis.
    #[inline]
    pub fn procs(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    #[inline]
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// `(start, count)` owned by worker `rank` along this axis.
    pub fn local_range(&self, rank: usize) -> Option<(usize, usize)> {
        Some((*self.starts.get(rank)?, self.counts[rank]))
    }

    /// Owned indices of worker `rank` as a range.
    pub fn range(&self, rank: usize) -> Option<Range<usize>> {
        self.local_range(rank).map(|(s, c)| s..s + c)
    }

    /// Worker owning global index `index`, `None` past the extent.
    pub fn owner_of(&self, index: usize) -> Option<usize> {
        if index >= self.extent {
            return None;
        }
        // last worker whose block starts at or before `index`; empty blocks
        // share their start with the next non-empty one and are skipped
        Some(self.starts.partition_point(|&s| s <= index) - 1)
    }
}

impl DebugInvariants for Partition {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Partition");
    }

    fn validate_invariants(&self) -> Result<(), GridError> {
        if self.starts.len() != self.counts.len() {
            return Err(GridError::Dimension(
                "partition starts and counts differ in length".into(),
            ));
        }
        let mut next = 0usize;
        for (rank, (&s, &c)) in self.starts.iter().zip(&self.counts).enumerate() {
            if s != next {
                return Err(GridError::Dimension(format!(
                    "block of worker {rank} starts at {s}, expected {next}"
                )));
            }
            next += c;
        }
        if next != self.extent {
            return Err(GridError::Dimension(format!(
                "partition covers {next} indices of {}",
                self.extent
            )));
        }
        Ok(())
    }
}
