//! Gridlines: the coordinate sequence of one grid axis.
//!
//! A [`Gridline`] is a strictly increasing list of points together with the
//! physical interval `[lo, hi]` they live in. On a periodic axis the interval
//! length is the period; on a non-periodic axis the interval bounds are the
//! planes ghost coordinates are mirrored about.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::debug_invariants::DebugInvariants;
use crate::grid_error::GridError;

/// Strictly increasing coordinates of one axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gridline {
    points: Vec<f64>,
    lo: f64,
    hi: f64,
}

/// Position of a coordinate relative to a gridline.
///
/// The coordinate sits between index `lo` and `lo + 1` at fraction `t`.
/// `lo` lies outside `0..len - 1` when the bracket spans a periodic wrap, an
/// exterior ghost point or a coordinate beyond the first period.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bracket {
    pub lo: isize,
    pub t: f64,
    /// The coordinate lay outside the interval covered by the bracket.
    pub clamped: bool,
}

impl Bracket {
    /// `(index, weight)` pairs with non-zero weight.
    pub fn weights(&self) -> impl Iterator<Item = (isize, f64)> + use<> {
        let left = (self.t != 1.0).then_some((self.lo, 1.0 - self.t));
        let right = (self.t != 0.0).then_some((self.lo + 1, self.t));
        left.into_iter().chain(right)
    }

    /// Smallest index carrying a non-zero weight.
    pub fn first_index(&self) -> isize {
        if self.t == 1.0 { self.lo + 1 } else { self.lo }
    }
}

impl Gridline {
    /// `n` cell centres of a uniform subdivision of `[lo, hi]`.
    pub fn uniform(n: usize, lo: f64, hi: f64) -> Result<Self, GridError> {
        check_interval(n, lo, hi)?;
        let h = (hi - lo) / n as f64;
        let points = (0..n).map(|i| lo + (i as f64 + 0.5) * h).collect();
        Self::checked(points, lo, hi)
    }

    /// `n` equally spaced vertices including both ends of `[lo, hi]`.
    pub fn nodes(n: usize, lo: f64, hi: f64) -> Result<Self, GridError> {
        if n < 2 {
            return Err(GridError::Dimension(format!(
                "a vertex gridline needs at least 2 points, got {n}"
            )));
        }
        check_interval(n, lo, hi)?;
        let h = (hi - lo) / (n - 1) as f64;
        let mut points: Vec<f64> = (0..n).map(|i| lo + i as f64 * h).collect();
        points[n - 1] = hi;
        Self::checked(points, lo, hi)
    }

    /// Centres of `n` cells whose widths grow geometrically by `ratio`.
    ///
    /// The first cell has width `h = (hi - lo)(ratio - 1)/(ratio^n - 1)`,
    /// cell `i` has width `h * ratio^i`; `ratio == 1` is [`Gridline::uniform`].
    pub fn stretched(n: usize, lo: f64, hi: f64, ratio: f64) -> Result<Self, GridError> {
        check_interval(n, lo, hi)?;
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(GridError::Config(format!(
                "stretching ratio must be positive, got {ratio}"
            )));
        }
        if ratio == 1.0 {
            return Self::uniform(n, lo, hi);
        }
        let h = (hi - lo) * (ratio - 1.0) / (ratio.powi(n as i32) - 1.0);
        let mut points = Vec::with_capacity(n);
        let mut face = lo;
        let mut width = h;
        for _ in 0..n {
            points.push(face + 0.5 * width);
            face += width;
            width *= ratio;
        }
        Self::checked(points, lo, hi)
    }

    /// Gridline through explicit points.
    ///
    /// The interval extends half an end spacing past the first and last point,
    /// which is the cell boundary of a cell-centred line.
    pub fn from_points(points: Vec<f64>) -> Result<Self, GridError> {
        let (lo, hi) = match points.as_slice() {
            [] => {
                return Err(GridError::Dimension("a gridline needs at least 1 point".into()));
            }
            [p] => (*p, *p),
            [a, b, ..] => {
                let n = points.len();
                let (y, z) = (points[n - 2], points[n - 1]);
                (a - 0.5 * (b - a), z + 0.5 * (z - y))
            }
        };
        Self::checked(points, lo, hi)
    }

    /// Same points inside another interval.
    pub fn with_interval(self, lo: f64, hi: f64) -> Result<Self, GridError> {
        Self::checked(self.points, lo, hi)
    }

    fn checked(points: Vec<f64>, lo: f64, hi: f64) -> Result<Self, GridError> {
        let line = Self { points, lo, hi };
        line.validate_invariants()?;
        Ok(line)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    #[inline]
    pub fn lo(&self) -> f64 {
        self.lo
    }

    #[inline]
    pub fn hi(&self) -> f64 {
        self.hi
    }

    /// Interval length; the period of a periodic axis.
    #[inline]
    pub fn period(&self) -> f64 {
        self.hi - self.lo
    }

    /// Midpoints of consecutive points, in the same interval.
    pub fn centers(&self) -> Result<Self, GridError> {
        if self.len() < 2 {
            return Err(GridError::Dimension(
                "midpoints need at least 2 points".into(),
            ));
        }
        let points = self.points.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        Self::checked(points, self.lo, self.hi)
    }

    /// Sub-sequence `range`, in the same interval.
    pub fn sub(&self, range: Range<usize>) -> Result<Self, GridError> {
        let points = self
            .points
            .get(range.clone())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                GridError::Dimension(format!(
                    "range {range:?} selects no point of a gridline of length {}",
                    self.len()
                ))
            })?
            .to_vec();
        Self::checked(points, self.lo, self.hi)
    }

    /// Interval index `k` with `x_k <= x < x_{k+1}`, `None` outside the line.
    pub fn bracket(&self, x: f64) -> Option<usize> {
        let k = self.points.partition_point(|&p| p <= x);
        (k > 0 && k < self.len()).then(|| k - 1)
    }

    /// `x_{i+1} - x_i`, `None` past the last interval.
    pub fn spacing(&self, i: usize) -> Option<f64> {
        Some(self.points.get(i + 1)? - self.points[i])
    }

    /// Indices of the points inside `[lo, hi]`.
    pub fn bounding_indices(&self, lo: f64, hi: f64) -> Range<usize> {
        let start = self.points.partition_point(|&p| p < lo);
        let end = self.points.partition_point(|&p| p <= hi).max(start);
        start..end
    }

    /// Coordinate of any integer index.
    ///
    /// Indices outside `0..len` are shifted by whole periods on a periodic
    /// axis and mirrored about the interval bounds otherwise.
    pub fn coordinate(&self, index: isize, periodic: bool) -> f64 {
        let n = self.len() as isize;
        if (0..n).contains(&index) {
            self.points[index as usize]
        } else if periodic {
            let wraps = index.div_euclid(n) as f64;
            self.points[index.rem_euclid(n) as usize] + wraps * self.period()
        } else {
            self.ghost_coordinate(index)
        }
    }

    fn ghost_coordinate(&self, index: isize) -> f64 {
        let n = self.len() as isize;
        let last = n - 1;
        if index < 0 {
            // a point lying on the boundary is its own mirror image
            let skip = isize::from(self.points[0] <= self.lo);
            let mirrored = (-index - 1 + skip).min(last);
            2.0 * self.lo - self.points[mirrored as usize]
        } else {
            let skip = isize::from(self.points[last as usize] >= self.hi);
            let mirrored = (last - (index - n) - skip).max(0);
            2.0 * self.hi - self.points[mirrored as usize]
        }
    }

    /// Locate `x` for linear interpolation.
    ///
    /// Periodic axes wrap `x` into the period to find the bracket, then shift
    /// its indices back by the whole periods removed, so the indices grow
    /// with `x` and name a periodic image of the source points. On a
    /// non-periodic axis a coordinate outside the points is clamped to the
    /// edge value, or, when `ghost` is set, bracketed against the first
    /// exterior ghost point.
    pub fn locate(&self, x: f64, periodic: bool, ghost: bool) -> Bracket {
        let n = self.len();
        let p = &self.points;
        if n == 1 {
            return Bracket {
                lo: 0,
                t: 0.0,
                clamped: !periodic && x != p[0],
            };
        }
        let (first, last) = (p[0], p[n - 1]);
        if periodic {
            let period = self.period();
            let wraps = (x - self.lo).div_euclid(period) as isize;
            let x = self.lo + (x - self.lo).rem_euclid(period);
            let mut b = if x < first {
                let before = last - period;
                Bracket { lo: -1, t: (x - before) / (first - before), clamped: false }
            } else if x >= last {
                let after = first + period;
                Bracket { lo: n as isize - 1, t: (x - last) / (after - last), clamped: false }
            } else {
                self.interior(x)
            };
            b.lo += wraps * n as isize;
            return b;
        }
        if x < first {
            if ghost {
                let g = self.ghost_coordinate(-1);
                let t = ((x - g) / (first - g)).max(0.0);
                return Bracket { lo: -1, t, clamped: x < g };
            }
            Bracket { lo: 0, t: 0.0, clamped: true }
        } else if x > last {
            if ghost {
                let g = self.ghost_coordinate(n as isize);
                let t = ((x - last) / (g - last)).min(1.0);
                return Bracket { lo: n as isize - 1, t, clamped: x > g };
            }
            Bracket { lo: n as isize - 2, t: 1.0, clamped: true }
        } else {
            self.interior(x)
        }
    }

    fn interior(&self, x: f64) -> Bracket {
        let p = &self.points;
        let k = (p.partition_point(|&q| q <= x) - 1).min(p.len() - 2);
        Bracket {
            lo: k as isize,
            t: (x - p[k]) / (p[k + 1] - p[k]),
            clamped: false,
        }
    }
}

fn check_interval(n: usize, lo: f64, hi: f64) -> Result<(), GridError> {
    if n == 0 {
        return Err(GridError::Dimension("a gridline needs at least 1 point".into()));
    }
    if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        return Err(GridError::Config(format!("invalid interval [{lo}, {hi}]")));
    }
    Ok(())
}

impl DebugInvariants for Gridline {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Gridline");
    }

    fn validate_invariants(&self) -> Result<(), GridError> {
        if self.points.is_empty() {
            return Err(GridError::Dimension("a gridline needs at least 1 point".into()));
        }
        if let Some(bad) = self.points.iter().position(|p| !p.is_finite()) {
            return Err(GridError::NonMonotonic {
                index: bad,
                prev: self.points[bad],
                next: self.points[bad],
            });
        }
        for (i, w) in self.points.windows(2).enumerate() {
            if w[0] >= w[1] {
                return Err(GridError::NonMonotonic {
                    index: i + 1,
                    prev: w[0],
                    next: w[1],
                });
            }
        }
        let (first, last) = (self.points[0], self.points[self.points.len() - 1]);
        if !(self.lo <= first && last <= self.hi) {
            return Err(GridError::Config(format!(
                "points [{first}, {last}] lie outside the interval [{}, {}]",
                self.lo, self.hi
            )));
        }
        Ok(())
    }
}
