//! Cartesian arrangement of workers.
//!
//! Ranks are laid out x-fastest: `rank = px + mx * (py + my * pz)`.

use crate::grid_error::GridError;

/// Number of workers along each axis; a 2-D layout has `mz == 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcessGrid {
    shape: [usize; 3],
}

impl ProcessGrid {
    /// Explicit layout; every axis needs at least one worker.
    pub fn new(shape: [usize; 3]) -> Result<Self, GridError> {
        if shape.iter().any(|&m| m == 0) {
            return Err(GridError::Config(format!(
                "process grid {shape:?} has an empty axis"
            )));
        }
        Ok(Self { shape })
    }

    /// Pick the layout of `size` workers over `extents` (2 or 3 axes) with the
    /// smallest subdomain surface.
    ///
    /// Each axis gets at most as many workers as it has indices; among equally
    /// good layouts the one with the most workers along x wins.
    pub fn decide(extents: &[usize], size: usize) -> Result<Self, GridError> {
        let dim = extents.len();
        if !(2..=3).contains(&dim) {
            return Err(GridError::Dimension(format!(
                "only 2-D and 3-D grids are supported, got {dim} axes"
            )));
        }
        if size == 0 {
            return Err(GridError::Config("no workers to lay out".into()));
        }
        let n = [
            extents[0],
            extents[1],
            if dim == 3 { extents[2] } else { 1 },
        ];
        let mut best: Option<(usize, [usize; 3])> = None;
        for mx in (1..=size).rev().filter(|m| size % m == 0) {
            let rest = size / mx;
            for my in (1..=rest).rev().filter(|m| rest % m == 0) {
                let mz = rest / my;
                let shape = [mx, my, mz];
                if (dim == 2 && mz != 1) || (0..3).any(|a| shape[a] > n[a]) {
                    continue;
                }
                let cost = surface(n, shape);
                if best.is_none_or(|(c, _)| cost < c) {
                    best = Some((cost, shape));
                }
            }
        }
        best.map(|(_, shape)| Self { shape }).ok_or_else(|| {
            GridError::Dimension(format!(
                "cannot lay out {size} workers over a grid of extents {extents:?}"
            ))
        })
    }

    /// Check that the layout uses exactly `size` workers.
    pub fn validate_size(&self, size: usize) -> Result<(), GridError> {
        if self.size() != size {
            return Err(GridError::Config(format!(
                "process grid {:?} needs {} workers, communicator has {size}",
                self.shape,
                self.size()
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Position of `rank` in the layout.
    pub fn coords(&self, rank: usize) -> [usize; 3] {
        let [mx, my, _] = self.shape;
        [rank % mx, (rank / mx) % my, rank / (mx * my)]
    }

    pub fn rank_of(&self, coords: [usize; 3]) -> usize {
        let [mx, my, _] = self.shape;
        coords[0] + mx * (coords[1] + my * coords[2])
    }

    /// Rank displaced by `offset` from `rank`; wraps on periodic axes,
    /// `None` past a non-periodic edge.
    pub fn neighbor(&self, rank: usize, offset: [isize; 3], periodic: [bool; 3]) -> Option<usize> {
        let c = self.coords(rank);
        let mut out = [0usize; 3];
        for a in 0..3 {
            let m = self.shape[a] as isize;
            let p = c[a] as isize + offset[a];
            out[a] = if (0..m).contains(&p) {
                p as usize
            } else if periodic[a] {
                p.rem_euclid(m) as usize
            } else {
                return None;
            };
        }
        Some(self.rank_of(out))
    }
}

fn surface(n: [usize; 3], shape: [usize; 3]) -> usize {
    let l: Vec<usize> = (0..3).map(|a| n[a].div_ceil(shape[a])).collect();
    l[0] * l[1] + l[1] * l[2] + l[0] * l[2]
}
