//! Grid-to-grid linear interpolation.
//!
//! Every locally owned destination point is located on each source gridline
//! independently ([`Gridline::locate`](crate::data::coordinates::Gridline::locate))
//! and receives the tensor-product combination of the bracketing source
//! values: bilinear in 2-D, trilinear in 3-D. Fields that are affine in each
//! coordinate are reproduced up to rounding.
//!
//! The source values must be locally available: halos exchanged beforehand
//! and, in [`ExteriorMode::Ghost`], exterior halos set. A destination grid
//! built with [`DistributedGrid::aligned_to`] satisfies this with a halo of
//! width 1 unless it reaches past the period of a periodic source axis;
//! [`Interpolator::halo_width`] gives the width any pair of grids needs. A
//! missing source value is reported as [`GridError::OutOfRange`].

use log::warn;
use serde::{Deserialize, Serialize};

use crate::data::coordinates::Bracket;
use crate::data::field::FieldStore;
use crate::grid_error::GridError;
use crate::topology::grid::DistributedGrid;

/// Treatment of destination points past a non-periodic source edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExteriorMode {
    /// Use the edge value (flat extrapolation).
    #[default]
    Clamp,
    /// Interpolate between the edge value and the exterior halo value placed
    /// at the mirrored ghost coordinate.
    Ghost,
}

impl std::str::FromStr for ExteriorMode {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clamp" => Ok(ExteriorMode::Clamp),
            "ghost" => Ok(ExteriorMode::Ghost),
            other => Err(GridError::Config(format!(
                "unknown exterior mode `{other}` (expected `clamp` or `ghost`)"
            ))),
        }
    }
}

/// Linear interpolation between fields on different grids.
#[derive(Clone, Copy, Debug, Default)]
pub struct Interpolator {
    mode: ExteriorMode,
}

impl Interpolator {
    pub fn new(mode: ExteriorMode) -> Self {
        Self { mode }
    }

    #[inline]
    pub fn mode(&self) -> ExteriorMode {
        self.mode
    }

    /// Overwrite the owned values of `dst` with values interpolated from `src`.
    ///
    /// No communication: `src` halos must already hold what the destination
    /// points read.
    pub fn interpolate(&self, src: &FieldStore, dst: &mut FieldStore) -> Result<(), GridError> {
        let sg = src.grid();
        let dg = dst.grid();
        if sg.dim() != dg.dim() {
            return Err(GridError::Dimension(format!(
                "cannot interpolate the {}-D field `{}` onto the {}-D field `{}`",
                sg.dim(),
                src.name(),
                dg.dim(),
                dst.name()
            )));
        }
        let ghost = self.mode == ExteriorMode::Ghost;
        let dim = sg.dim();

        // brackets are separable: compute them once per owned destination
        // index and axis
        let start = dg.owned_start();
        let count = dg.owned_count();
        let mut clamped = 0usize;
        let brackets: Vec<Vec<Bracket>> = (0..3)
            .map(|a| {
                (start[a]..start[a] + count[a])
                    .map(|i| {
                        if a >= dim {
                            return Bracket { lo: 0, t: 0.0, clamped: false };
                        }
                        let x = dg.line(a).points()[i];
                        let b = sg.line(a).locate(x, sg.is_periodic(a), ghost);
                        clamped += usize::from(b.clamped);
                        b
                    })
                    .collect()
            })
            .collect();
        if clamped > 0 {
            warn!(
                "rank {}: {clamped} destination gridline points of `{}` lie outside `{}` and were clamped",
                dg.rank(),
                dst.name(),
                src.name()
            );
        }

        let mut out = Vec::with_capacity(dst.owned_box().len());
        for idx in dst.owned_box().indices() {
            let local = [0, 1, 2].map(|a| (idx[a] - start[a] as isize) as usize);
            let bx = &brackets[0][local[0]];
            let by = &brackets[1][local[1]];
            let bz = &brackets[2][local[2]];
            let mut value = 0.0;
            for (k, wz) in bz.weights() {
                for (j, wy) in by.weights() {
                    for (i, wx) in bx.weights() {
                        value += wx * wy * wz * src.get([i, j, k])?;
                    }
                }
            }
            out.push(value);
        }
        dst.set_owned_values(&out)
    }
}

impl Interpolator {
    /// Smallest source halo width that holds every source value the owned
    /// points of `dst` read on this worker.
    ///
    /// Indices on a periodic axis count as available when one of their
    /// images one period away is stored. Local: callers take the maximum
    /// over all workers.
    pub fn halo_width(&self, src: &DistributedGrid, dst: &DistributedGrid) -> usize {
        let ghost = self.mode == ExteriorMode::Ghost;
        let start = dst.owned_start();
        let count = dst.owned_count();
        let src_start = src.owned_start();
        let src_count = src.owned_count();
        (0..src.dim().min(dst.dim()))
            .flat_map(move |a| {
                let line = src.line(a);
                let periodic = src.is_periodic(a);
                let n = line.len() as isize;
                let lo = src_start[a] as isize;
                let hi = lo + src_count[a] as isize - 1;
                let distance = move |i: isize| {
                    let shifts: &[isize] = if periodic { &[0, 1, -1] } else { &[0] };
                    shifts
                        .iter()
                        .map(|s| {
                            let j = i + s * n;
                            (lo - j).max(j - hi).max(0) as usize
                        })
                        .min()
                        .unwrap_or(0)
                };
                dst.line(a).points()[start[a]..start[a] + count[a]]
                    .iter()
                    .flat_map(move |&x| {
                        line.locate(x, periodic, ghost)
                            .weights()
                            .map(move |(i, _)| distance(i))
                    })
            })
            .max()
            .unwrap_or(0)
    }
}

/// [`Interpolator::interpolate`] with clamped exterior points.
pub fn interpolate(src: &FieldStore, dst: &mut FieldStore) -> Result<(), GridError> {
    Interpolator::default().interpolate(src, dst)
}
