//! Structured grids decomposed over a Cartesian layout of workers.
//!
//! A [`DistributedGrid`] couples one [`Gridline`] and one [`Partition`] per
//! axis with the [`ProcessGrid`] they are split over. Grids are 2-D or 3-D;
//! a 2-D grid is stored as a 3-D grid with a single z-plane so the rest of
//! the crate can index every grid with `[x, y, z]`.

use log::debug;

use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::algs::interpolate::ExteriorMode;
use crate::data::coordinates::Gridline;
use crate::debug_invariants::DebugInvariants;
use crate::grid_error::GridError;
use crate::topology::partition::Partition;
use crate::topology::process_grid::ProcessGrid;

/// Axis names used in messages and dataset names.
pub const AXIS_NAMES: [&str; 3] = ["x", "y", "z"];

/// One structured grid: coordinates, periodicity and ownership per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct DistributedGrid {
    name: String,
    dim: usize,
    lines: [Gridline; 3],
    partitions: [Partition; 3],
    periodic: [bool; 3],
    procs: ProcessGrid,
    rank: usize,
}

pub(crate) fn check_dim(dim: usize) -> Result<usize, GridError> {
    if (2..=3).contains(&dim) {
        Ok(dim)
    } else {
        Err(GridError::Dimension(format!(
            "only 2-D and 3-D grids are supported, got {dim} axes"
        )))
    }
}

fn flat_line() -> Result<Gridline, GridError> {
    Gridline::from_points(vec![0.0])
}

impl DistributedGrid {
    /// Collective: create a grid with balanced ownership on every axis.
    ///
    /// Without an explicit `procs` the layout is chosen by
    /// [`ProcessGrid::decide`].
    pub fn new<C: Communicator>(
        comm: &C,
        name: &str,
        lines: Vec<Gridline>,
        periodic: &[bool],
        procs: Option<ProcessGrid>,
    ) -> Result<Self, GridError> {
        let local = (|| -> Result<Self, GridError> {
            check_dim(lines.len())?;
            let extents: Vec<usize> = lines.iter().map(Gridline::len).collect();
            let procs = match procs {
                Some(p) => {
                    p.validate_size(comm.size())?;
                    p
                }
                None => ProcessGrid::decide(&extents, comm.size())?,
            };
            let partitions = extents
                .iter()
                .zip(procs.shape())
                .map(|(&n, m)| Partition::new(n, m))
                .collect::<Result<Vec<_>, _>>()?;
            Self::from_parts(name, lines, periodic, partitions, procs, comm.rank())
        })();
        let grid = agree(comm, "create grid", local)?;
        debug!(
            "rank {}: grid `{}` extents {:?} owns {:?}+{:?}",
            grid.rank,
            grid.name,
            grid.extents(),
            grid.owned_start(),
            grid.owned_count()
        );
        Ok(grid)
    }

    /// Assemble a grid from already derived partitions (no communication).
    pub fn from_parts(
        name: &str,
        lines: Vec<Gridline>,
        periodic: &[bool],
        partitions: Vec<Partition>,
        procs: ProcessGrid,
        rank: usize,
    ) -> Result<Self, GridError> {
        let dim = check_dim(lines.len())?;
        if periodic.len() != dim || partitions.len() != dim {
            return Err(GridError::Dimension(format!(
                "grid `{name}` has {dim} gridlines, {} periodicity flags and {} partitions",
                periodic.len(),
                partitions.len()
            )));
        }
        if rank >= procs.size() {
            return Err(GridError::Config(format!(
                "rank {rank} is outside a process grid of {} workers",
                procs.size()
            )));
        }
        let mut lines = lines.into_iter();
        let mut partitions = partitions.into_iter();
        let mut next_line = || lines.next().map_or_else(flat_line, Ok);
        let lines = [next_line()?, next_line()?, next_line()?];
        let mut next_part = || partitions.next().map_or_else(|| Partition::new(1, 1), Ok);
        let partitions = [next_part()?, next_part()?, next_part()?];
        let mut flags = [false; 3];
        flags[..dim].copy_from_slice(periodic);
        let grid = Self {
            name: name.to_string(),
            dim,
            lines,
            partitions,
            periodic: flags,
            procs,
            rank,
        };
        grid.validate_invariants()?;
        Ok(grid)
    }

    /// Collective: grid through `lines` whose ownership follows `source`.
    ///
    /// Every point is given to the worker owning the first source index its
    /// interpolation stencil reads, so a source field with a halo of width 1
    /// covers every local destination point. Points beyond the period of a
    /// periodic source axis go to the first or last worker of that axis and
    /// need a wider source halo, see
    /// [`Interpolator::halo_width`](crate::algs::interpolate::Interpolator::halo_width).
    /// Workers may end up owning no point of an axis.
    pub fn aligned_to<C: Communicator>(
        comm: &C,
        source: &DistributedGrid,
        name: &str,
        lines: Vec<Gridline>,
        periodic: &[bool],
        mode: ExteriorMode,
    ) -> Result<Self, GridError> {
        let local = (|| -> Result<Self, GridError> {
            if lines.len() != source.dim {
                return Err(GridError::Dimension(format!(
                    "cannot align a {}-D grid to the {}-D grid `{}`",
                    lines.len(),
                    source.dim,
                    source.name
                )));
            }
            let partitions = lines
                .iter()
                .enumerate()
                .map(|(axis, line)| source.aligned_partition(axis, line, mode))
                .collect::<Result<Vec<_>, _>>()?;
            Self::from_parts(name, lines, periodic, partitions, source.procs, comm.rank())
        })();
        let grid = agree(comm, "align grid", local)?;
        debug!(
            "rank {}: grid `{}` aligned to `{}` owns {:?}+{:?}",
            grid.rank,
            grid.name,
            source.name,
            grid.owned_start(),
            grid.owned_count()
        );
        Ok(grid)
    }

    fn aligned_partition(
        &self,
        axis: usize,
        line: &Gridline,
        mode: ExteriorMode,
    ) -> Result<Partition, GridError> {
        let src = &self.lines[axis];
        let part = &self.partitions[axis];
        let last = src.len() as isize - 1;
        let mut counts = vec![0usize; part.procs()];
        for &x in line.points() {
            // brackets past a periodic end keep counting up, so they stay
            // with the first or last worker and ownership never goes back
            let bracket = src.locate(x, self.periodic[axis], mode == ExteriorMode::Ghost);
            let first = bracket.first_index().clamp(0, last) as usize;
            let owner = part.owner_of(first).ok_or_else(|| {
                GridError::Dimension(format!("source index {first} has no owner"))
            })?;
            counts[owner] += 1;
        }
        Partition::from_counts(counts)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 2 or 3.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn process_grid(&self) -> ProcessGrid {
        self.procs
    }

    #[inline]
    pub fn line(&self, axis: usize) -> &Gridline {
        &self.lines[axis]
    }

    /// Gridlines of the first `dim` axes.
    pub fn lines(&self) -> &[Gridline] {
        &self.lines[..self.dim]
    }

    #[inline]
    pub fn partition(&self, axis: usize) -> &Partition {
        &self.partitions[axis]
    }

    #[inline]
    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    #[inline]
    pub fn periodicity(&self) -> [bool; 3] {
        self.periodic
    }

    /// Global extents; `1` on the z-axis of a 2-D grid.
    pub fn extents(&self) -> [usize; 3] {
        [0, 1, 2].map(|a| self.partitions[a].extent())
    }

    /// Global extents of the first `dim` axes.
    pub fn shape(&self) -> Vec<usize> {
        self.extents()[..self.dim].to_vec()
    }

    /// Total number of grid points.
    pub fn global_len(&self) -> usize {
        self.extents().iter().product()
    }

    /// Position of `rank` in the process grid.
    pub fn proc_coords(&self, rank: usize) -> [usize; 3] {
        self.procs.coords(rank)
    }

    /// First owned index per axis of worker `rank`.
    pub fn start_of(&self, rank: usize) -> [usize; 3] {
        let c = self.procs.coords(rank);
        [0, 1, 2].map(|a| self.partitions[a].starts()[c[a]])
    }

    /// Owned count per axis of worker `rank`.
    pub fn count_of(&self, rank: usize) -> [usize; 3] {
        let c = self.procs.coords(rank);
        [0, 1, 2].map(|a| self.partitions[a].counts()[c[a]])
    }

    pub fn owned_start(&self) -> [usize; 3] {
        self.start_of(self.rank)
    }

    pub fn owned_count(&self) -> [usize; 3] {
        self.count_of(self.rank)
    }

    /// Number of points owned by this worker.
    pub fn owned_len(&self) -> usize {
        self.owned_count().iter().product()
    }

    /// Coordinate of index `index` on `axis`, wrapped or mirrored outside
    /// the grid (see [`Gridline::coordinate`]).
    #[inline]
    pub fn coordinate(&self, axis: usize, index: isize) -> f64 {
        self.lines[axis].coordinate(index, self.periodic[axis])
    }

    /// Owned coordinates on `axis`.
    pub fn local_coordinates(&self, axis: usize) -> &[f64] {
        let s = self.owned_start()[axis];
        let c = self.owned_count()[axis];
        &self.lines[axis].points()[s..s + c]
    }

    /// Same extents, periodicity and ownership on every axis.
    pub fn same_layout(&self, other: &DistributedGrid) -> bool {
        self.dim == other.dim
            && self.periodic == other.periodic
            && self.partitions == other.partitions
            && self.procs == other.procs
    }

    pub(crate) fn layout_mismatch(&self, context: &str, other: &DistributedGrid) -> GridError {
        GridError::ShapeMismatch {
            context: format!("{context}: `{}` vs `{}`", self.name, other.name),
            expected: self.shape(),
            found: other.shape(),
        }
    }
}

impl DebugInvariants for DistributedGrid {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "DistributedGrid");
    }

    fn validate_invariants(&self) -> Result<(), GridError> {
        for a in 0..3 {
            self.lines[a].validate_invariants()?;
            self.partitions[a].validate_invariants()?;
            if self.lines[a].len() != self.partitions[a].extent() {
                return Err(GridError::ShapeMismatch {
                    context: format!(
                        "{} gridline of `{}` vs its partition",
                        AXIS_NAMES[a], self.name
                    ),
                    expected: vec![self.partitions[a].extent()],
                    found: vec![self.lines[a].len()],
                });
            }
            if self.partitions[a].procs() != self.procs.shape()[a] {
                return Err(GridError::Dimension(format!(
                    "{} partition of `{}` has {} workers, process grid {:?}",
                    AXIS_NAMES[a],
                    self.name,
                    self.partitions[a].procs(),
                    self.procs.shape()
                )));
            }
            let line = &self.lines[a];
            let span = line.points()[line.len() - 1] - line.points()[0];
            if self.periodic[a] && line.period() <= span {
                return Err(GridError::Config(format!(
                    "periodic {} axis of `{}` has period {} not larger than its points' span {span}",
                    AXIS_NAMES[a],
                    self.name,
                    line.period()
                )));
            }
        }
        Ok(())
    }
}
