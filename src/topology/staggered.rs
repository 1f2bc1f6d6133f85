//! Families of staggered grids sharing one decomposition.
//!
//! A [`StaggeredGridSet`] holds the cell-centred base grid and the grids of
//! the velocity and vorticity components derived from it. A component lives
//! on cell faces along its *shifted* axes. On a shifted axis that is not
//! periodic the boundary faces are not stored: the component has one index
//! less than the base and the last worker along that axis owns one index
//! less. Every other axis copies the base ownership, so all grids of a set
//! use the same process grid and every worker owns matching blocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::data::coordinates::Gridline;
use crate::debug_invariants::DebugInvariants;
use crate::grid_error::GridError;
use crate::topology::grid::{AXIS_NAMES, DistributedGrid, check_dim};
use crate::topology::partition::Partition;
use crate::topology::process_grid::ProcessGrid;

/// Member of a staggered grid family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    CellCentered,
    VelocityX,
    VelocityY,
    VelocityZ,
    VorticityX,
    VorticityY,
    VorticityZ,
}

impl Component {
    /// Components of a `dim`-dimensional family.
    pub fn all(dim: usize) -> &'static [Component] {
        use Component::*;
        if dim == 3 {
            &[
                CellCentered,
                VelocityX,
                VelocityY,
                VelocityZ,
                VorticityX,
                VorticityY,
                VorticityZ,
            ]
        } else {
            &[CellCentered, VelocityX, VelocityY, VorticityZ]
        }
    }

    /// Velocity component along `axis`.
    pub fn velocity(axis: usize) -> Option<Component> {
        [Component::VelocityX, Component::VelocityY, Component::VelocityZ]
            .get(axis)
            .copied()
    }

    /// Vorticity component along `axis`.
    pub fn vorticity(axis: usize) -> Option<Component> {
        [Component::VorticityX, Component::VorticityY, Component::VorticityZ]
            .get(axis)
            .copied()
    }

    /// Axes on which the component sits on cell faces.
    pub fn shifted(self) -> [bool; 3] {
        match self {
            Component::CellCentered => [false, false, false],
            Component::VelocityX => [true, false, false],
            Component::VelocityY => [false, true, false],
            Component::VelocityZ => [false, false, true],
            Component::VorticityX => [false, true, true],
            Component::VorticityY => [true, false, true],
            Component::VorticityZ => [true, true, false],
        }
    }

    /// Short name, also the stem of the component's grid file.
    pub fn name(self) -> &'static str {
        match self {
            Component::CellCentered => "cell-centered",
            Component::VelocityX => "staggered-x",
            Component::VelocityY => "staggered-y",
            Component::VelocityZ => "staggered-z",
            Component::VorticityX => "wx",
            Component::VorticityY => "wy",
            Component::VorticityZ => "wz",
        }
    }

    /// Whether the component exists in a `dim`-dimensional family.
    pub fn exists_in(self, dim: usize) -> bool {
        Component::all(dim).contains(&self)
    }
}

/// Gridlines of every component of a family.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComponentLines {
    lines: BTreeMap<Component, Vec<Gridline>>,
}

impl ComponentLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive every component's gridlines from the cell vertices.
    ///
    /// Cell centres are midpoints of consecutive vertices. Faces are the
    /// interior vertices on a non-periodic axis and all vertices but the
    /// first on a periodic one (the first face coincides with the last).
    pub fn from_nodes(nodes: &[Gridline], periodic: &[bool]) -> Result<Self, GridError> {
        let dim = check_dim(nodes.len())?;
        if periodic.len() != dim {
            return Err(GridError::Dimension(format!(
                "{dim} vertex gridlines but {} periodicity flags",
                periodic.len()
            )));
        }
        let mut centres = Vec::with_capacity(dim);
        let mut faces = Vec::with_capacity(dim);
        for (a, node) in nodes.iter().enumerate() {
            let n = node.len();
            if n < 2 || (!periodic[a] && n < 3) {
                return Err(GridError::Dimension(format!(
                    "{} axis has {n} vertices, too few for a staggered family",
                    AXIS_NAMES[a]
                )));
            }
            let node = node.clone().with_interval(node.points()[0], node.points()[n - 1])?;
            centres.push(node.centers()?);
            faces.push(if periodic[a] {
                node.sub(1..n)?
            } else {
                node.sub(1..n - 1)?
            });
        }
        let mut out = Self::new();
        for &c in Component::all(dim) {
            let shifted = c.shifted();
            let lines = (0..dim)
                .map(|a| if shifted[a] { faces[a].clone() } else { centres[a].clone() })
                .collect();
            out.insert(c, lines);
        }
        Ok(out)
    }

    /// Uniform cells on `[lo[a], hi[a]]` per axis.
    pub fn uniform(
        extents: &[usize],
        lo: &[f64],
        hi: &[f64],
        periodic: &[bool],
    ) -> Result<Self, GridError> {
        if lo.len() != extents.len() || hi.len() != extents.len() {
            return Err(GridError::Dimension(
                "domain bounds and extents differ in length".into(),
            ));
        }
        let nodes = extents
            .iter()
            .enumerate()
            .map(|(a, &n)| Gridline::nodes(n + 1, lo[a], hi[a]))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_nodes(&nodes, periodic)
    }

    /// Fill the vorticity components from the cell-centred and velocity
    /// gridlines: a shifted axis takes the face coordinates of the velocity
    /// along that axis, any other axis the cell centres.
    pub fn derive_vorticity(&mut self, dim: usize) -> Result<(), GridError> {
        let centres = self
            .get(Component::CellCentered)
            .ok_or_else(|| GridError::Config("no cell-centred gridlines".into()))?
            .to_vec();
        for axis in 0..3 {
            let Some(w) = Component::vorticity(axis).filter(|c| c.exists_in(dim)) else {
                continue;
            };
            let shifted = w.shifted();
            let lines = (0..dim)
                .map(|a| {
                    if !shifted[a] {
                        return Ok(centres[a].clone());
                    }
                    Component::velocity(a)
                        .and_then(|v| self.get(v))
                        .and_then(|l| l.get(a))
                        .cloned()
                        .ok_or_else(|| {
                            GridError::Config(format!(
                                "no {} velocity gridlines for `{}`",
                                AXIS_NAMES[a],
                                w.name()
                            ))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.insert(w, lines);
        }
        Ok(())
    }

    /// Set the gridlines of one component.
    pub fn insert(&mut self, component: Component, lines: Vec<Gridline>) {
        self.lines.insert(component, lines);
    }

    pub fn get(&self, component: Component) -> Option<&[Gridline]> {
        self.lines.get(&component).map(Vec::as_slice)
    }
}

/// Base grid plus derived component grids with matching ownership.
#[derive(Clone, Debug)]
pub struct StaggeredGridSet {
    dim: usize,
    periodic: Vec<bool>,
    grids: BTreeMap<Component, Arc<DistributedGrid>>,
}

impl StaggeredGridSet {
    /// Collective: build the family from the cell-centred extents.
    ///
    /// Ownership of the base grid is balanced over `procs` (or a decided
    /// layout); component ownership is derived from it. Fails with
    /// [`GridError::Dimension`] before any grid exists when a non-periodic
    /// axis is too short to drop a face.
    pub fn new<C: Communicator>(
        comm: &C,
        extents: &[usize],
        periodic: &[bool],
        lines: &ComponentLines,
        procs: Option<ProcessGrid>,
    ) -> Result<Self, GridError> {
        let local = (|| -> Result<Self, GridError> {
            let dim = check_dim(extents.len())?;
            if periodic.len() != dim {
                return Err(GridError::Dimension(format!(
                    "{dim} extents but {} periodicity flags",
                    periodic.len()
                )));
            }
            for a in 0..dim {
                if extents[a] == 0 || (!periodic[a] && extents[a] < 2) {
                    return Err(GridError::Dimension(format!(
                        "non-periodic {} axis of extent {} leaves no interior face",
                        AXIS_NAMES[a], extents[a]
                    )));
                }
            }
            let procs = match procs {
                Some(p) => {
                    p.validate_size(comm.size())?;
                    p
                }
                None => ProcessGrid::decide(extents, comm.size())?,
            };
            let base = (0..dim)
                .map(|a| Partition::new(extents[a], procs.shape()[a]))
                .collect::<Result<Vec<_>, _>>()?;
            let mut grids = BTreeMap::new();
            for &c in Component::all(dim) {
                let partitions = derive_partitions(&base, periodic, c)?;
                let component_lines = lines.get(c).ok_or_else(|| {
                    GridError::Config(format!("no gridlines for component `{}`", c.name()))
                })?;
                check_lines(c, component_lines, &partitions)?;
                let grid = DistributedGrid::from_parts(
                    c.name(),
                    component_lines.to_vec(),
                    periodic,
                    partitions,
                    procs,
                    comm.rank(),
                )?;
                grids.insert(c, Arc::new(grid));
            }
            let set = Self {
                dim,
                periodic: periodic.to_vec(),
                grids,
            };
            set.validate_invariants()?;
            Ok(set)
        })();
        let set = agree(comm, "create staggered grids", local)?;
        for (c, g) in &set.grids {
            debug!(
                "rank {}: `{}` extents {:?} owns {:?}+{:?}",
                g.rank(),
                c.name(),
                g.extents(),
                g.owned_start(),
                g.owned_count()
            );
        }
        Ok(set)
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn periodic(&self) -> &[bool] {
        &self.periodic
    }

    /// The cell-centred grid.
    pub fn base(&self) -> &Arc<DistributedGrid> {
        &self.grids[&Component::CellCentered]
    }

    /// Grid of `component`; [`GridError::Dimension`] if the component does
    /// not exist in this family (e.g. `VelocityZ` in 2-D).
    pub fn grid(&self, component: Component) -> Result<&Arc<DistributedGrid>, GridError> {
        self.grids.get(&component).ok_or_else(|| {
            GridError::Dimension(format!(
                "component `{}` does not exist in a {}-D family",
                component.name(),
                self.dim
            ))
        })
    }

    /// Grid of the velocity component along `axis`.
    pub fn velocity(&self, axis: usize) -> Result<&Arc<DistributedGrid>, GridError> {
        let c = Component::velocity(axis)
            .ok_or_else(|| GridError::Dimension(format!("no velocity along axis {axis}")))?;
        self.grid(c)
    }

    /// Grid of the vorticity component along `axis`.
    pub fn vorticity(&self, axis: usize) -> Result<&Arc<DistributedGrid>, GridError> {
        let c = Component::vorticity(axis)
            .ok_or_else(|| GridError::Dimension(format!("no vorticity along axis {axis}")))?;
        self.grid(c)
    }

    /// Components and their grids, base first.
    pub fn iter(&self) -> impl Iterator<Item = (Component, &Arc<DistributedGrid>)> {
        self.grids.iter().map(|(c, g)| (*c, g))
    }
}

/// Ownership of `component` derived from the base partitions.
pub fn derive_partitions(
    base: &[Partition],
    periodic: &[bool],
    component: Component,
) -> Result<Vec<Partition>, GridError> {
    let shifted = component.shifted();
    base.iter()
        .enumerate()
        .map(|(a, p)| {
            if shifted[a] && !periodic[a] {
                p.shrink_last()
            } else {
                Ok(p.clone())
            }
        })
        .collect()
}

fn check_lines(
    component: Component,
    lines: &[Gridline],
    partitions: &[Partition],
) -> Result<(), GridError> {
    let expected: Vec<usize> = partitions.iter().map(Partition::extent).collect();
    let found: Vec<usize> = lines.iter().map(Gridline::len).collect();
    if expected != found {
        return Err(GridError::ShapeMismatch {
            context: format!("gridlines of `{}`", component.name()),
            expected,
            found,
        });
    }
    Ok(())
}

impl DebugInvariants for StaggeredGridSet {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "StaggeredGridSet");
    }

    fn validate_invariants(&self) -> Result<(), GridError> {
        let base = self.base();
        for (c, grid) in &self.grids {
            grid.validate_invariants()?;
            if grid.process_grid() != base.process_grid() {
                return Err(base.layout_mismatch("process grid of component", grid));
            }
            let shifted = c.shifted();
            for a in 0..self.dim {
                let b = base.partition(a).counts();
                let g = grid.partition(a).counts();
                let aligned = if shifted[a] && !self.periodic[a] {
                    let last = b.len() - 1;
                    g[..last] == b[..last] && g[last] + 1 == b[last]
                } else {
                    g == b
                };
                if !aligned {
                    return Err(GridError::ShapeMismatch {
                        context: format!(
                            "{} ownership of `{}` against `{}`",
                            AXIS_NAMES[a],
                            c.name(),
                            base.name()
                        ),
                        expected: b.to_vec(),
                        found: g.to_vec(),
                    });
                }
            }
        }
        Ok(())
    }
}
