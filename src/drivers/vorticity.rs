//! Vorticity of every snapshot in a time-step range.
//!
//! Layout of a simulation directory:
//!
//! ```text
//! directory/grids/{cell-centered,staggered-x,staggered-y[,staggered-z]}.h5
//! directory/0000000/{ux,uy[,uz]}.h5
//! directory/0000100/...
//! ```
//!
//! Each snapshot gets `wz.h5` (and `wx.h5` in 3-D) in the matching folder
//! of the output directory, and the vorticity gridlines are written once to
//! `grids/wz.h5` (`grids/wx.h5`) there.

use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::algs::vorticity::VorticityEngine;
use crate::config::VorticityOptions;
use crate::data::field::FieldStore;
use crate::grid_error::GridError;
use crate::io::Hierarchical;
use crate::io::partitioned::{read_field, write_field, write_gridlines};
use crate::topology::grid::AXIS_NAMES;
use crate::topology::staggered::{Component, ComponentLines, StaggeredGridSet};

/// Vorticity components written per snapshot.
fn written_components(dim: usize) -> &'static [usize] {
    if dim == 3 { &[2, 0] } else { &[2] }
}

/// Collective: build the staggered family from the grid files of
/// `grids`.
pub fn load_family<C: Communicator>(
    comm: &C,
    grids: &Path,
    opts: &VorticityOptions,
) -> Result<StaggeredGridSet, GridError> {
    let dim = opts.grid.dim();
    let mut lines = ComponentLines::new();
    let read = |c: Component| {
        crate::io::partitioned::read_gridlines(
            comm,
            &Hierarchical,
            &grids.join(format!("{}.h5", c.name())),
            dim,
        )
    };
    let centres = super::load_gridlines(
        comm,
        &grids.join(format!("{}.h5", Component::CellCentered.name())),
        &opts.grid,
    )?;
    let extents: Vec<usize> = centres.iter().map(|l| l.len()).collect();
    lines.insert(Component::CellCentered, centres);
    for axis in 0..dim {
        if let Some(c) = Component::velocity(axis) {
            lines.insert(c, read(c)?);
        }
    }
    agree(comm, "derive vorticity gridlines", lines.derive_vorticity(dim))?;
    StaggeredGridSet::new(
        comm,
        &extents,
        &opts.grid.periodic(),
        &lines,
        opts.grid.process_grid()?,
    )
}

/// Collective: compute and write the vorticity of every time step.
pub fn run<C: Communicator>(comm: &C, opts: &VorticityOptions) -> Result<(), GridError> {
    agree(comm, "validate vorticity options", opts.validate())?;
    let dim = opts.grid.dim();
    let set = load_family(comm, &opts.grids_directory(), opts)?;
    let engine = VorticityEngine::new(&set);

    let out_grids = opts.output_directory().join("grids");
    super::ensure_directory(comm, &out_grids)?;
    for &axis in written_components(dim) {
        let grid = set.vorticity(axis)?;
        write_gridlines(
            comm,
            &Hierarchical,
            &out_grids.join(format!("{}.h5", grid.name())),
            grid.lines(),
        )?;
    }

    let mut velocity = (0..dim)
        .map(|a| {
            let grid = set.velocity(a)?;
            Ok(FieldStore::with_halo(
                &format!("u{}", AXIS_NAMES[a]),
                Arc::clone(grid),
                opts.grid.halo_width,
            ))
        })
        .collect::<Result<Vec<_>, GridError>>()?;

    for step in opts.steps.iter() {
        if comm.rank() == 0 {
            info!("[time-step {step}]");
        }
        let folder = super::snapshot_directory(&opts.directory, step);
        for u in velocity.iter_mut() {
            let name = u.name().to_string();
            read_field(comm, &Hierarchical, &folder.join(format!("{name}.h5")), &name, u)?;
        }
        let out_folder = super::snapshot_directory(opts.output_directory(), step);
        super::ensure_directory(comm, &out_folder)?;
        for &axis in written_components(dim) {
            let (b, c) = ((axis + 1) % 3, (axis + 2) % 3);
            let (ub, uc) = pair_mut(&mut velocity, b, c)?;
            let w = engine.compute(comm, axis, ub, uc)?;
            let name = w.name().to_string();
            write_field(comm, &Hierarchical, &out_folder.join(format!("{name}.h5")), &name, &w)?;
        }
    }
    Ok(())
}

/// Two distinct elements of `fields` borrowed mutably.
fn pair_mut(
    fields: &mut [FieldStore],
    b: usize,
    c: usize,
) -> Result<(&mut FieldStore, &mut FieldStore), GridError> {
    if b == c || b.max(c) >= fields.len() {
        return Err(GridError::Dimension(format!(
            "no velocity pair ({b}, {c}) among {} components",
            fields.len()
        )));
    }
    if b < c {
        let (lo, hi) = fields.split_at_mut(c);
        Ok((&mut lo[b], &mut hi[0]))
    } else {
        let (lo, hi) = fields.split_at_mut(b);
        Ok((&mut hi[0], &mut lo[c]))
    }
}
