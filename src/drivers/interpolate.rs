//! Interpolate a field stored on one grid onto another grid.

use std::sync::Arc;

use log::info;

use crate::algs::collective::{agree, allgather_u64};
use crate::algs::communicator::Communicator;
use crate::algs::interpolate::Interpolator;
use crate::config::InterpolateOptions;
use crate::data::bc::ExteriorHalo;
use crate::data::field::FieldStore;
use crate::grid_error::GridError;
use crate::io::partitioned::{read_field, write_field};
use crate::topology::grid::DistributedGrid;

/// Collective: read the source field, fill its halos, interpolate onto the
/// destination gridlines and write the destination field.
///
/// The destination grid is decomposed to follow the source
/// ([`DistributedGrid::aligned_to`]), so `destination.grid.process_grid` is
/// not used. The source halo is widened past `source.grid.halo_width` when
/// destination points reach further, and its exterior cells are filled with
/// `source.exterior` before interpolating.
pub fn run<C: Communicator>(comm: &C, opts: &InterpolateOptions) -> Result<(), GridError> {
    agree(comm, "validate interpolate options", opts.validate())?;
    let src = &opts.source;
    let dst = &opts.destination;

    let src_lines = super::load_gridlines(comm, &src.grid_path, &src.grid)?;
    let src_grid = Arc::new(DistributedGrid::new(
        comm,
        "source",
        src_lines,
        &src.grid.periodic(),
        src.grid.process_grid()?,
    )?);
    let dst_lines = super::load_gridlines(comm, &dst.grid_path, &dst.grid)?;
    let dst_grid = Arc::new(DistributedGrid::aligned_to(
        comm,
        &src_grid,
        "destination",
        dst_lines,
        &dst.grid.periodic(),
        opts.mode,
    )?);

    let interpolator = Interpolator::new(opts.mode);
    let reach = interpolator.halo_width(&src_grid, &dst_grid) as u64;
    let reach = allgather_u64(comm, &[reach])?
        .iter()
        .flatten()
        .copied()
        .max()
        .unwrap_or(0) as usize;
    let width = src.grid.halo_width.max(reach);
    if width > src.grid.halo_width && comm.rank() == 0 {
        info!(
            "widening the halo of `{}` from {} to {width} to reach every destination point",
            src.name, src.grid.halo_width
        );
    }
    let mut source = FieldStore::with_halo(&src.name, Arc::clone(&src_grid), width);
    read_field(comm, &src.encoding, &src.path, &src.name, &mut source)?;
    source.exchange_halo(comm)?;
    source.set_exterior_halo(&ExteriorHalo::from(src.exterior))?;

    let mut destination = FieldStore::new(&dst.name, dst_grid);
    let done = interpolator.interpolate(&source, &mut destination);
    agree(comm, "interpolate", done)?;

    super::ensure_parent(comm, &dst.path)?;
    write_field(comm, &dst.encoding, &dst.path, &dst.name, &destination)?;
    if comm.rank() == 0 {
        info!(
            "interpolated `{}` {:?} onto `{}` {:?}",
            src.name,
            src_grid.extents(),
            dst.name,
            destination.grid().extents()
        );
    }
    Ok(())
}
