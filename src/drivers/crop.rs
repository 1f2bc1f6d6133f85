//! Cut a box out of a stored field.

use std::sync::Arc;

use log::info;

use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::algs::crop::crop;
use crate::config::CropOptions;
use crate::data::field::FieldStore;
use crate::grid_error::GridError;
use crate::io::Hierarchical;
use crate::io::partitioned::{read_field, write_field, write_gridlines};
use crate::topology::grid::DistributedGrid;

/// Collective: read `opts.source` on the gridlines of `opts.grid_path`, keep
/// the points inside the configured bounds and write the cropped field and
/// its gridlines.
pub fn run<C: Communicator>(comm: &C, opts: &CropOptions) -> Result<(), GridError> {
    agree(comm, "validate crop options", opts.validate())?;
    let lines = super::load_gridlines(comm, &opts.grid_path, &opts.grid)?;
    let grid = DistributedGrid::new(
        comm,
        &opts.name,
        lines,
        &opts.grid.periodic(),
        opts.grid.process_grid()?,
    )?;
    let mut field = FieldStore::new(&opts.name, Arc::new(grid));
    read_field(comm, &opts.encoding, &opts.source, &opts.name, &mut field)?;

    let cropped = crop(comm, &field, &opts.bounds(), &opts.name)?;
    super::ensure_parent(comm, &opts.destination)?;
    write_field(comm, &opts.encoding, &opts.destination, &opts.name, &cropped)?;
    let grid_path = opts.output_grid_path();
    super::ensure_parent(comm, &grid_path)?;
    write_gridlines(comm, &Hierarchical, &grid_path, cropped.grid().lines())?;
    if comm.rank() == 0 {
        info!(
            "cropped `{}` from {:?} to {:?}",
            opts.name,
            field.grid().extents(),
            cropped.grid().extents()
        );
    }
    Ok(())
}
