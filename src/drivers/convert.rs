//! Re-encode one field between the flat and hierarchical encodings.

use std::sync::Arc;

use log::info;

use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::config::ConvertOptions;
use crate::data::coordinates::Gridline;
use crate::data::field::FieldStore;
use crate::grid_error::GridError;
use crate::io::partitioned::{read_field, write_field};
use crate::topology::grid::DistributedGrid;

/// Collective: read `opts.source` in the source encoding of
/// `opts.direction` and write it to `opts.destination` in the other one.
///
/// The field travels through a distributed grid of the configured extents,
/// so a flat stream whose length disagrees with them is a
/// [`GridError::ShapeMismatch`]. Coordinates play no part.
pub fn run<C: Communicator>(comm: &C, opts: &ConvertOptions) -> Result<(), GridError> {
    agree(comm, "validate convert options", opts.validate())?;
    let extents = opts.grid.extents()?;
    let lines = extents
        .iter()
        .map(|&n| Gridline::uniform(n, 0.0, 1.0))
        .collect::<Result<Vec<_>, _>>()?;
    let grid = DistributedGrid::new(
        comm,
        &opts.name,
        lines,
        &opts.grid.periodic(),
        opts.grid.process_grid()?,
    )?;
    let mut field = FieldStore::new(&opts.name, Arc::new(grid));
    read_field(comm, &opts.direction.source(), &opts.source, &opts.name, &mut field)?;
    super::ensure_parent(comm, &opts.destination)?;
    write_field(
        comm,
        &opts.direction.destination(),
        &opts.destination,
        &opts.name,
        &field,
    )?;
    if comm.rank() == 0 {
        info!(
            "converted `{}` ({:?}) from {} to {}",
            opts.name,
            extents,
            opts.source.display(),
            opts.destination.display()
        );
    }
    Ok(())
}
