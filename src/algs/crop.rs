//! Extraction of the points of a field inside a coordinate box.

use std::sync::Arc;

use log::debug;

use crate::algs::collective::{agree, allgather_u64};
use crate::algs::communicator::Communicator;
use crate::data::field::FieldStore;
use crate::grid_error::GridError;
use crate::topology::grid::{AXIS_NAMES, DistributedGrid};
use crate::topology::partition::Partition;

/// Collective: keep the points of `field` whose coordinates lie in
/// `bounds[a] = (lo, hi)` on every axis.
///
/// The cropped grid keeps the process grid of the input; each worker keeps
/// exactly the points it already owned, so only ownership counts travel.
/// A cropped axis is periodic only if it keeps every point.
pub fn crop<C: Communicator>(
    comm: &C,
    field: &FieldStore,
    bounds: &[(f64, f64)],
    name: &str,
) -> Result<FieldStore, GridError> {
    let grid = field.grid();
    let dim = grid.dim();
    let ranges = (|| {
        if bounds.len() != dim {
            return Err(GridError::Dimension(format!(
                "{} crop bounds for a {dim}-D grid",
                bounds.len()
            )));
        }
        (0..dim)
            .map(|a| {
                let (lo, hi) = bounds[a];
                let r = grid.line(a).bounding_indices(lo, hi);
                if r.is_empty() {
                    Err(GridError::Dimension(format!(
                        "no {} gridline point of `{}` lies in [{lo}, {hi}]",
                        AXIS_NAMES[a],
                        grid.name()
                    )))
                } else {
                    Ok(r)
                }
            })
            .collect::<Result<Vec<_>, _>>()
    })();
    let ranges = agree(comm, "crop", ranges)?;

    let start = grid.owned_start();
    let count = grid.owned_count();
    let kept: Vec<_> = (0..dim)
        .map(|a| {
            let lo = start[a].max(ranges[a].start);
            let hi = (start[a] + count[a]).min(ranges[a].end);
            lo..hi.max(lo)
        })
        .collect();
    let local: Vec<u64> = kept.iter().map(|r| r.len() as u64).collect();
    let table = allgather_u64(comm, &local)?;

    let cropped = (|| -> Result<FieldStore, GridError> {
        let procs = grid.process_grid();
        let partitions = (0..dim)
            .map(|a| {
                let counts = (0..procs.shape()[a])
                    .map(|p| {
                        let mut coords = [0usize; 3];
                        coords[a] = p;
                        let rank = procs.rank_of(coords);
                        table
                            .get(rank)
                            .and_then(|t| t.get(a))
                            .map(|&c| c as usize)
                            .ok_or_else(|| GridError::Comm {
                                peer: rank,
                                message: "missing cropped ownership".into(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Partition::from_counts(counts)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let lines = (0..dim)
            .map(|a| grid.line(a).sub(ranges[a].clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let periodic: Vec<bool> = (0..dim)
            .map(|a| grid.is_periodic(a) && ranges[a].len() == grid.extents()[a])
            .collect();
        let new_grid =
            DistributedGrid::from_parts(name, lines, &periodic, partitions, procs, grid.rank())?;
        let mut out = FieldStore::new(name, Arc::new(new_grid));
        let values = out
            .owned_box()
            .indices()
            .map(|idx| {
                let mut src = idx;
                for a in 0..dim {
                    src[a] += ranges[a].start as isize;
                }
                field.get(src)
            })
            .collect::<Result<Vec<_>, _>>()?;
        out.set_owned_values(&values)?;
        Ok(out)
    })();
    let out = agree(comm, "crop", cropped)?;
    debug!(
        "rank {}: cropped `{}` to `{}` with extents {:?}",
        grid.rank(),
        field.name(),
        name,
        out.grid().extents()
    );
    Ok(out)
}
