//! Collective I/O of distributed fields and gridlines.
//!
//! The root worker (rank 0) alone touches the file system. Reading scatters
//! the owned blocks of a whole dataset to their workers, writing gathers them
//! back into global order. Every step ends in [`agree`], so a failure on one
//! worker is reported on all of them and nobody continues with partial data.

use std::path::Path;

use bytemuck::allocation::pod_collect_to_vec;
use bytemuck::cast_slice;
use log::info;

use crate::algs::collective::{agree, broadcast_bytes, gather_bytes, scatter_bytes};
use crate::algs::communicator::Communicator;
use crate::data::coordinates::Gridline;
use crate::data::field::{FieldStore, box_indices};
use crate::grid_error::GridError;
use crate::io::{Dataset, DatasetReader, DatasetWriter};
use crate::topology::grid::{AXIS_NAMES, DistributedGrid};

const ROOT: usize = 0;

/// Dataset shape of a field on `grid`: extents slowest first.
pub fn storage_shape(grid: &DistributedGrid) -> Vec<usize> {
    grid.shape().into_iter().rev().collect()
}

/// Block of worker `rank` as `[x, y, z]` ranges.
fn block(grid: &DistributedGrid, rank: usize) -> crate::data::field::IndexBox {
    let start = grid.start_of(rank);
    let count = grid.count_of(rank);
    [0, 1, 2].map(|a| start[a] as isize..(start[a] + count[a]) as isize)
}

fn global_offset(extents: [usize; 3], idx: [isize; 3]) -> usize {
    idx[0] as usize + extents[0] * (idx[1] as usize + extents[1] * idx[2] as usize)
}

fn check_shape(
    dataset: &Dataset,
    grid: &DistributedGrid,
    path: &Path,
    name: &str,
) -> Result<(), GridError> {
    let expected = storage_shape(grid);
    let multi_axis = dataset.shape.len() > 1;
    if dataset.data.len() != grid.global_len() || (multi_axis && dataset.shape != expected) {
        return Err(GridError::ShapeMismatch {
            context: format!("dataset `{name}` in `{}`", path.display()),
            expected,
            found: dataset.shape.clone(),
        });
    }
    Ok(())
}

/// Collective: fill the owned values of `field` from dataset `name`.
pub fn read_field<C, R>(
    comm: &C,
    reader: &R,
    path: &Path,
    name: &str,
    field: &mut FieldStore,
) -> Result<(), GridError>
where
    C: Communicator,
    R: DatasetReader + ?Sized,
{
    let grid = std::sync::Arc::clone(field.grid());
    let pieces = if comm.rank() == ROOT {
        let pieces = reader.read_dataset(path, name).and_then(|ds| {
            check_shape(&ds, &grid, path, name)?;
            let extents = grid.extents();
            Ok((0..comm.size())
                .map(|r| {
                    let values: Vec<f64> = box_indices(&block(&grid, r))
                        .map(|idx| ds.data[global_offset(extents, idx)])
                        .collect();
                    cast_slice::<f64, u8>(&values).to_vec()
                })
                .collect::<Vec<_>>())
        });
        pieces.map(Some)
    } else {
        Ok(None)
    };
    let pieces = agree(comm, "read field", pieces)?;
    let mine = scatter_bytes(comm, ROOT, pieces)?;
    let filled = field.set_owned_values(&pod_collect_to_vec::<u8, f64>(&mine));
    agree(comm, "read field", filled)?;
    if comm.rank() == ROOT {
        info!("read `{name}` from {}", path.display());
    }
    Ok(())
}

/// Collective: write the owned values of every worker as dataset `name`.
pub fn write_field<C, W>(
    comm: &C,
    writer: &W,
    path: &Path,
    name: &str,
    field: &FieldStore,
) -> Result<(), GridError>
where
    C: Communicator,
    W: DatasetWriter + ?Sized,
{
    let grid = field.grid();
    let gathered = gather_bytes(comm, ROOT, cast_slice(&field.owned_values()))?;
    let written = match gathered {
        Some(parts) => (|| {
            let extents = grid.extents();
            let mut data = vec![0.0; grid.global_len()];
            for (r, part) in parts.iter().enumerate() {
                let values = pod_collect_to_vec::<u8, f64>(part);
                let region = block(grid, r);
                if values.len() != crate::data::field::box_len(&region) {
                    return Err(GridError::Comm {
                        peer: r,
                        message: format!("owned block of `{name}` has {} values", values.len()),
                    });
                }
                for (idx, v) in box_indices(&region).zip(values) {
                    data[global_offset(extents, idx)] = v;
                }
            }
            let dataset = Dataset::new(storage_shape(grid), data)?;
            writer.write_dataset(path, name, &dataset)
        })(),
        None => Ok(()),
    };
    agree(comm, "write field", written)?;
    if comm.rank() == ROOT {
        info!("wrote `{name}` to {}", path.display());
    }
    Ok(())
}

/// Collective: read the gridlines `x`, `y` (and `z`) of a grid file.
///
/// A gridline's interval comes from the `lo`/`hi` attributes when present.
pub fn read_gridlines<C, R>(
    comm: &C,
    reader: &R,
    path: &Path,
    dim: usize,
) -> Result<Vec<Gridline>, GridError>
where
    C: Communicator,
    R: DatasetReader + ?Sized,
{
    let encoded = if comm.rank() == ROOT {
        (0..dim)
            .map(|a| {
                let ds = reader.read_dataset(path, AXIS_NAMES[a])?;
                let line = Gridline::from_points(ds.data)?;
                match (ds.attributes.get("lo"), ds.attributes.get("hi")) {
                    (Some(&lo), Some(&hi)) => line.with_interval(lo, hi),
                    _ => Ok(line),
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .and_then(|lines| {
                bincode::serialize(&lines).map_err(|e| GridError::Decode {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            })
    } else {
        Ok(Vec::new())
    };
    let encoded = agree(comm, "read gridlines", encoded)?;
    let bytes = broadcast_bytes(comm, ROOT, encoded)?;
    bincode::deserialize(&bytes).map_err(|e| GridError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Collective: write `lines` as datasets `x`, `y` (and `z`) with their
/// intervals as attributes.
pub fn write_gridlines<C, W>(
    comm: &C,
    writer: &W,
    path: &Path,
    lines: &[Gridline],
) -> Result<(), GridError>
where
    C: Communicator,
    W: DatasetWriter + ?Sized,
{
    let written = if comm.rank() == ROOT {
        lines.iter().zip(AXIS_NAMES).try_for_each(|(line, axis)| {
            let ds = Dataset::new(vec![line.len()], line.points().to_vec())?
                .with_attribute("lo", line.lo())
                .with_attribute("hi", line.hi());
            writer.write_dataset(path, axis, &ds)
        })
    } else {
        Ok(())
    };
    agree(comm, "write gridlines", written)
}
