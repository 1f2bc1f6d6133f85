//! Collective entry points of the command-line tools.
//!
//! A driver validates its options, builds grids and fields, runs one
//! algorithm and writes the result. Every worker of `comm` must call the same
//! driver with the same options.

pub mod convert;
pub mod crop;
pub mod interpolate;
pub mod vorticity;

use std::fs;
use std::path::{Path, PathBuf};

use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::config::GridOptions;
use crate::data::coordinates::Gridline;
use crate::grid_error::GridError;
use crate::io::Hierarchical;
use crate::io::partitioned::read_gridlines;

/// Folder of time step `step` inside `directory` (`directory/0000100`).
pub fn snapshot_directory(directory: &Path, step: u64) -> PathBuf {
    directory.join(format!("{step:07}"))
}

/// Collective: create `directory` (and its parents) on the root worker.
pub fn ensure_directory<C: Communicator>(comm: &C, directory: &Path) -> Result<(), GridError> {
    let created = if comm.rank() == 0 && !directory.as_os_str().is_empty() {
        fs::create_dir_all(directory).map_err(|e| GridError::io(directory, e))
    } else {
        Ok(())
    };
    agree(comm, "create directory", created)
}

/// Collective: create the parent directory of `path`.
pub fn ensure_parent<C: Communicator>(comm: &C, path: &Path) -> Result<(), GridError> {
    match path.parent() {
        Some(parent) => ensure_directory(comm, parent),
        None => Ok(()),
    }
}

/// Collective: read the gridlines of a grid file and check them against the
/// extents set in `grid`.
pub fn load_gridlines<C: Communicator>(
    comm: &C,
    path: &Path,
    grid: &GridOptions,
) -> Result<Vec<Gridline>, GridError> {
    let lines = read_gridlines(comm, &Hierarchical, path, grid.dim())?;
    let extents: Vec<usize> = lines.iter().map(Gridline::len).collect();
    agree(comm, "check grid extents", grid.check_extents(&extents))?;
    Ok(lines)
}
