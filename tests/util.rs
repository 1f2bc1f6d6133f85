#![allow(dead_code)]
use std::path::PathBuf;
use std::sync::Arc;

use stagger_post::algs::communicator::Communicator;
use stagger_post::data::coordinates::Gridline;
use stagger_post::data::field::FieldStore;
use stagger_post::topology::grid::DistributedGrid;
use stagger_post::topology::process_grid::ProcessGrid;

/// Fresh, empty scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("stagger-post-tests-{}", std::process::id()))
        .join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Uniform cell-centred gridlines on the unit box.
pub fn unit_lines(extents: &[usize]) -> Vec<Gridline> {
    extents
        .iter()
        .map(|&n| Gridline::uniform(n, 0.0, 1.0).unwrap())
        .collect()
}

/// Grid through `lines` with an explicit process grid.
pub fn grid_on<C: Communicator>(
    comm: &C,
    name: &str,
    lines: Vec<Gridline>,
    periodic: &[bool],
    procs: [usize; 3],
) -> Arc<DistributedGrid> {
    let procs = ProcessGrid::new(procs).unwrap();
    Arc::new(DistributedGrid::new(comm, name, lines, periodic, Some(procs)).unwrap())
}

/// Field filled from its coordinates.
pub fn field_from(
    name: &str,
    grid: &Arc<DistributedGrid>,
    f: impl Fn(f64, f64, f64) -> f64,
) -> FieldStore {
    let mut field = FieldStore::new(name, Arc::clone(grid));
    field.fill_with(f);
    field
}

pub fn assert_close(got: f64, want: f64, tol: f64) {
    assert!(
        (got - want).abs() <= tol,
        "got {got}, want {want} (tolerance {tol})"
    );
}
