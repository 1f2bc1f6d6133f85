mod util;

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serial_test::serial;

use stagger_post::algs::communicator::{NoComm, ThreadComm};
use stagger_post::config::{ConvertOptions, Direction, GridOptions};
use stagger_post::data::field::FieldStore;
use stagger_post::drivers;
use stagger_post::io::partitioned::{read_field, write_field};
use stagger_post::io::{Container, Dataset, DatasetReader, DatasetWriter, Flat, Hierarchical};
use util::{grid_on, scratch_dir, unit_lines};

fn grid_2d(nx: usize, ny: usize) -> GridOptions {
    GridOptions {
        nx: Some(nx),
        ny: Some(ny),
        ..GridOptions::default()
    }
}

fn convert(source: PathBuf, destination: PathBuf, direction: Direction, grid: GridOptions) -> ConvertOptions {
    ConvertOptions {
        source,
        destination,
        direction,
        name: "phi".into(),
        grid,
    }
}

#[test]
#[serial]
fn uniform_field_converts_flat_to_hierarchical_exactly() {
    let dir = scratch_dir("uniform-convert");
    let flat = dir.join("phi.dat");
    Flat.write_dataset(&flat, "phi", &Dataset::new(vec![64], vec![1.2345; 64]).unwrap())
        .unwrap();
    let h5 = dir.join("out/phi.h5");
    drivers::convert::run(
        &NoComm,
        &convert(flat, h5.clone(), Direction::FlatToHierarchical, grid_2d(8, 8)),
    )
    .unwrap();
    let ds = Hierarchical.read_dataset(&h5, "phi").unwrap();
    assert_eq!(ds.shape, vec![8, 8]);
    assert!(ds.data.iter().all(|&v| v == 1.2345));
}

#[test]
#[serial]
fn flat_hierarchical_flat_is_lossless_across_workers() {
    let dir = scratch_dir("cross-encoding");
    let mut rng = SmallRng::seed_from_u64(7);
    let values: Vec<f64> = (0..6 * 5 * 3).map(|_| rng.gen_range(-1e3..1e3)).collect();
    let original = dir.join("phi.dat");
    Flat.write_dataset(&original, "phi", &Dataset::new(vec![values.len()], values.clone()).unwrap())
        .unwrap();
    let grid = GridOptions {
        nz: Some(3),
        process_grid: Some([2, 1, 2]),
        ..grid_2d(6, 5)
    };
    let h5 = dir.join("phi.h5");
    let back = dir.join("back.dat");
    ThreadComm::run(4, |comm| {
        drivers::convert::run(
            comm,
            &convert(original.clone(), h5.clone(), Direction::FlatToHierarchical, grid.clone()),
        )
        .unwrap();
        drivers::convert::run(
            comm,
            &convert(h5.clone(), back.clone(), Direction::HierarchicalToFlat, grid.clone()),
        )
        .unwrap();
    });
    assert_eq!(Hierarchical.read_dataset(&h5, "phi").unwrap().shape, vec![3, 5, 6]);
    assert_eq!(std::fs::read(&original).unwrap(), std::fs::read(&back).unwrap());
}

#[test]
#[serial]
fn same_encoding_round_trip_keeps_values() {
    let dir = scratch_dir("same-encoding");
    let path = dir.join("fields.h5");
    let out = ThreadComm::run(3, |comm| {
        let g = grid_on(comm, "p", unit_lines(&[7, 4]), &[false, false], [3, 1, 1]);
        let mut f = FieldStore::new("p", Arc::clone(&g));
        f.fill_with(|x, y, _| x * x - y);
        write_field(comm, &Hierarchical, &path, "velocity/p", &f).unwrap();
        let mut back = FieldStore::new("p", g);
        read_field(comm, &Hierarchical, &path, "velocity/p", &mut back).unwrap();
        back.owned_values() == f.owned_values()
    });
    assert!(out.into_iter().all(|same| same));
    assert_eq!(Container::open(&path).unwrap().names(), vec!["velocity/p".to_string()]);
}

#[test]
#[serial]
fn writing_a_dataset_keeps_the_others() {
    let dir = scratch_dir("keep-others");
    let path = dir.join("grid.h5");
    Hierarchical
        .write_dataset(&path, "x", &Dataset::new(vec![2], vec![0.0, 1.0]).unwrap())
        .unwrap();
    Hierarchical
        .write_dataset(&path, "y", &Dataset::new(vec![1], vec![0.5]).unwrap())
        .unwrap();
    Hierarchical
        .write_dataset(&path, "x", &Dataset::new(vec![1], vec![2.0]).unwrap())
        .unwrap();
    let c = Container::open(&path).unwrap();
    assert_eq!(c.names(), vec!["x".to_string(), "y".to_string()]);
    assert_eq!(c.dataset("x").unwrap().data, vec![2.0]);
}

#[test]
#[serial]
fn missing_dataset_aborts_every_worker() {
    let dir = scratch_dir("missing");
    let path = dir.join("empty.h5");
    Hierarchical
        .write_dataset(&path, "other", &Dataset::new(vec![1], vec![0.0]).unwrap())
        .unwrap();
    let kinds = ThreadComm::run(3, |comm| {
        let g = grid_on(comm, "p", unit_lines(&[6, 2]), &[false, false], [3, 1, 1]);
        let mut f = FieldStore::new("p", g);
        read_field(comm, &Hierarchical, &path, "phi", &mut f).unwrap_err().kind()
    });
    assert_eq!(kinds, vec!["IOError", "CollectiveAbort", "CollectiveAbort"]);
}

#[test]
#[serial]
fn flat_stream_of_the_wrong_length_is_a_shape_mismatch() {
    let dir = scratch_dir("wrong-length");
    let flat = dir.join("phi.dat");
    Flat.write_dataset(&flat, "phi", &Dataset::new(vec![10], vec![0.0; 10]).unwrap())
        .unwrap();
    let err = drivers::convert::run(
        &NoComm,
        &convert(flat, dir.join("phi.h5"), Direction::FlatToHierarchical, grid_2d(4, 4)),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "ShapeMismatchError");
}

#[test]
#[serial]
fn unwritable_destination_is_an_io_error() {
    let dir = scratch_dir("unwritable");
    let blocker = dir.join("file");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let g = grid_on(&NoComm, "p", unit_lines(&[2, 2]), &[false, false], [1, 1, 1]);
    let f = FieldStore::new("p", g);
    let err = write_field(&NoComm, &Flat, &blocker.join("phi.dat"), "phi", &f).unwrap_err();
    assert_eq!(err.kind(), "IOError");
}
