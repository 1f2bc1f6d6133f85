mod util;

use std::path::Path;
use std::sync::Arc;

use serial_test::serial;

use stagger_post::algs::communicator::{Communicator, NoComm, ThreadComm};
use stagger_post::algs::interpolate::ExteriorMode;
use stagger_post::config::{
    CropOptions, FieldOptions, GridOptions, InterpolateOptions, TimeSteps, VorticityOptions,
};
use stagger_post::data::coordinates::Gridline;
use stagger_post::data::field::FieldStore;
use stagger_post::drivers::{self, snapshot_directory};
use stagger_post::io::partitioned::{write_field, write_gridlines};
use stagger_post::io::{DatasetReader, Encoding, Flat, Hierarchical};
use stagger_post::topology::staggered::{Component, ComponentLines, StaggeredGridSet};
use util::{assert_close, field_from, grid_on, scratch_dir, unit_lines};

fn grid_options(extents: &[usize], procs: Option<[usize; 3]>) -> GridOptions {
    GridOptions {
        nx: Some(extents[0]),
        ny: Some(extents[1]),
        nz: extents.get(2).copied(),
        process_grid: procs,
        ..GridOptions::default()
    }
}

/// Write the grid files of a uniform unit-box family and the velocity of
/// every step in `steps`.
fn write_simulation(
    directory: &Path,
    extents: &[usize],
    steps: &[u64],
    velocity: &[fn(f64, f64, f64) -> f64],
) {
    let dim = extents.len();
    let grids = directory.join("grids");
    std::fs::create_dir_all(&grids).unwrap();
    let lines = ComponentLines::uniform(extents, &vec![0.0; dim], &vec![1.0; dim], &vec![false; dim])
        .unwrap();
    let mut stored = vec![Component::CellCentered];
    stored.extend((0..dim).filter_map(Component::velocity));
    for c in stored {
        let path = grids.join(format!("{}.h5", c.name()));
        write_gridlines(&NoComm, &Hierarchical, &path, lines.get(c).unwrap()).unwrap();
    }
    let set = StaggeredGridSet::new(&NoComm, extents, &vec![false; dim], &lines, None).unwrap();
    for &step in steps {
        let folder = snapshot_directory(directory, step);
        std::fs::create_dir_all(&folder).unwrap();
        for (a, &f) in velocity.iter().enumerate() {
            let name = format!("u{}", ["x", "y", "z"][a]);
            let mut u = FieldStore::new(&name, Arc::clone(set.velocity(a).unwrap()));
            u.fill_with(f);
            write_field(&NoComm, &Hierarchical, &folder.join(format!("{name}.h5")), &name, &u)
                .unwrap();
        }
    }
}

#[test]
#[serial]
fn vorticity_sweep_writes_every_step() {
    let dir = scratch_dir("vorticity-sweep");
    write_simulation(&dir, &[8, 8], &[0, 10], &[|_, y, _| -y, |x, _, _| x]);
    let opts = VorticityOptions {
        directory: dir.clone(),
        steps: TimeSteps {
            nstart: 0,
            nend: 10,
            nstep: 10,
        },
        grid: grid_options(&[8, 8], Some([2, 1, 1])),
        ..VorticityOptions::default()
    };
    ThreadComm::run(2, |comm| drivers::vorticity::run(comm, &opts).unwrap());

    for step in [0, 10] {
        let w = Hierarchical
            .read_dataset(&snapshot_directory(&dir, step).join("wz.h5"), "wz")
            .unwrap();
        assert_eq!(w.shape, vec![7, 7]);
        for v in w.data {
            assert_close(v, 2.0, 1e-9);
        }
    }
    let x = Hierarchical.read_dataset(&dir.join("grids/wz.h5"), "x").unwrap();
    assert_eq!(x.data.len(), 7);
    assert_close(x.data[0], 0.125, 1e-15);
    assert_eq!(x.attributes.get("lo"), Some(&0.0));
}

#[test]
#[serial]
fn vorticity_sweep_in_three_dimensions_writes_wx_and_wz() {
    let dir = scratch_dir("vorticity-3d");
    let out = dir.join("post");
    write_simulation(
        &dir,
        &[4, 4, 4],
        &[5],
        &[|_, _, _| 0.0, |_, _, z| -z, |_, y, _| y],
    );
    let opts = VorticityOptions {
        directory: dir.clone(),
        output_directory: Some(out.clone()),
        steps: TimeSteps {
            nstart: 5,
            nend: 5,
            nstep: 1,
        },
        grid: grid_options(&[4, 4, 4], None),
        ..VorticityOptions::default()
    };
    ThreadComm::run(2, |comm| drivers::vorticity::run(comm, &opts).unwrap());

    let folder = snapshot_directory(&out, 5);
    let wx = Hierarchical.read_dataset(&folder.join("wx.h5"), "wx").unwrap();
    assert_eq!(wx.shape, vec![3, 3, 4]);
    wx.data.iter().for_each(|&v| assert_close(v, 2.0, 1e-9));
    let wz = Hierarchical.read_dataset(&folder.join("wz.h5"), "wz").unwrap();
    wz.data.iter().for_each(|&v| assert_close(v, 0.0, 1e-9));
    assert!(out.join("grids/wx.h5").exists());
    assert!(!snapshot_directory(&dir, 5).join("wz.h5").exists());
}

#[test]
#[serial]
fn missing_snapshot_stops_the_sweep() {
    let dir = scratch_dir("vorticity-missing");
    write_simulation(&dir, &[4, 4], &[0], &[|_, y, _| -y, |x, _, _| x]);
    let opts = VorticityOptions {
        directory: dir.clone(),
        steps: TimeSteps {
            nstart: 0,
            nend: 1,
            nstep: 1,
        },
        grid: grid_options(&[4, 4], None),
        ..VorticityOptions::default()
    };
    let err = drivers::vorticity::run(&NoComm, &opts).unwrap_err();
    assert_eq!(err.kind(), "IOError");
    assert!(snapshot_directory(&dir, 0).join("wz.h5").exists());
}

#[test]
#[serial]
fn grid_file_disagreeing_with_the_options_is_a_shape_mismatch() {
    let dir = scratch_dir("vorticity-extents");
    write_simulation(&dir, &[4, 4], &[0], &[|_, y, _| -y, |x, _, _| x]);
    let opts = VorticityOptions {
        directory: dir,
        grid: grid_options(&[5, 4], None),
        ..VorticityOptions::default()
    };
    let err = drivers::vorticity::run(&NoComm, &opts).unwrap_err();
    assert_eq!(err.kind(), "ShapeMismatchError");
}

#[test]
#[serial]
fn interpolate_driver_reproduces_a_linear_field() {
    let dir = scratch_dir("interpolate-driver");
    let src_grid = dir.join("source-grid.h5");
    let dst_grid = dir.join("destination-grid.h5");
    write_gridlines(&NoComm, &Hierarchical, &src_grid, &unit_lines(&[8, 8])).unwrap();
    write_gridlines(&NoComm, &Hierarchical, &dst_grid, &unit_lines(&[5, 5])).unwrap();
    let g = grid_on(&NoComm, "phi", unit_lines(&[8, 8]), &[false, false], [1, 1, 1]);
    let phi = field_from("phi", &g, |x, y, _| 2.0 * x + 3.0 * y);
    write_field(&NoComm, &Flat, &dir.join("phi.dat"), "phi", &phi).unwrap();

    let opts = InterpolateOptions {
        source: FieldOptions {
            path: dir.join("phi.dat"),
            encoding: Encoding::Flat,
            grid_path: src_grid,
            grid: grid_options(&[8, 8], Some([2, 1, 1])),
            ..FieldOptions::default()
        },
        destination: FieldOptions {
            path: dir.join("out/psi.h5"),
            name: "psi".into(),
            grid_path: dst_grid,
            grid: grid_options(&[5, 5], None),
            ..FieldOptions::default()
        },
        mode: ExteriorMode::Clamp,
    };
    ThreadComm::run(2, |comm| drivers::interpolate::run(comm, &opts).unwrap());

    let psi = Hierarchical.read_dataset(&dir.join("out/psi.h5"), "psi").unwrap();
    assert_eq!(psi.shape, vec![5, 5]);
    for j in 0..5 {
        for i in 0..5 {
            let (x, y) = ((i as f64 + 0.5) * 0.2, (j as f64 + 0.5) * 0.2);
            assert_close(psi.data[j * 5 + i], 2.0 * x + 3.0 * y, 1e-12);
        }
    }
}

#[test]
#[serial]
fn interpolate_driver_wraps_points_past_the_period() {
    let dir = scratch_dir("interpolate-driver-periodic");
    let src_grid = dir.join("source-grid.h5");
    let dst_grid = dir.join("destination-grid.h5");
    write_gridlines(&NoComm, &Hierarchical, &src_grid, &unit_lines(&[8, 2])).unwrap();
    let dst_lines = vec![
        Gridline::from_points(vec![0.3, 0.6, 0.9, 1.2]).unwrap(),
        Gridline::uniform(2, 0.0, 1.0).unwrap(),
    ];
    write_gridlines(&NoComm, &Hierarchical, &dst_grid, &dst_lines).unwrap();
    let g = grid_on(&NoComm, "phi", unit_lines(&[8, 2]), &[true, false], [1, 1, 1]);
    let phi = field_from("phi", &g, |x, _, _| x);
    write_field(&NoComm, &Hierarchical, &dir.join("phi.h5"), "phi", &phi).unwrap();

    let opts = InterpolateOptions {
        source: FieldOptions {
            path: dir.join("phi.h5"),
            grid_path: src_grid,
            grid: GridOptions {
                periodic_x: true,
                ..grid_options(&[8, 2], Some([2, 1, 1]))
            },
            ..FieldOptions::default()
        },
        destination: FieldOptions {
            path: dir.join("psi.h5"),
            grid_path: dst_grid,
            grid: grid_options(&[4, 2], None),
            ..FieldOptions::default()
        },
        mode: ExteriorMode::Clamp,
    };
    ThreadComm::run(2, |comm| drivers::interpolate::run(comm, &opts).unwrap());

    let psi = Hierarchical.read_dataset(&dir.join("psi.h5"), "phi").unwrap();
    assert_eq!(psi.shape, vec![2, 4]);
    for (got, want) in psi.data.iter().zip([0.3, 0.6, 0.9, 0.2, 0.3, 0.6, 0.9, 0.2]) {
        assert_close(*got, want, 1e-12);
    }
}

#[test]
#[serial]
fn crop_driver_writes_field_and_gridlines() {
    let dir = scratch_dir("crop-driver");
    let grid_path = dir.join("grid.h5");
    write_gridlines(&NoComm, &Hierarchical, &grid_path, &unit_lines(&[8, 4])).unwrap();
    let g = grid_on(&NoComm, "phi", unit_lines(&[8, 4]), &[false, false], [1, 1, 1]);
    write_field(
        &NoComm,
        &Hierarchical,
        &dir.join("phi.h5"),
        "phi",
        &field_from("phi", &g, |x, y, _| x + 10.0 * y),
    )
    .unwrap();

    let opts = CropOptions {
        source: dir.join("phi.h5"),
        destination: dir.join("cropped/phi.h5"),
        grid_path,
        x_start: Some(0.2),
        x_end: Some(0.6),
        grid: grid_options(&[8, 4], None),
        ..CropOptions::default()
    };
    let ranks = ThreadComm::run(2, |comm| {
        drivers::crop::run(comm, &opts).unwrap();
        comm.rank()
    });
    assert_eq!(ranks, vec![0, 1]);

    let phi = Hierarchical.read_dataset(&dir.join("cropped/phi.h5"), "phi").unwrap();
    assert_eq!(phi.shape, vec![4, 3]);
    assert_eq!(phi.data[0], 0.3125 + 1.25);
    let x = Hierarchical.read_dataset(&dir.join("cropped/grid.h5"), "x").unwrap();
    assert_eq!(x.data, vec![0.3125, 0.4375, 0.5625]);
}
