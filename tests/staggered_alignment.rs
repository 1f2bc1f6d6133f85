use stagger_post::algs::communicator::{Communicator, NoComm, ThreadComm};
use stagger_post::grid_error::GridError;
use stagger_post::topology::process_grid::ProcessGrid;
use stagger_post::topology::staggered::{Component, ComponentLines, StaggeredGridSet};
use stagger_post::DebugInvariants;

fn family<C: stagger_post::algs::communicator::Communicator>(
    comm: &C,
    extents: &[usize],
    periodic: &[bool],
    procs: Option<[usize; 3]>,
) -> Result<StaggeredGridSet, GridError> {
    let lo = vec![0.0; extents.len()];
    let hi = vec![1.0; extents.len()];
    let lines = ComponentLines::uniform(extents, &lo, &hi, periodic)?;
    let procs = procs.map(ProcessGrid::new).transpose()?;
    StaggeredGridSet::new(comm, extents, periodic, &lines, procs)
}

#[test]
fn every_worker_owns_matching_blocks() {
    let out = ThreadComm::run(6, |comm| {
        let set = family(comm, &[12, 7], &[false, true], Some([3, 2, 1])).unwrap();
        set.validate_invariants().unwrap();
        let base = set.base();
        let u = set.velocity(0).unwrap();
        let v = set.velocity(1).unwrap();
        let wz = set.vorticity(2).unwrap();
        (
            base.owned_start(),
            base.owned_count(),
            u.owned_count(),
            v.owned_count(),
            wz.owned_count(),
            base.proc_coords(comm.rank()),
        )
    });
    for (start, base, u, v, wz, coords) in out {
        let last_x = coords[0] == 2;
        assert_eq!(u[0], base[0] - usize::from(last_x));
        assert_eq!(u[1], base[1]);
        // y is periodic: no face dropped
        assert_eq!(v, base);
        assert_eq!(wz, u);
        assert_eq!(start[0], [0, 4, 8][coords[0]]);
    }
}

#[test]
fn three_dimensional_family_has_every_component() {
    let set = family(&NoComm, &[6, 5, 4], &[false, false, true], None).unwrap();
    assert_eq!(set.iter().count(), Component::all(3).len());
    assert_eq!(set.velocity(2).unwrap().extents(), [6, 5, 4]);
    assert_eq!(set.vorticity(0).unwrap().extents(), [6, 4, 4]);
    assert_eq!(set.vorticity(1).unwrap().extents(), [5, 5, 4]);
    assert_eq!(set.vorticity(2).unwrap().extents(), [5, 4, 4]);
}

#[test]
fn vorticity_coordinates_come_from_velocity_faces() {
    let set = family(&NoComm, &[4, 4], &[false, false], None).unwrap();
    let wz = set.vorticity(2).unwrap();
    let u = set.velocity(0).unwrap();
    let v = set.velocity(1).unwrap();
    assert_eq!(wz.line(0), u.line(0));
    assert_eq!(wz.line(1), v.line(1));
    assert_eq!(wz.line(0).points(), &[0.25, 0.5, 0.75]);
}

#[test]
fn short_non_periodic_axis_fails_on_every_worker() {
    let out = ThreadComm::run(2, |comm| {
        family(comm, &[4, 1], &[false, false], Some([2, 1, 1]))
            .unwrap_err()
            .kind()
    });
    assert_eq!(out, vec!["DimensionError", "DimensionError"]);
}

#[test]
fn last_worker_left_without_faces_is_an_error() {
    // 4 cells over 4 workers: the last block of a shifted axis would be empty
    let out = ThreadComm::run(4, |comm| {
        family(comm, &[4, 2], &[false, true], Some([4, 1, 1])).map(|_| ())
    });
    assert!(out.iter().all(|r| matches!(r, Err(GridError::Dimension(_)))));
}

#[test]
fn mismatched_component_lines_are_rejected() {
    let mut lines = ComponentLines::uniform(&[6, 6], &[0.0; 2], &[1.0; 2], &[false; 2]).unwrap();
    let wrong = lines.get(Component::CellCentered).unwrap().to_vec();
    lines.insert(Component::VelocityX, wrong);
    let err = StaggeredGridSet::new(&NoComm, &[6, 6], &[false; 2], &lines, None).unwrap_err();
    assert_eq!(err.kind(), "ShapeMismatchError");
}
