use proptest::prelude::*;

use stagger_post::topology::partition::Partition;
use stagger_post::topology::process_grid::ProcessGrid;
use stagger_post::topology::staggered::{Component, derive_partitions};

proptest! {
    #[test]
    fn balanced_partition_covers_the_axis(extent in 1usize..500, procs in 1usize..32) {
        prop_assume!(procs <= extent);
        let p = Partition::new(extent, procs).unwrap();
        prop_assert_eq!(p.counts().iter().sum::<usize>(), extent);
        let (min, max) = (p.counts().iter().min().unwrap(), p.counts().iter().max().unwrap());
        prop_assert!(max - min <= 1);
        let mut next = 0;
        for r in 0..procs {
            let range = p.range(r).unwrap();
            prop_assert_eq!(range.start, next);
            next = range.end;
        }
        prop_assert_eq!(next, extent);
    }

    #[test]
    fn every_index_has_exactly_one_owner(extent in 1usize..200, procs in 1usize..16) {
        prop_assume!(procs <= extent);
        let p = Partition::new(extent, procs).unwrap();
        for i in 0..extent {
            let owner = p.owner_of(i).unwrap();
            prop_assert!(p.range(owner).unwrap().contains(&i));
        }
        prop_assert!(p.owner_of(extent).is_none());
    }

    #[test]
    fn staggered_axis_drops_one_face_on_the_last_worker(
        extent in 2usize..300,
        procs in 1usize..12,
    ) {
        prop_assume!(procs * 2 <= extent);
        let base = vec![Partition::new(extent, procs).unwrap(), Partition::new(4, 1).unwrap()];
        let derived = derive_partitions(&base, &[false, false], Component::VelocityX).unwrap();
        let (b, d) = (base[0].counts(), derived[0].counts());
        prop_assert_eq!(derived[0].extent(), extent - 1);
        prop_assert_eq!(&d[..procs - 1], &b[..procs - 1]);
        prop_assert_eq!(d[procs - 1] + 1, b[procs - 1]);
        prop_assert_eq!(&derived[1], &base[1]);

        let periodic = derive_partitions(&base, &[true, false], Component::VelocityX).unwrap();
        prop_assert_eq!(&periodic[0], &base[0]);
    }

    #[test]
    fn decided_process_grid_uses_every_worker(
        nx in 1usize..64,
        ny in 1usize..64,
        size in 1usize..17,
    ) {
        prop_assume!(size <= nx * ny);
        if let Ok(pg) = ProcessGrid::decide(&[nx, ny], size) {
            prop_assert_eq!(pg.size(), size);
            prop_assert!(pg.shape()[0] <= nx && pg.shape()[1] <= ny);
            prop_assert_eq!(pg.shape()[2], 1);
            for rank in 0..size {
                prop_assert_eq!(pg.rank_of(pg.coords(rank)), rank);
            }
        }
    }
}

#[test]
fn shrinking_a_single_index_block_on_many_workers_fails() {
    let p = Partition::new(4, 4).unwrap();
    assert!(p.shrink_last().is_err());
    let q = Partition::new(2, 1).unwrap();
    assert_eq!(q.shrink_last().unwrap().counts(), &[1]);
}

#[test]
fn explicit_counts_may_leave_workers_empty() {
    let p = Partition::from_counts(vec![0, 3, 0, 2]).unwrap();
    assert_eq!(p.extent(), 5);
    assert_eq!(p.owner_of(0), Some(1));
    assert_eq!(p.owner_of(3), Some(3));
    assert_eq!(p.range(2), Some(3..3));
}
