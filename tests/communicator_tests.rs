use stagger_post::algs::collective::{
    agree, allgather_u64, barrier, broadcast_bytes, gather_bytes, scatter_bytes,
};
use stagger_post::algs::communicator::{CommTag, Communicator, NoComm, ThreadComm, Wait};
use stagger_post::grid_error::GridError;

#[test]
fn thread_round_trip() {
    let comms = ThreadComm::world(2);
    let tag = CommTag::new(0x10);
    comms[0].isend(1, tag.as_u16(), b"hello");
    let mut buf = [0u8; 5];
    let got = comms[1].irecv(0, tag.as_u16(), &mut buf).wait().unwrap();
    assert_eq!(&got, b"hello");
}

#[test]
fn thread_fifo_order() {
    let comms = ThreadComm::world(2);
    let tag = CommTag::new(0x11);
    for i in 0..10u8 {
        comms[0].isend(1, tag.as_u16(), &[i]);
    }
    let out: Vec<u8> = (0..10)
        .map(|_| {
            let mut b = [0u8; 1];
            comms[1].irecv(0, tag.as_u16(), &mut b).wait().unwrap()[0]
        })
        .collect();
    assert_eq!(out, (0u8..10).collect::<Vec<_>>());
}

#[test]
fn worlds_do_not_share_mailboxes() {
    let a = ThreadComm::world(2);
    let b = ThreadComm::world(2);
    a[0].isend(1, 7, &[1]);
    b[0].isend(1, 7, &[2]);
    let mut buf = [0u8; 1];
    assert_eq!(b[1].irecv(0, 7, &mut buf).wait().unwrap(), vec![2]);
    assert_eq!(a[1].irecv(0, 7, &mut buf).wait().unwrap(), vec![1]);
}

#[test]
fn reserved_tags_match_across_ranks() {
    let tags = ThreadComm::run(3, |comm| {
        let first = comm.reserve_tags(27);
        let second = comm.reserve_tags(2);
        (first, second)
    });
    assert!(tags.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(tags[0].1.as_u16(), tags[0].0.as_u16() + 27);
}

#[test]
fn gather_scatter_and_broadcast() {
    let out = ThreadComm::run(4, |comm| {
        let me = vec![comm.rank() as u8; comm.rank() + 1];
        let gathered = gather_bytes(comm, 2, &me).unwrap();
        let back = scatter_bytes(comm, 2, gathered.clone()).unwrap();
        let name = if comm.rank() == 1 { b"velocity/u".to_vec() } else { Vec::new() };
        let word = broadcast_bytes(comm, 1, name).unwrap();
        barrier(comm).unwrap();
        (gathered, back == me, word)
    });
    for (rank, (gathered, same, word)) in out.into_iter().enumerate() {
        assert!(same);
        assert_eq!(word, b"velocity/u");
        if rank == 2 {
            let g = gathered.unwrap();
            assert_eq!(g[3], vec![3, 3, 3, 3]);
            assert_eq!(g[0], vec![0]);
        } else {
            assert!(gathered.is_none());
        }
    }
}

#[test]
fn allgather_collects_every_rank() {
    let tables = ThreadComm::run(3, |comm| {
        allgather_u64(comm, &[comm.rank() as u64, 10 * comm.rank() as u64]).unwrap()
    });
    for t in tables {
        assert_eq!(t, vec![vec![0, 0], vec![1, 10], vec![2, 20]]);
    }
}

#[test]
fn agree_reports_lowest_failing_rank_to_the_others() {
    let out = ThreadComm::run(4, |comm| {
        let local: Result<usize, GridError> = if comm.rank() == 1 || comm.rank() == 3 {
            Err(GridError::Config(format!("bad input on {}", comm.rank())))
        } else {
            Ok(comm.rank())
        };
        agree(comm, "load", local)
    });
    assert_eq!(out[1], Err(GridError::Config("bad input on 1".into())));
    assert_eq!(
        out[0],
        Err(GridError::CollectiveAbort {
            operation: "load".into(),
            rank: 1
        })
    );
    assert_eq!(out[2], out[0]);
    assert!(matches!(out[3], Err(GridError::Config(_))));
}

#[test]
fn serial_collectives_are_local() {
    let comm = NoComm;
    assert_eq!(gather_bytes(&comm, 0, b"ab").unwrap(), Some(vec![b"ab".to_vec()]));
    assert_eq!(allgather_u64(&comm, &[5]).unwrap(), vec![vec![5]]);
    assert_eq!(agree(&comm, "noop", Ok::<_, GridError>(3)).unwrap(), 3);
}
