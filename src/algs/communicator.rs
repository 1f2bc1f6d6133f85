//! Thin façade over in-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: the halo exchange and the
//! collectives call `.wait()` before they trust that a buffer is ready.
//!
//! Every worker runs the same program (SPMD). Tags handed out by
//! [`Communicator::reserve_tags`] are therefore identical on all workers as
//! long as every worker reserves them in the same order, which is the case for
//! every collective operation in this crate.

use bytes::Bytes;
use dashmap::DashMap;
use static_assertions::assert_impl_all;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

/// First tag handed out by [`Communicator::reserve_tags`].
const FIRST_RESERVED_TAG: u16 = 0x1000;

/// Typed message tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `k` slots after this one (wrapping).
    #[inline]
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of this worker.
    fn rank(&self) -> usize;
    /// Number of workers.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive; `buf.len()` is the expected message length.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Reserve `count` consecutive tags for one communication epoch.
    fn reserve_tags(&self, count: u16) -> CommTag;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

fn advance(counter: &AtomicU16, count: u16) -> CommTag {
    CommTag(counter.fetch_add(count.max(1), Ordering::Relaxed))
}

/// Compile-time no-op comm for single-worker runs and serial unit tests.
///
/// Halo exchange with a periodic self-neighbour never reaches the
/// communicator, so `NoComm` is enough for every single-worker operation.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn reserve_tags(&self, _count: u16) -> CommTag {
        CommTag(FIRST_RESERVED_TAG)
    }
}

// --- ThreadComm: one SPMD world of workers living on threads of this process ---
type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = DashMap<Key, VecDeque<Bytes>>;

/// In-process communicator: every rank of a world is a thread, messages go
/// through a mailbox shared by the world only.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    next_tag: Arc<AtomicU16>,
}

assert_impl_all!(ThreadComm: Send, Sync);

impl ThreadComm {
    /// Create the `size` communicators of a fresh world.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let mailbox = Arc::new(Mailbox::new());
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                next_tag: Arc::new(AtomicU16::new(FIRST_RESERVED_TAG)),
            })
            .collect()
    }

    /// Run `work` once per rank of a fresh `size`-worker world, each on its own
    /// thread, and return the per-rank results in rank order.
    ///
    /// A panic on any worker is re-raised on the caller.
    pub fn run<T, F>(size: usize, work: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&ThreadComm) -> T + Sync,
    {
        let comms = Self::world(size);
        std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    let work = &work;
                    scope.spawn(move || work(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }
}

/// Receive handle of [`ThreadComm`]; the message is taken from the mailbox on `wait`.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(mut queue) = self.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    let n = self.len.min(bytes.len());
                    return Some(bytes[..n].to_vec());
                }
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        self.mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> LocalHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn reserve_tags(&self, count: u16) -> CommTag {
        advance(&self.next_tag, count)
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use crate::grid_error::GridError;
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, Destination, Source};

    /// MPI tags are only guaranteed up to 32767.
    const MPI_TAG_MASK: u16 = 0x7FFF;

    /// Communicator over `MPI_COMM_WORLD`; finalizes MPI when dropped.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        next_tag: AtomicU16,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, GridError> {
            let universe = mpi::initialize().ok_or_else(|| GridError::Comm {
                peer: 0,
                message: "MPI is already initialized".into(),
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                next_tag: AtomicU16::new(FIRST_RESERVED_TAG),
                _universe: universe,
            })
        }

        /// Abort every process of the world with `code`.
        pub fn abort(&self, code: i32) -> ! {
            self.world.abort(code)
        }
    }

    /// Pending MPI request owning its (leaked-for-'static) buffer.
    pub struct MpiHandle {
        complete: Option<Box<dyn FnOnce()>>,
        data: *mut [u8],
        keep: bool,
    }

    impl Wait for MpiHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(complete) = self.complete.take() {
                complete();
            }
            // SAFETY: `data` came from `Box::leak` in `isend`/`irecv` and the
            // request that borrowed it has completed above.
            let boxed = unsafe { Box::from_raw(self.data) };
            self.keep.then(|| boxed.into_vec())
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            let data: &'static [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr = data as *const [u8] as *mut [u8];
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, (tag & MPI_TAG_MASK) as i32);
            MpiHandle {
                complete: Some(Box::new(move || {
                    req.wait();
                })),
                data: ptr,
                keep: false,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiHandle {
            let data: &'static mut [u8] = Box::leak(vec![0u8; buf.len()].into_boxed_slice());
            let ptr: *mut [u8] = &raw mut *data;
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, data, (tag & MPI_TAG_MASK) as i32);
            MpiHandle {
                complete: Some(Box::new(move || {
                    req.wait();
                })),
                data: ptr,
                keep: true,
            }
        }

        fn reserve_tags(&self, count: u16) -> CommTag {
            advance(&self.next_tag, count)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_roundtrip_two_ranks() {
        let comms = ThreadComm::world(2);
        let mut recv_buf = [0u8; 4];
        let recv_handle = comms[1].irecv(0, 7, &mut recv_buf);
        comms[0].isend(1, 7, &[1, 2, 3, 4]).wait();
        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn worlds_do_not_share_mailboxes() {
        let a = ThreadComm::world(2);
        let b = ThreadComm::world(2);
        a[0].isend(1, 3, &[1]);
        b[0].isend(1, 3, &[2]);
        let mut buf = [0u8; 1];
        assert_eq!(b[1].irecv(0, 3, &mut buf).wait(), Some(vec![2]));
        assert_eq!(a[1].irecv(0, 3, &mut buf).wait(), Some(vec![1]));
    }

    #[test]
    fn reserved_tags_advance_identically_per_rank() {
        let comms = ThreadComm::world(2);
        let t0 = comms[0].reserve_tags(27);
        let t1 = comms[1].reserve_tags(27);
        assert_eq!(t0, t1);
        assert_eq!(comms[0].reserve_tags(1), t0.offset(27));
    }

    #[test]
    fn run_returns_results_in_rank_order() {
        let ranks = ThreadComm::run(4, |comm| (comm.rank(), comm.size()));
        assert_eq!(ranks, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[test]
    fn no_comm_is_single_rank() {
        let comm = NoComm;
        assert_eq!((comm.rank(), comm.size()), (0, 1));
        let mut buf = [0u8; 8];
        assert!(comm.irecv(0, 1, &mut buf).wait().is_none());
    }
}
