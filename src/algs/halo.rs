//! Two-phase halo exchange for [`FieldStore`]s.
//!
//! The exchange uses a box stencil: every worker trades blocks with up to 26
//! neighbours in 3-D (8 in 2-D), including edge and corner neighbours, so a
//! bilinear or trilinear bracket at a subdomain corner is fully available.
//!
//! Messages of one exchange carry the tags `base + code(d)` where `d` is the
//! direction from sender to receiver and
//! `code(d) = (d0 + 1) + 3 (d1 + 1) + 9 (d2 + 1)`. A worker that is its own
//! neighbour through a periodic wrap copies the block locally.

use bytemuck::allocation::pod_collect_to_vec;
use bytemuck::cast_slice;
use itertools::iproduct;
use log::debug;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::data::field::{FieldStore, IndexBox, box_len};
use crate::grid_error::GridError;
use crate::topology::grid::AXIS_NAMES;

/// Exchange posted by [`begin_exchange`], completed by [`end_exchange`].
pub struct PendingExchange<C: Communicator> {
    field: String,
    recvs: Vec<(usize, IndexBox, C::RecvHandle)>,
    sends: Vec<C::SendHandle>,
    local: Vec<(IndexBox, Vec<f64>)>,
}

impl<C: Communicator> std::fmt::Debug for PendingExchange<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingExchange")
            .field("field", &self.field)
            .field("recvs", &self.recvs.len())
            .field("sends", &self.sends.len())
            .field("local", &self.local.len())
            .finish()
    }
}

#[inline]
fn code(d: [isize; 3]) -> u16 {
    ((d[0] + 1) + 3 * (d[1] + 1) + 9 * (d[2] + 1)) as u16
}

fn directions(halo: [usize; 3]) -> impl Iterator<Item = [isize; 3]> {
    iproduct!(-1isize..=1, -1isize..=1, -1isize..=1)
        .map(|(k, j, i)| [i, j, k])
        .filter(move |d| {
            *d != [0, 0, 0] && (0..3).all(|a| d[a] == 0 || halo[a] > 0)
        })
}

/// Owned block sent towards the neighbour in direction `d`.
fn send_box(start: [usize; 3], count: [usize; 3], w: [usize; 3], d: [isize; 3]) -> IndexBox {
    [0, 1, 2].map(|a| {
        let (s, e, w) = (start[a] as isize, (start[a] + count[a]) as isize, w[a] as isize);
        match d[a] {
            -1 => s..s + w,
            1 => e - w..e,
            _ => s..e,
        }
    })
}

/// Halo block filled by the neighbour in direction `d`.
fn recv_box(start: [usize; 3], count: [usize; 3], w: [usize; 3], d: [isize; 3]) -> IndexBox {
    [0, 1, 2].map(|a| {
        let (s, e, w) = (start[a] as isize, (start[a] + count[a]) as isize, w[a] as isize);
        match d[a] {
            -1 => s - w..s,
            1 => e..e + w,
            _ => s..e,
        }
    })
}

fn check_widths(field: &FieldStore) -> Result<(), GridError> {
    let grid = field.grid();
    let halo = field.halo();
    for a in 0..3 {
        let part = grid.partition(a);
        let trades = part.procs() > 1 || grid.is_periodic(a);
        if halo[a] == 0 || !trades {
            continue;
        }
        if let Some(&min) = part.counts().iter().min() {
            if min < halo[a] {
                return Err(GridError::Dimension(format!(
                    "halo of width {} on the {} axis of `{}` needs every worker to own at least as many indices, smallest block has {min}",
                    halo[a],
                    AXIS_NAMES[a],
                    grid.name()
                )));
            }
        }
    }
    Ok(())
}

/// Post the exchange of `field`'s boundary blocks with its neighbours.
///
/// Collective over all workers of the grid. Until [`end_exchange`] returns,
/// halo cells hold their previous contents.
pub fn begin_exchange<C: Communicator>(
    field: &FieldStore,
    comm: &C,
) -> Result<PendingExchange<C>, GridError> {
    check_widths(field)?;
    let tags: CommTag = comm.reserve_tags(27);
    let grid = field.grid();
    let procs = grid.process_grid();
    let periodic = grid.periodicity();
    let rank = grid.rank();
    let (start, count, w) = (grid.owned_start(), grid.owned_count(), field.halo());

    let mut pending = PendingExchange {
        field: field.name().to_string(),
        recvs: Vec::new(),
        sends: Vec::new(),
        local: Vec::new(),
    };
    for d in directions(w) {
        let Some(peer) = procs.neighbor(rank, d, periodic) else {
            continue;
        };
        let halo_box = recv_box(start, count, w, d);
        if peer == rank {
            let opposite = d.map(|x| -x);
            let data = field.read_box(&send_box(start, count, w, opposite))?;
            pending.local.push((halo_box, data));
        } else {
            let mut buf = vec![0u8; box_len(&halo_box) * size_of::<f64>()];
            let tag = tags.offset(code(d.map(|x| -x))).as_u16();
            let handle = comm.irecv(peer, tag, &mut buf);
            pending.recvs.push((peer, halo_box, handle));
        }
    }
    for d in directions(w) {
        let Some(peer) = procs.neighbor(rank, d, periodic) else {
            continue;
        };
        if peer != rank {
            let data = field.read_box(&send_box(start, count, w, d))?;
            let tag = tags.offset(code(d)).as_u16();
            pending.sends.push(comm.isend(peer, tag, cast_slice(&data)));
        }
    }
    debug!(
        "rank {rank}: `{}` halo exchange posted {} receives, {} sends, {} local copies",
        pending.field,
        pending.recvs.len(),
        pending.sends.len(),
        pending.local.len()
    );
    Ok(pending)
}

/// Wait for the exchange and write the received blocks into the halo.
pub fn end_exchange<C: Communicator>(
    field: &mut FieldStore,
    pending: PendingExchange<C>,
) -> Result<(), GridError> {
    if pending.field != field.name() {
        return Err(GridError::Config(format!(
            "exchange posted for `{}` completed on `{}`",
            pending.field,
            field.name()
        )));
    }
    for (halo_box, data) in &pending.local {
        field.write_box(halo_box, data)?;
    }
    for (peer, halo_box, handle) in pending.recvs {
        let expected = box_len(&halo_box) * size_of::<f64>();
        let bytes = handle.wait().ok_or_else(|| GridError::Comm {
            peer,
            message: format!("no halo block received for `{}`", field.name()),
        })?;
        if bytes.len() != expected {
            return Err(GridError::Comm {
                peer,
                message: format!(
                    "halo block for `{}` has {} bytes, expected {expected}",
                    field.name(),
                    bytes.len()
                ),
            });
        }
        field.write_box(&halo_box, &pod_collect_to_vec::<u8, f64>(&bytes))?;
    }
    for send in pending.sends {
        send.wait();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_codes_are_distinct() {
        let mut codes: Vec<u16> = directions([1, 1, 1]).map(code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 26);
        assert!(codes.iter().all(|&c| c < 27 && c != 13));
    }

    #[test]
    fn two_dimensional_stencil_has_eight_directions() {
        assert_eq!(directions([1, 1, 0]).count(), 8);
    }

    #[test]
    fn send_and_receive_blocks_mirror_each_other() {
        let (start, count, w) = ([4, 0, 0], [3, 5, 1], [1, 1, 0]);
        assert_eq!(send_box(start, count, w, [1, 0, 0]), [6..7, 0..5, 0..1]);
        assert_eq!(recv_box(start, count, w, [-1, 1, 0]), [3..4, 5..6, 0..1]);
    }
}
