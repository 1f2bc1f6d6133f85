//! Collective operations built on the point-to-point [`Communicator`] facade.
//!
//! Every function here is *collective*: all workers must call it, in the same
//! order, with consistent roots. Variable-length payloads travel as a
//! little-endian `u64` length header followed by the body, each under its own
//! reserved tag.

use bytemuck::allocation::pod_collect_to_vec;
use bytemuck::cast_slice;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::grid_error::GridError;

fn send_sized<C: Communicator>(comm: &C, peer: usize, tags: CommTag, payload: &[u8]) {
    let header = (payload.len() as u64).to_le_bytes();
    comm.isend(peer, tags.as_u16(), &header).wait();
    comm.isend(peer, tags.offset(1).as_u16(), payload).wait();
}

fn recv_sized<C: Communicator>(comm: &C, peer: usize, tags: CommTag) -> Result<Vec<u8>, GridError> {
    let mut header = [0u8; 8];
    let raw = comm
        .irecv(peer, tags.as_u16(), &mut header)
        .wait()
        .ok_or_else(|| GridError::Comm {
            peer,
            message: "failed to receive size header".into(),
        })?;
    if raw.len() != header.len() {
        return Err(GridError::Comm {
            peer,
            message: format!("size header has {} bytes", raw.len()),
        });
    }
    header.copy_from_slice(&raw);
    let len = u64::from_le_bytes(header) as usize;
    let mut body = vec![0u8; len];
    let raw = comm
        .irecv(peer, tags.offset(1).as_u16(), &mut body)
        .wait()
        .ok_or_else(|| GridError::Comm {
            peer,
            message: "failed to receive payload".into(),
        })?;
    if raw.len() != len {
        return Err(GridError::Comm {
            peer,
            message: format!("payload length mismatch: expected {len}, got {}", raw.len()),
        });
    }
    Ok(raw)
}

/// Gather one byte payload per worker on `root`.
///
/// Returns `Some(payloads)` (indexed by rank) on the root, `None` elsewhere.
pub fn gather_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    payload: &[u8],
) -> Result<Option<Vec<Vec<u8>>>, GridError> {
    let tags = comm.reserve_tags(2);
    if comm.size() == 1 {
        return Ok(Some(vec![payload.to_vec()]));
    }
    if comm.rank() == root {
        let mut out = Vec::with_capacity(comm.size());
        for peer in 0..comm.size() {
            if peer == root {
                out.push(payload.to_vec());
            } else {
                out.push(recv_sized(comm, peer, tags)?);
            }
        }
        Ok(Some(out))
    } else {
        send_sized(comm, root, tags, payload);
        Ok(None)
    }
}

/// Send `pieces[r]` from `root` to every rank `r`; returns this worker's piece.
///
/// `pieces` is only read on the root and must hold one entry per rank there.
pub fn scatter_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    pieces: Option<Vec<Vec<u8>>>,
) -> Result<Vec<u8>, GridError> {
    let tags = comm.reserve_tags(2);
    if comm.rank() == root {
        let mut pieces = pieces.ok_or_else(|| GridError::Comm {
            peer: root,
            message: "scatter root has no payload".into(),
        })?;
        if pieces.len() != comm.size() {
            return Err(GridError::Comm {
                peer: root,
                message: format!("scatter needs {} pieces, got {}", comm.size(), pieces.len()),
            });
        }
        for (peer, piece) in pieces.iter().enumerate() {
            if peer != root {
                send_sized(comm, peer, tags, piece);
            }
        }
        Ok(std::mem::take(&mut pieces[root]))
    } else {
        recv_sized(comm, root, tags)
    }
}

/// Broadcast `payload` (only read on `root`) to every worker.
pub fn broadcast_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    payload: Vec<u8>,
) -> Result<Vec<u8>, GridError> {
    let pieces = (comm.rank() == root).then(|| vec![payload; comm.size()]);
    scatter_bytes(comm, root, pieces)
}

/// Every worker contributes `local`; every worker receives all contributions
/// indexed by rank.
pub fn allgather_u64<C: Communicator>(comm: &C, local: &[u64]) -> Result<Vec<Vec<u64>>, GridError> {
    let gathered = gather_bytes(comm, 0, cast_slice(local))?;
    let packed = match gathered {
        Some(parts) => {
            let mut flat: Vec<u64> = Vec::new();
            for part in &parts {
                flat.push((part.len() / 8) as u64);
            }
            for part in &parts {
                flat.extend(pod_collect_to_vec::<u8, u64>(part));
            }
            cast_slice::<u64, u8>(&flat).to_vec()
        }
        None => Vec::new(),
    };
    let flat = pod_collect_to_vec::<u8, u64>(&broadcast_bytes(comm, 0, packed)?);
    let size = comm.size();
    if flat.len() < size {
        return Err(GridError::Comm {
            peer: 0,
            message: "allgather table is truncated".into(),
        });
    }
    let (lens, mut rest) = flat.split_at(size);
    let mut out = Vec::with_capacity(size);
    for &len in lens {
        let len = len as usize;
        if rest.len() < len {
            return Err(GridError::Comm {
                peer: 0,
                message: "allgather table is truncated".into(),
            });
        }
        out.push(rest[..len].to_vec());
        rest = &rest[len..];
    }
    Ok(out)
}

/// Block until every worker has reached the barrier.
pub fn barrier<C: Communicator>(comm: &C) -> Result<(), GridError> {
    if comm.size() == 1 {
        return Ok(());
    }
    gather_bytes(comm, 0, &[])?;
    broadcast_bytes(comm, 0, Vec::new())?;
    Ok(())
}

/// Agree on the outcome of a collective step.
///
/// If any worker failed, every worker returns an error: the failing worker its
/// own, the others [`GridError::CollectiveAbort`] naming the lowest failing rank.
pub fn agree<C: Communicator, T>(
    comm: &C,
    operation: &str,
    local: Result<T, GridError>,
) -> Result<T, GridError> {
    let flag = [u64::from(local.is_err())];
    let flags = allgather_u64(comm, &flag)?;
    match local {
        Err(e) => {
            log::debug!("rank {}: `{operation}` failed locally: {e}", comm.rank());
            Err(e)
        }
        Ok(value) => match flags.iter().position(|f| f.first() == Some(&1)) {
            Some(rank) => Err(GridError::CollectiveAbort {
                operation: operation.to_string(),
                rank,
            }),
            None => Ok(value),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};

    #[test]
    fn gather_on_root_in_rank_order() {
        let out = ThreadComm::run(3, |comm| {
            gather_bytes(comm, 0, &[comm.rank() as u8; 2]).unwrap()
        });
        assert_eq!(out[0], Some(vec![vec![0, 0], vec![1, 1], vec![2, 2]]));
        assert!(out[1].is_none() && out[2].is_none());
    }

    #[test]
    fn allgather_handles_ragged_contributions() {
        let out = ThreadComm::run(3, |comm| {
            let local: Vec<u64> = (0..comm.rank() as u64).collect();
            allgather_u64(comm, &local).unwrap()
        });
        for table in out {
            assert_eq!(table, vec![vec![], vec![0], vec![0, 1]]);
        }
    }

    #[test]
    fn agree_propagates_a_single_failure() {
        let out = ThreadComm::run(3, |comm| {
            let local = if comm.rank() == 2 {
                Err(GridError::Config("bad".into()))
            } else {
                Ok(comm.rank())
            };
            agree(comm, "test-step", local)
        });
        assert_eq!(
            out[0],
            Err(GridError::CollectiveAbort {
                operation: "test-step".into(),
                rank: 2
            })
        );
        assert!(matches!(out[1], Err(GridError::CollectiveAbort { rank: 2, .. })));
        assert_eq!(out[2], Err(GridError::Config("bad".into())));
    }

    #[test]
    fn serial_collectives_short_circuit() {
        let comm = NoComm;
        barrier(&comm).unwrap();
        assert_eq!(broadcast_bytes(&comm, 0, vec![9]).unwrap(), vec![9]);
        assert_eq!(allgather_u64(&comm, &[4, 5]).unwrap(), vec![vec![4, 5]]);
    }

    #[test]
    fn scattered_values_keep_their_bits() {
        let v = [0.1, -2.5e-300, f64::MAX, 1.2345];
        let out = ThreadComm::run(2, |comm| {
            let pieces = (comm.rank() == 0).then(|| {
                v.chunks(2)
                    .map(|c| cast_slice::<f64, u8>(c).to_vec())
                    .collect::<Vec<_>>()
            });
            pod_collect_to_vec::<u8, f64>(&scatter_bytes(comm, 0, pieces).unwrap())
        });
        assert_eq!(out.concat(), v.to_vec());
    }
}
