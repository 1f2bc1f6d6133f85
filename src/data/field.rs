//! Distributed scalar fields with halos.
//!
//! A [`FieldStore`] holds the values a worker owns on one grid plus a halo of
//! configurable width around them. Indices are global grid indices; halo
//! indices may be negative or past the extent. Every stored cell carries a
//! definedness flag: owned cells start defined (at `0.0`), halo cells only
//! become defined through an exchange or an explicit set, and reading an
//! undefined cell fails with [`GridError::UndefinedHalo`].

use itertools::iproduct;
use std::ops::Range;
use std::sync::Arc;

use crate::algs::communicator::Communicator;
use crate::algs::halo::{self, PendingExchange};
use crate::data::bc::ExteriorHalo;
use crate::grid_error::GridError;
use crate::topology::grid::DistributedGrid;

/// Halo width used by [`FieldStore::new`].
pub const DEFAULT_HALO_WIDTH: usize = 1;

/// Box of global indices, one half-open range per axis.
pub type IndexBox = [Range<isize>; 3];

/// Local values of one field on one grid.
#[derive(Clone, Debug)]
pub struct FieldStore {
    name: String,
    grid: Arc<DistributedGrid>,
    halo: [usize; 3],
    lo: [isize; 3],
    shape: [usize; 3],
    values: Vec<f64>,
    defined: Vec<bool>,
}

impl FieldStore {
    /// Field with the default halo width.
    pub fn new(name: &str, grid: Arc<DistributedGrid>) -> Self {
        Self::with_halo(name, grid, DEFAULT_HALO_WIDTH)
    }

    /// Field with a halo of `width` cells on every side of every axis
    /// (none along z in 2-D).
    pub fn with_halo(name: &str, grid: Arc<DistributedGrid>, width: usize) -> Self {
        let halo = [width, width, if grid.dim() == 3 { width } else { 0 }];
        let start = grid.owned_start();
        let count = grid.owned_count();
        let lo = [0, 1, 2].map(|a| start[a] as isize - halo[a] as isize);
        let shape = [0, 1, 2].map(|a| count[a] + 2 * halo[a]);
        let len = shape.iter().product();
        let mut field = Self {
            name: name.to_string(),
            grid,
            halo,
            lo,
            shape,
            values: vec![0.0; len],
            defined: vec![false; len],
        };
        for idx in field.owned_box().indices() {
            if let Some(off) = field.offset(idx) {
                field.defined[off] = true;
            }
        }
        field
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn grid(&self) -> &Arc<DistributedGrid> {
        &self.grid
    }

    /// Halo width per axis.
    #[inline]
    pub fn halo(&self) -> [usize; 3] {
        self.halo
    }

    /// Global indices owned by this worker.
    pub fn owned_box(&self) -> OwnedBox {
        let start = self.grid.owned_start();
        let count = self.grid.owned_count();
        OwnedBox([0, 1, 2].map(|a| start[a] as isize..(start[a] + count[a]) as isize))
    }

    /// Global indices stored by this worker (owned block plus halo).
    pub fn stored_box(&self) -> IndexBox {
        [0, 1, 2].map(|a| self.lo[a]..self.lo[a] + self.shape[a] as isize)
    }

    fn offset(&self, idx: [isize; 3]) -> Option<usize> {
        let mut off = 0usize;
        for a in (0..3).rev() {
            let l = idx[a] - self.lo[a];
            if l < 0 || l >= self.shape[a] as isize {
                return None;
            }
            off = off * self.shape[a] + l as usize;
        }
        Some(off)
    }

    /// Storage offset of `idx` or of one of its periodic images.
    fn resolve(&self, idx: [isize; 3]) -> Option<usize> {
        let extents = self.grid.extents();
        let mut found = [0isize; 3];
        for a in 0..3 {
            let lo = self.lo[a];
            let hi = lo + self.shape[a] as isize;
            let n = extents[a] as isize;
            let shifts: &[isize] = if self.grid.is_periodic(a) { &[0, 1, -1] } else { &[0] };
            found[a] = shifts
                .iter()
                .map(|s| idx[a] + s * n)
                .find(|i| (lo..hi).contains(i))?;
        }
        self.offset(found)
    }

    fn out_of_range(&self, idx: [isize; 3]) -> GridError {
        GridError::OutOfRange {
            field: self.name.clone(),
            rank: self.grid.rank(),
            index: idx,
            lo: self.lo,
            hi: [0, 1, 2].map(|a| self.lo[a] + self.shape[a] as isize),
        }
    }

    /// Value at global index `idx` (periodic images accepted).
    pub fn get(&self, idx: [isize; 3]) -> Result<f64, GridError> {
        let off = self.resolve(idx).ok_or_else(|| self.out_of_range(idx))?;
        if !self.defined[off] {
            return Err(GridError::UndefinedHalo {
                field: self.name.clone(),
                index: idx,
            });
        }
        Ok(self.values[off])
    }

    /// Set a stored cell (owned or halo) and mark it defined.
    pub fn set(&mut self, idx: [isize; 3], value: f64) -> Result<(), GridError> {
        let off = self.resolve(idx).ok_or_else(|| self.out_of_range(idx))?;
        self.values[off] = value;
        self.defined[off] = true;
        Ok(())
    }

    /// Whether `idx` is stored here and defined.
    pub fn is_defined(&self, idx: [isize; 3]) -> bool {
        self.resolve(idx).is_some_and(|off| self.defined[off])
    }

    /// Set every owned value to `value`.
    pub fn fill(&mut self, value: f64) {
        self.fill_with(|_, _, _| value);
    }

    /// Set every owned value from its coordinates.
    pub fn fill_with(&mut self, f: impl Fn(f64, f64, f64) -> f64) {
        let grid = Arc::clone(&self.grid);
        for idx in self.owned_box().indices() {
            let [x, y, z] = [0, 1, 2].map(|a| grid.coordinate(a, idx[a]));
            if let Some(off) = self.offset(idx) {
                self.values[off] = f(x, y, z);
            }
        }
    }

    /// Owned values in global x-fastest order.
    pub fn owned_values(&self) -> Vec<f64> {
        self.owned_box()
            .indices()
            .filter_map(|idx| self.offset(idx).map(|off| self.values[off]))
            .collect()
    }

    /// Replace the owned values (global x-fastest order).
    pub fn set_owned_values(&mut self, values: &[f64]) -> Result<(), GridError> {
        let owned = self.owned_box();
        if values.len() != owned.len() {
            return Err(GridError::ShapeMismatch {
                context: format!("owned block of `{}` on rank {}", self.name, self.grid.rank()),
                expected: self.grid.owned_count().to_vec(),
                found: vec![values.len()],
            });
        }
        for (idx, &v) in owned.indices().zip(values) {
            if let Some(off) = self.offset(idx) {
                self.values[off] = v;
            }
        }
        Ok(())
    }

    /// Mark every halo cell undefined.
    pub fn invalidate_halo(&mut self) {
        let owned = self.owned_box();
        for idx in box_indices(&self.stored_box()) {
            if !owned.contains(idx) {
                if let Some(off) = self.offset(idx) {
                    self.defined[off] = false;
                }
            }
        }
    }

    /// Whether `idx` lies past a non-periodic domain edge.
    pub fn is_exterior(&self, idx: [isize; 3]) -> bool {
        let extents = self.grid.extents();
        (0..3).any(|a| {
            !self.grid.is_periodic(a) && (idx[a] < 0 || idx[a] >= extents[a] as isize)
        })
    }

    /// Fill every stored cell past a non-periodic edge according to `policy`.
    ///
    /// [`ExteriorHalo::ZeroGradient`] copies the nearest in-domain cell, which
    /// for corner cells is a halo cell of a neighbour: exchange first.
    pub fn set_exterior_halo(&mut self, policy: &ExteriorHalo) -> Result<(), GridError> {
        let extents = self.grid.extents();
        let exterior: Vec<[isize; 3]> = box_indices(&self.stored_box())
            .filter(|&idx| self.is_exterior(idx))
            .collect();
        let mut updates = Vec::with_capacity(exterior.len());
        for idx in exterior {
            let value = match policy {
                ExteriorHalo::Constant(v) => *v,
                ExteriorHalo::ZeroGradient => {
                    let mut inner = idx;
                    for a in 0..3 {
                        if !self.grid.is_periodic(a) {
                            inner[a] = idx[a].clamp(0, extents[a] as isize - 1);
                        }
                    }
                    self.get(inner)?
                }
                ExteriorHalo::Function(f) => {
                    let [x, y, z] = [0, 1, 2].map(|a| self.grid.coordinate(a, idx[a]));
                    f(x, y, z)
                }
            };
            updates.push((idx, value));
        }
        log::debug!(
            "rank {}: `{}` sets {} exterior halo cells ({policy:?})",
            self.grid.rank(),
            self.name,
            updates.len()
        );
        for (idx, value) in updates {
            self.set(idx, value)?;
        }
        Ok(())
    }

    /// Post the halo exchange; see [`halo::begin_exchange`].
    pub fn begin_exchange<C: Communicator>(
        &self,
        comm: &C,
    ) -> Result<PendingExchange<C>, GridError> {
        halo::begin_exchange(self, comm)
    }

    /// Complete an exchange posted by [`FieldStore::begin_exchange`].
    pub fn end_exchange<C: Communicator>(
        &mut self,
        pending: PendingExchange<C>,
    ) -> Result<(), GridError> {
        halo::end_exchange(self, pending)
    }

    /// Collective: begin and end a halo exchange.
    pub fn exchange_halo<C: Communicator>(&mut self, comm: &C) -> Result<(), GridError> {
        let pending = self.begin_exchange(comm)?;
        self.end_exchange(pending)
    }

    /// Values of a stored box in x-fastest order; every cell must be defined.
    pub(crate) fn read_box(&self, region: &IndexBox) -> Result<Vec<f64>, GridError> {
        box_indices(region).map(|idx| self.get(idx)).collect()
    }

    /// Write a box of stored cells (x-fastest order) and mark them defined.
    pub(crate) fn write_box(&mut self, region: &IndexBox, data: &[f64]) -> Result<(), GridError> {
        let cells = box_len(region);
        if data.len() != cells {
            return Err(GridError::ShapeMismatch {
                context: format!("halo block of `{}`", self.name),
                expected: vec![cells],
                found: vec![data.len()],
            });
        }
        for (idx, &v) in box_indices(region).zip(data) {
            let off = self.offset(idx).ok_or_else(|| self.out_of_range(idx))?;
            self.values[off] = v;
            self.defined[off] = true;
        }
        Ok(())
    }
}

/// Owned index block of a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedBox(pub IndexBox);

impl OwnedBox {
    /// Indices in x-fastest order.
    pub fn indices(&self) -> impl Iterator<Item = [isize; 3]> + use<> {
        box_indices(&self.0)
    }

    pub fn len(&self) -> usize {
        box_len(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, idx: [isize; 3]) -> bool {
        (0..3).all(|a| self.0[a].contains(&idx[a]))
    }
}

/// Indices of `region` in x-fastest order.
pub fn box_indices(region: &IndexBox) -> impl Iterator<Item = [isize; 3]> + use<> {
    let [x, y, z] = region.clone();
    iproduct!(z, y, x).map(|(k, j, i)| [i, j, k])
}

/// Number of cells of `region`.
pub fn box_len(region: &IndexBox) -> usize {
    region.iter().map(|r| r.len()).product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::data::coordinates::Gridline;

    fn grid(periodic: [bool; 2]) -> Arc<DistributedGrid> {
        let lines = vec![
            Gridline::uniform(4, 0.0, 1.0).unwrap(),
            Gridline::uniform(3, 0.0, 1.0).unwrap(),
        ];
        Arc::new(DistributedGrid::new(&NoComm, "g", lines, &periodic, None).unwrap())
    }

    #[test]
    fn owned_values_round_trip_in_x_fastest_order() {
        let mut f = FieldStore::new("phi", grid([false, false]));
        let data: Vec<f64> = (0..12).map(f64::from).collect();
        f.set_owned_values(&data).unwrap();
        assert_eq!(f.get([1, 2, 0]).unwrap(), 9.0);
        assert_eq!(f.owned_values(), data);
        assert!(f.set_owned_values(&data[..5]).is_err());
    }

    #[test]
    fn unset_halo_reads_fail() {
        let f = FieldStore::new("phi", grid([false, false]));
        assert_eq!(
            f.get([-1, 0, 0]),
            Err(GridError::UndefinedHalo { field: "phi".into(), index: [-1, 0, 0] })
        );
        assert!(matches!(f.get([-2, 0, 0]), Err(GridError::OutOfRange { .. })));
    }

    #[test]
    fn periodic_self_exchange_fills_wrapped_halo() {
        let mut f = FieldStore::new("phi", grid([true, false]));
        f.fill_with(|x, y, _| 10.0 * x + y);
        f.exchange_halo(&NoComm).unwrap();
        assert_eq!(f.get([-1, 1, 0]).unwrap(), f.get([3, 1, 0]).unwrap());
        assert_eq!(f.get([4, 0, 0]).unwrap(), f.get([0, 0, 0]).unwrap());
        // non-periodic y halo is exterior and stays unset
        assert!(!f.is_defined([0, -1, 0]));
    }

    #[test]
    fn exterior_policies() {
        let mut f = FieldStore::new("phi", grid([false, false]));
        f.fill_with(|x, _, _| x);
        f.set_exterior_halo(&ExteriorHalo::Constant(7.0)).unwrap();
        assert_eq!(f.get([-1, -1, 0]).unwrap(), 7.0);

        f.set_exterior_halo(&ExteriorHalo::ZeroGradient).unwrap();
        assert_eq!(f.get([4, 1, 0]).unwrap(), f.get([3, 1, 0]).unwrap());

        f.set_exterior_halo(&ExteriorHalo::function(|x, _, _| x)).unwrap();
        assert!((f.get([-1, 0, 0]).unwrap() + 0.125).abs() < 1e-15);
    }
}
