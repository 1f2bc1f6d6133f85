//! Vorticity of a staggered velocity field.
//!
//! The component along axis `a` is
//! `w_a = d(u_c)/d(x_b) - d(u_b)/d(x_c)` with `(a, b, c)` cyclic, evaluated
//! at the cell edges of the vorticity grid with one-sided differences of the
//! neighbouring face values:
//!
//! ```text
//! wz(i,j) = (v(i+1,j) - v(i,j)) / (xv(i+1) - xv(i)) - (u(i,j+1) - u(i,j)) / (yu(j+1) - yu(j))
//! ```
//!
//! Spacing is taken per cell from the velocity gridlines, so stretched grids
//! are handled. On a periodic axis `i+1` past the last index wraps to `0` and
//! the spacing to the first point of the next period.

use std::sync::Arc;

use crate::algs::communicator::Communicator;
use crate::data::field::FieldStore;
use crate::grid_error::GridError;
use crate::topology::grid::{AXIS_NAMES, DistributedGrid};
use crate::topology::staggered::StaggeredGridSet;

/// Computes vorticity components on the vorticity grids of a family.
#[derive(Clone, Copy, Debug)]
pub struct VorticityEngine<'a> {
    set: &'a StaggeredGridSet,
}

impl<'a> VorticityEngine<'a> {
    pub fn new(set: &'a StaggeredGridSet) -> Self {
        Self { set }
    }

    /// Velocity axes `(b, c)` whose derivatives make up component `axis`.
    fn operands(&self, axis: usize) -> Result<(usize, usize), GridError> {
        if axis > 2 || (self.set.dim() == 2 && axis != 2) {
            return Err(GridError::Dimension(format!(
                "no {}-vorticity in a {}-D family",
                AXIS_NAMES.get(axis).unwrap_or(&"?"),
                self.set.dim()
            )));
        }
        Ok(((axis + 1) % 3, (axis + 2) % 3))
    }

    fn check_operand(&self, axis: usize, field: &FieldStore) -> Result<(), GridError> {
        let expected = self.set.velocity(axis)?;
        if !expected.same_layout(field.grid()) {
            return Err(expected.layout_mismatch(
                &format!("{}-velocity operand of the vorticity", AXIS_NAMES[axis]),
                field.grid(),
            ));
        }
        Ok(())
    }

    /// Collective: exchange both velocity halos, then compute component
    /// `axis` from the velocities along `(axis+1)%3` (`ub`) and `(axis+2)%3`
    /// (`uc`). For the z-component `ub` is `u` and `uc` is `v`.
    pub fn compute<C: Communicator>(
        &self,
        comm: &C,
        axis: usize,
        ub: &mut FieldStore,
        uc: &mut FieldStore,
    ) -> Result<FieldStore, GridError> {
        self.operands(axis)?;
        // both exchanges in flight before either completes
        let pending_b = ub.begin_exchange(comm)?;
        let pending_c = uc.begin_exchange(comm)?;
        ub.end_exchange(pending_b)?;
        uc.end_exchange(pending_c)?;
        self.compute_local(axis, ub, uc)
    }

    /// z-vorticity from `u` and `v`; see [`VorticityEngine::compute`].
    pub fn compute_z<C: Communicator>(
        &self,
        comm: &C,
        u: &mut FieldStore,
        v: &mut FieldStore,
    ) -> Result<FieldStore, GridError> {
        self.compute(comm, 2, u, v)
    }

    /// Compute component `axis` assuming the halos of `ub` and `uc` already
    /// hold the `+1` neighbours of every owned cell.
    pub fn compute_local(
        &self,
        axis: usize,
        ub: &FieldStore,
        uc: &FieldStore,
    ) -> Result<FieldStore, GridError> {
        let (b, c) = self.operands(axis)?;
        self.check_operand(b, ub)?;
        self.check_operand(c, uc)?;
        let grid: &Arc<DistributedGrid> = self.set.vorticity(axis)?;
        let mut out = FieldStore::new(grid.name(), Arc::clone(grid));
        let gb = uc.grid();
        let gc = ub.grid();
        let mut values = Vec::with_capacity(out.owned_box().len());
        for p in out.owned_box().indices() {
            let mut pb = p;
            pb[b] += 1;
            let mut pc = p;
            pc[c] += 1;
            let db = gb.coordinate(b, p[b] + 1) - gb.coordinate(b, p[b]);
            let dc = gc.coordinate(c, p[c] + 1) - gc.coordinate(c, p[c]);
            let duc = uc.get(pb)? - uc.get(p)?;
            let dub = ub.get(pc)? - ub.get(p)?;
            values.push(duc / db - dub / dc);
        }
        out.set_owned_values(&values)?;
        log::debug!(
            "rank {}: computed `{}` on {} points",
            grid.rank(),
            grid.name(),
            values.len()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::topology::staggered::ComponentLines;

    fn family(periodic: [bool; 2]) -> StaggeredGridSet {
        let lines = ComponentLines::uniform(&[8, 8], &[0.0; 2], &[1.0; 2], &periodic).unwrap();
        StaggeredGridSet::new(&NoComm, &[8, 8], &periodic, &lines, None).unwrap()
    }

    fn velocity(set: &StaggeredGridSet, axis: usize, f: impl Fn(f64, f64, f64) -> f64) -> FieldStore {
        let g = set.velocity(axis).unwrap();
        let mut field = FieldStore::new(g.name(), Arc::clone(g));
        field.fill_with(f);
        field
    }

    #[test]
    fn uniform_flow_has_no_vorticity() {
        let set = family([false, false]);
        let mut u = velocity(&set, 0, |_, _, _| 1.5);
        let mut v = velocity(&set, 1, |_, _, _| -0.25);
        let wz = VorticityEngine::new(&set).compute_z(&NoComm, &mut u, &mut v).unwrap();
        assert_eq!(wz.grid().extents(), [7, 7, 1]);
        assert!(wz.owned_values().iter().all(|w| w.abs() < 1e-12));
    }

    #[test]
    fn solid_body_rotation_gives_twice_the_rate() {
        let set = family([false, false]);
        let mut u = velocity(&set, 0, |_, y, _| -y);
        let mut v = velocity(&set, 1, |x, _, _| x);
        let wz = VorticityEngine::new(&set).compute_z(&NoComm, &mut u, &mut v).unwrap();
        assert!(wz.owned_values().iter().all(|w| (w - 2.0).abs() < 1e-12));
    }

    #[test]
    fn mismatched_operands_are_rejected() {
        let set = family([false, false]);
        let u = velocity(&set, 0, |_, _, _| 0.0);
        let err = VorticityEngine::new(&set).compute_local(2, &u, &u).unwrap_err();
        assert_eq!(err.kind(), "ShapeMismatchError");
        assert!(VorticityEngine::new(&set).compute_local(0, &u, &u).is_err());
    }
}
