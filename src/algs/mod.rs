//! Re-export public algorithms.

pub mod collective;
pub mod communicator;
pub mod crop;
pub mod halo;
pub mod interpolate;
pub mod vorticity;

pub use crop::crop;
pub use interpolate::{ExteriorMode, Interpolator};
pub use vorticity::VorticityEngine;
