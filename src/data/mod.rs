//! Data module: gridlines, fields and exterior halo policies
#![warn(missing_docs)]

pub mod bc;
pub mod coordinates;
pub mod field;

pub use bc::{ExteriorHalo, ExteriorHaloOptions};
pub use coordinates::{Bracket, Gridline};
pub use field::FieldStore;
