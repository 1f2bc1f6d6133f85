//! Decomposition of structured grids over workers.
//!
//! - [`partition`]: contiguous ownership of one axis
//! - [`process_grid`]: Cartesian arrangement of workers
//! - [`grid`]: gridlines plus per-axis partitions
//! - [`staggered`]: grid families with aligned ownership

pub mod grid;
pub mod partition;
pub mod process_grid;
pub mod staggered;

pub use grid::DistributedGrid;
pub use partition::Partition;
pub use process_grid::ProcessGrid;
pub use staggered::{Component, ComponentLines, StaggeredGridSet};
