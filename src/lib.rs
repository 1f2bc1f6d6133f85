#![cfg_attr(docsrs, feature(doc_cfg))]
//! # stagger-post
//!
//! stagger-post post-processes the output of parallel staggered-grid CFD
//! solvers. Fields live on structured grids decomposed over workers; the
//! library aligns the decompositions of a staggered grid family, exchanges
//! halos, interpolates between unrelated grids and computes vorticity.
//!
//! ## Features
//! - Balanced 1-D partitions and Cartesian process grids
//! - Staggered grid families whose component ownership follows the
//!   cell-centred base grid
//! - Field storage with box-stencil halo exchange in two phases
//! - Bi/trilinear grid-to-grid interpolation, exact for affine fields
//! - Vorticity on the dual grid of a staggered velocity field
//! - Flat and hierarchical encodings with collective read/write
//!
//! ## Execution model
//!
//! Every worker runs the same program (SPMD) and passes a
//! [`Communicator`](algs::communicator::Communicator) into each collective
//! call. `NoComm` runs a single worker, `ThreadComm` runs worlds of workers
//! on threads (tests), and `MpiComm` (feature `mpi-support`) runs under MPI.
//! A collective step that fails on one worker fails on all of them.

pub mod algs;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod drivers;
pub mod grid_error;
pub mod io;
pub mod topology;

pub use debug_invariants::DebugInvariants;
pub use grid_error::GridError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, ThreadComm};
    pub use crate::algs::interpolate::{ExteriorMode, Interpolator};
    pub use crate::algs::vorticity::VorticityEngine;
    pub use crate::data::bc::ExteriorHalo;
    pub use crate::data::coordinates::Gridline;
    pub use crate::data::field::FieldStore;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::grid_error::GridError;
    pub use crate::io::{Dataset, DatasetReader, DatasetWriter, Encoding};
    pub use crate::topology::grid::DistributedGrid;
    pub use crate::topology::partition::Partition;
    pub use crate::topology::process_grid::ProcessGrid;
    pub use crate::topology::staggered::{Component, ComponentLines, StaggeredGridSet};
}
