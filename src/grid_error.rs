//! GridError: Unified error type for stagger-post public APIs
//!
//! Grid creation, partition derivation and collective I/O are collective
//! operations, so errors are plain data (`Clone`) that can be reported by the
//! failing worker and mirrored on its peers.

use std::fmt::Debug;
use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for stagger-post operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    /// Unsupported dimensionality, empty extent, or an extent too small to
    /// shrink for a staggered component.
    #[error("dimension error: {0}")]
    Dimension(String),
    /// Grids or stored datasets whose shapes/partitions disagree.
    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    /// A value needed by interpolation is not available on this worker.
    #[error("field `{field}`: index {index:?} is not available on rank {rank} (stored box {lo:?}..{hi:?})")]
    OutOfRange {
        field: String,
        rank: usize,
        index: [isize; 3],
        lo: [isize; 3],
        hi: [isize; 3],
    },
    /// Missing file or dataset, or an unwritable destination.
    #[error("I/O error on `{path}`: {message}")]
    Io { path: PathBuf, message: String },
    /// A stencil or interpolation read a halo cell that was never exchanged
    /// nor explicitly set.
    #[error("field `{field}`: halo cell {index:?} was read before being exchanged or set")]
    UndefinedHalo { field: String, index: [isize; 3] },
    /// Gridline coordinates are not strictly increasing.
    #[error("gridline is not strictly increasing at index {index} ({prev} >= {next})")]
    NonMonotonic { index: usize, prev: f64, next: f64 },
    /// Corrupt or unrecognised file contents.
    #[error("cannot decode `{path}`: {message}")]
    Decode { path: PathBuf, message: String },
    /// Point-to-point communication failure.
    #[error("communication with rank {peer} failed: {message}")]
    Comm { peer: usize, message: String },
    /// Invalid option value.
    #[error("configuration error: {0}")]
    Config(String),
    /// Another worker failed during a collective step.
    #[error("collective `{operation}` aborted: rank {rank} failed")]
    CollectiveAbort { operation: String, rank: usize },
}

impl GridError {
    /// Build an [`GridError::Io`] from a `std::io::Error` and the path involved.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        GridError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Short kind name used in driver diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            GridError::Dimension(_) => "DimensionError",
            GridError::ShapeMismatch { .. } => "ShapeMismatchError",
            GridError::OutOfRange { .. } => "OutOfRangeError",
            GridError::Io { .. } => "IOError",
            GridError::UndefinedHalo { .. } => "UndefinedHaloError",
            GridError::NonMonotonic { .. } => "NonMonotonicError",
            GridError::Decode { .. } => "DecodeError",
            GridError::Comm { .. } => "CommError",
            GridError::Config(_) => "ConfigError",
            GridError::CollectiveAbort { .. } => "CollectiveAbort",
        }
    }
}
