//! Field and gridline storage.
//!
//! Two encodings implement the [`DatasetReader`] / [`DatasetWriter`] pair:
//! - [`flat`]: a bare little-endian `f64` stream, one field per file;
//! - [`hierarchical`]: a self-describing container of named datasets.
//!
//! Neither knows about decomposition: [`partitioned`] reads and writes whole
//! datasets on one worker and moves owned blocks over the communicator.

pub mod flat;
pub mod hierarchical;
pub mod partitioned;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::grid_error::GridError;

pub use flat::Flat;
pub use hierarchical::{Container, Hierarchical};

/// An n-dimensional array of `f64` in row-major order (last axis fastest).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Extent per axis, slowest first (`[nz, ny, nx]` for a grid field).
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
    /// Scalar attributes, e.g. the interval of a gridline.
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl Dataset {
    /// Dataset of `shape`; `data` must hold exactly the product of the extents.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, GridError> {
        let len: usize = shape.iter().product();
        if len != data.len() {
            return Err(GridError::ShapeMismatch {
                context: "dataset contents".into(),
                expected: shape,
                found: vec![data.len()],
            });
        }
        Ok(Self {
            shape,
            data,
            attributes: BTreeMap::new(),
        })
    }

    /// Attach a scalar attribute.
    pub fn with_attribute(mut self, key: &str, value: f64) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

/// Reads named datasets from a file.
pub trait DatasetReader {
    /// Read dataset `name` stored in `path`.
    fn read_dataset(&self, path: &Path, name: &str) -> Result<Dataset, GridError>;
}

/// Creates or overwrites named datasets in a file.
pub trait DatasetWriter {
    /// Write `dataset` as `name` into `path`.
    fn write_dataset(&self, path: &Path, name: &str, dataset: &Dataset) -> Result<(), GridError>;
}

/// Encoding selector used by configuration and the drivers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Flat,
    #[default]
    Hierarchical,
}

impl FromStr for Encoding {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Encoding::Flat),
            "hierarchical" => Ok(Encoding::Hierarchical),
            other => Err(GridError::Config(format!(
                "unknown encoding `{other}` (expected `flat` or `hierarchical`)"
            ))),
        }
    }
}

impl DatasetReader for Encoding {
    fn read_dataset(&self, path: &Path, name: &str) -> Result<Dataset, GridError> {
        match self {
            Encoding::Flat => Flat.read_dataset(path, name),
            Encoding::Hierarchical => Hierarchical.read_dataset(path, name),
        }
    }
}

impl DatasetWriter for Encoding {
    fn write_dataset(&self, path: &Path, name: &str, dataset: &Dataset) -> Result<(), GridError> {
        match self {
            Encoding::Flat => Flat.write_dataset(path, name, dataset),
            Encoding::Hierarchical => Hierarchical.write_dataset(path, name, dataset),
        }
    }
}
