//! Flat encoding: the values of one field as a contiguous little-endian
//! `f64` stream in global x-fastest order, without any metadata.
//!
//! The file holds a single field, so the dataset name is ignored and the
//! shape read back is just the number of values.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::grid_error::GridError;
use crate::io::{Dataset, DatasetReader, DatasetWriter};

/// Reader/writer of flat streams.
#[derive(Clone, Copy, Debug, Default)]
pub struct Flat;

impl Flat {
    /// Decode a stream from any reader.
    pub fn read_values<R: Read>(mut reader: R, path: &Path) -> Result<Vec<f64>, GridError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| GridError::io(path, e))?;
        if bytes.len() % size_of::<f64>() != 0 {
            return Err(GridError::Decode {
                path: path.to_path_buf(),
                message: format!("{} bytes is not a whole number of f64 values", bytes.len()),
            });
        }
        Ok(bytes
            .chunks_exact(size_of::<f64>())
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect())
    }

    /// Encode `values` to any writer.
    pub fn write_values<W: Write>(mut writer: W, values: &[f64], path: &Path) -> Result<(), GridError> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        writer
            .write_all(&bytes)
            .and_then(|_| writer.flush())
            .map_err(|e| GridError::io(path, e))
    }
}

impl DatasetReader for Flat {
    fn read_dataset(&self, path: &Path, _name: &str) -> Result<Dataset, GridError> {
        let file = fs::File::open(path).map_err(|e| GridError::io(path, e))?;
        let data = Self::read_values(std::io::BufReader::new(file), path)?;
        Dataset::new(vec![data.len()], data)
    }
}

impl DatasetWriter for Flat {
    fn write_dataset(&self, path: &Path, _name: &str, dataset: &Dataset) -> Result<(), GridError> {
        let file = fs::File::create(path).map_err(|e| GridError::io(path, e))?;
        Self::write_values(std::io::BufWriter::new(file), &dataset.data, path)
    }
}
