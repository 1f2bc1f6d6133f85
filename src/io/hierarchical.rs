//! Hierarchical encoding: a self-describing container of named datasets.
//!
//! Layout: 8 magic bytes, a little-endian `u32` format version, then the
//! `bincode` encoding of the root [`Group`]. Dataset names are `/`-separated
//! paths through nested groups (`"velocity/u"`). Writing a dataset rewrites
//! the whole container through a temporary file that replaces the original
//! atomically, so a reader never sees a half-written container.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::grid_error::GridError;
use crate::io::{Dataset, DatasetReader, DatasetWriter};

const MAGIC: [u8; 8] = *b"STGPOST\0";
const FORMAT_VERSION: u32 = 1;

/// A node of the container tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub groups: BTreeMap<String, Group>,
    pub datasets: BTreeMap<String, Dataset>,
}

/// In-memory image of a container file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Container {
    root: Group,
}

fn split_name(name: &str) -> Result<(Vec<&str>, &str), GridError> {
    let parts: Vec<&str> = name.trim_start_matches('/').split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(GridError::Config(format!("invalid dataset name `{name}`")));
    }
    let (last, groups) = parts
        .split_last()
        .ok_or_else(|| GridError::Config(format!("invalid dataset name `{name}`")))?;
    Ok((groups.to_vec(), last))
}

fn decode_error(path: &Path, message: impl Into<String>) -> GridError {
    GridError::Decode {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the container stored at `path`.
    pub fn open(path: &Path) -> Result<Self, GridError> {
        let file = fs::File::open(path).map_err(|e| GridError::io(path, e))?;
        Self::from_reader(BufReader::new(file), path)
    }

    /// Load `path` if it exists, else start empty.
    pub fn open_or_new(path: &Path) -> Result<Self, GridError> {
        if path.exists() {
            Self::open(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn from_reader<R: Read>(mut reader: R, path: &Path) -> Result<Self, GridError> {
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|_| decode_error(path, "file too short for a container header"))?;
        if magic != MAGIC {
            return Err(decode_error(path, "not a hierarchical container"));
        }
        let mut version = [0u8; 4];
        reader
            .read_exact(&mut version)
            .map_err(|_| decode_error(path, "file too short for a container header"))?;
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(decode_error(
                path,
                format!("unsupported container version {version}"),
            ));
        }
        let root: Group =
            bincode::deserialize_from(reader).map_err(|e| decode_error(path, e.to_string()))?;
        Ok(Self { root })
    }

    pub fn to_writer<W: Write>(&self, mut writer: W, path: &Path) -> Result<(), GridError> {
        writer
            .write_all(&MAGIC)
            .and_then(|_| writer.write_all(&FORMAT_VERSION.to_le_bytes()))
            .map_err(|e| GridError::io(path, e))?;
        bincode::serialize_into(&mut writer, &self.root).map_err(|e| GridError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        writer.flush().map_err(|e| GridError::io(path, e))
    }

    /// Write to `path` through a temporary sibling file and rename.
    pub fn save(&self, path: &Path) -> Result<(), GridError> {
        let tmp = temporary_path(path);
        let result = fs::File::create(&tmp)
            .map_err(|e| GridError::io(&tmp, e))
            .and_then(|file| self.to_writer(BufWriter::new(file), path))
            .and_then(|_| fs::rename(&tmp, path).map_err(|e| GridError::io(path, e)));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    /// Dataset at `name`, if present.
    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        let (groups, last) = split_name(name).ok()?;
        let mut node = &self.root;
        for g in groups {
            node = node.groups.get(g)?;
        }
        node.datasets.get(last)
    }

    /// Create or overwrite the dataset at `name`, creating groups on the way.
    pub fn insert(&mut self, name: &str, dataset: Dataset) -> Result<(), GridError> {
        let (groups, last) = split_name(name)?;
        let mut node = &mut self.root;
        for g in groups {
            node = node.groups.entry(g.to_string()).or_default();
        }
        node.datasets.insert(last.to_string(), dataset);
        Ok(())
    }

    /// Full names of all datasets, depth first.
    pub fn names(&self) -> Vec<String> {
        fn walk(group: &Group, prefix: &str, out: &mut Vec<String>) {
            for name in group.datasets.keys() {
                out.push(format!("{prefix}{name}"));
            }
            for (name, sub) in &group.groups {
                walk(sub, &format!("{prefix}{name}/"), out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".tmp{}", std::process::id()));
    path.with_file_name(name)
}

/// Reader/writer of hierarchical containers.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hierarchical;

impl DatasetReader for Hierarchical {
    fn read_dataset(&self, path: &Path, name: &str) -> Result<Dataset, GridError> {
        Container::open(path)?
            .dataset(name)
            .cloned()
            .ok_or_else(|| GridError::Io {
                path: path.to_path_buf(),
                message: format!("dataset `{name}` not found"),
            })
    }
}

impl DatasetWriter for Hierarchical {
    fn write_dataset(&self, path: &Path, name: &str, dataset: &Dataset) -> Result<(), GridError> {
        let mut container = Container::open_or_new(path)?;
        container.insert(name, dataset.clone())?;
        container.save(path)
    }
}
