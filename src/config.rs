//! Driver configuration.
//!
//! Every driver takes one immutable options value. Values come from a JSON
//! file ([`load_json`]) with missing keys filled from the defaults, and the
//! binary then overrides single fields from its command line. `validate`
//! rejects inconsistent values with [`GridError::Config`] before any
//! collective work starts.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::algs::interpolate::ExteriorMode;
use crate::data::bc::ExteriorHaloOptions;
use crate::data::field::DEFAULT_HALO_WIDTH;
use crate::grid_error::GridError;
use crate::io::Encoding;
use crate::topology::process_grid::ProcessGrid;

/// Read a JSON options file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, GridError> {
    let text = fs::read_to_string(path).map_err(|e| GridError::io(path, e))?;
    serde_json::from_str(&text)
        .map_err(|e| GridError::Config(format!("{}: {e}", path.display())))
}

/// Extents, periodicity and decomposition of one grid.
///
/// `nz` decides the dimensionality: a grid is 3-D exactly when `nz` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    pub nx: Option<usize>,
    pub ny: Option<usize>,
    pub nz: Option<usize>,
    pub periodic_x: bool,
    pub periodic_y: bool,
    pub periodic_z: bool,
    pub halo_width: usize,
    /// Workers per axis; decided from the extents when absent.
    pub process_grid: Option<[usize; 3]>,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            nx: None,
            ny: None,
            nz: None,
            periodic_x: false,
            periodic_y: false,
            periodic_z: false,
            halo_width: DEFAULT_HALO_WIDTH,
            process_grid: None,
        }
    }
}

impl GridOptions {
    #[inline]
    pub fn dim(&self) -> usize {
        if self.nz.is_some() { 3 } else { 2 }
    }

    pub fn periodic(&self) -> Vec<bool> {
        [self.periodic_x, self.periodic_y, self.periodic_z][..self.dim()].to_vec()
    }

    /// Global extents; every extent of the grid's dimensionality must be set.
    pub fn extents(&self) -> Result<Vec<usize>, GridError> {
        [("nx", self.nx), ("ny", self.ny), ("nz", self.nz)][..self.dim()]
            .iter()
            .map(|&(key, n)| n.ok_or_else(|| GridError::Config(format!("`{key}` is not set"))))
            .collect()
    }

    /// Check the extents that are set against extents read from a grid file.
    pub fn check_extents(&self, found: &[usize]) -> Result<(), GridError> {
        let given = [self.nx, self.ny, self.nz];
        if found.len() != self.dim()
            || given.iter().zip(found).any(|(g, &f)| g.is_some_and(|g| g != f))
        {
            return Err(GridError::ShapeMismatch {
                context: "grid options against the grid file".into(),
                expected: given.iter().take(self.dim()).map(|g| g.unwrap_or(0)).collect(),
                found: found.to_vec(),
            });
        }
        Ok(())
    }

    /// Explicit process grid, if configured.
    pub fn process_grid(&self) -> Result<Option<ProcessGrid>, GridError> {
        self.process_grid.map(ProcessGrid::new).transpose()
    }

    pub fn validate(&self) -> Result<(), GridError> {
        for (key, n) in [("nx", self.nx), ("ny", self.ny), ("nz", self.nz)] {
            if n == Some(0) {
                return Err(GridError::Config(format!("`{key}` must be positive")));
            }
        }
        if self.dim() == 2 && self.periodic_z {
            return Err(GridError::Config(
                "`periodic_z` is set but the grid is 2-D (no `nz`)".into(),
            ));
        }
        if self.halo_width == 0 {
            return Err(GridError::Config("`halo_width` must be at least 1".into()));
        }
        if let Some(shape) = self.process_grid {
            if self.dim() == 2 && shape[2] != 1 {
                return Err(GridError::Config(format!(
                    "process grid {shape:?} has {} workers along z of a 2-D grid",
                    shape[2]
                )));
            }
            ProcessGrid::new(shape)?;
        }
        Ok(())
    }
}

/// Time-step range `nstart..=nend` with stride `nstep`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSteps {
    pub nstart: u64,
    pub nend: u64,
    pub nstep: u64,
}

impl Default for TimeSteps {
    fn default() -> Self {
        Self {
            nstart: 0,
            nend: 0,
            nstep: 1,
        }
    }
}

impl TimeSteps {
    pub fn iter(&self) -> impl Iterator<Item = u64> + use<> {
        let step = self.nstep.max(1) as usize;
        (self.nstart..=self.nend).step_by(step)
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if self.nstep == 0 {
            return Err(GridError::Config("`nstep` must be positive".into()));
        }
        if self.nend < self.nstart {
            return Err(GridError::Config(format!(
                "`nend` ({}) is before `nstart` ({})",
                self.nend, self.nstart
            )));
        }
        Ok(())
    }
}

/// Direction of an encoding conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    FlatToHierarchical,
    HierarchicalToFlat,
}

impl Direction {
    pub fn source(self) -> Encoding {
        match self {
            Direction::FlatToHierarchical => Encoding::Flat,
            Direction::HierarchicalToFlat => Encoding::Hierarchical,
        }
    }

    pub fn destination(self) -> Encoding {
        match self {
            Direction::FlatToHierarchical => Encoding::Hierarchical,
            Direction::HierarchicalToFlat => Encoding::Flat,
        }
    }
}

impl FromStr for Direction {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat-to-hierarchical" => Ok(Direction::FlatToHierarchical),
            "hierarchical-to-flat" => Ok(Direction::HierarchicalToFlat),
            other => Err(GridError::Config(format!(
                "unknown direction `{other}` (expected `flat-to-hierarchical` or `hierarchical-to-flat`)"
            ))),
        }
    }
}

fn require_path(key: &str, path: &Path) -> Result<(), GridError> {
    if path.as_os_str().is_empty() {
        return Err(GridError::Config(format!("`{key}` is not set")));
    }
    Ok(())
}

/// Options of the `convert` driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub direction: Direction,
    /// Dataset name inside the hierarchical file.
    pub name: String,
    pub grid: GridOptions,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            direction: Direction::default(),
            name: "phi".to_string(),
            grid: GridOptions::default(),
        }
    }
}

impl ConvertOptions {
    pub fn validate(&self) -> Result<(), GridError> {
        require_path("source", &self.source)?;
        require_path("destination", &self.destination)?;
        if self.name.is_empty() {
            return Err(GridError::Config("`name` is empty".into()));
        }
        self.grid.validate()?;
        self.grid.extents().map(|_| ())
    }
}

/// One field of the `interpolate` driver: values, gridlines and boundary
/// treatment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOptions {
    pub path: PathBuf,
    pub name: String,
    pub encoding: Encoding,
    /// Hierarchical file holding the `x`, `y` (and `z`) gridlines.
    pub grid_path: PathBuf,
    pub grid: GridOptions,
    pub exterior: ExteriorHaloOptions,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            name: "phi".to_string(),
            encoding: Encoding::default(),
            grid_path: PathBuf::new(),
            grid: GridOptions::default(),
            exterior: ExteriorHaloOptions::default(),
        }
    }
}

impl FieldOptions {
    pub fn validate(&self, role: &str) -> Result<(), GridError> {
        require_path(&format!("{role}.path"), &self.path)?;
        require_path(&format!("{role}.grid_path"), &self.grid_path)?;
        if self.name.is_empty() {
            return Err(GridError::Config(format!("`{role}.name` is empty")));
        }
        self.grid.validate()?;
        self.exterior.validate()
    }
}

/// Options of the `interpolate` driver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolateOptions {
    pub source: FieldOptions,
    pub destination: FieldOptions,
    pub mode: ExteriorMode,
}

impl InterpolateOptions {
    pub fn validate(&self) -> Result<(), GridError> {
        self.source.validate("source")?;
        self.destination.validate("destination")?;
        if self.source.grid.dim() != self.destination.grid.dim() {
            return Err(GridError::Config(format!(
                "source grid is {}-D but destination grid is {}-D",
                self.source.grid.dim(),
                self.destination.grid.dim()
            )));
        }
        Ok(())
    }
}

/// Options of the `vorticity` driver.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VorticityOptions {
    /// Simulation directory holding `grids/` and the `NNNNNNN/` snapshots.
    pub directory: PathBuf,
    /// Where vorticity snapshots go; `directory` when absent.
    pub output_directory: Option<PathBuf>,
    /// Directory of the per-component grid files; `directory/grids` when
    /// absent.
    pub grid_path: Option<PathBuf>,
    #[serde(flatten)]
    pub steps: TimeSteps,
    pub grid: GridOptions,
}

impl VorticityOptions {
    pub fn grids_directory(&self) -> PathBuf {
        self.grid_path
            .clone()
            .unwrap_or_else(|| self.directory.join("grids"))
    }

    pub fn output_directory(&self) -> &Path {
        self.output_directory.as_deref().unwrap_or(&self.directory)
    }

    pub fn validate(&self) -> Result<(), GridError> {
        require_path("directory", &self.directory)?;
        self.steps.validate()?;
        self.grid.validate()
    }
}

/// Options of the `crop` driver. Bounds default to the whole axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub grid_path: PathBuf,
    /// Where the cropped gridlines go; `grid.h5` next to `destination` when
    /// absent.
    pub output_grid_path: Option<PathBuf>,
    pub name: String,
    pub encoding: Encoding,
    pub x_start: Option<f64>,
    pub x_end: Option<f64>,
    pub y_start: Option<f64>,
    pub y_end: Option<f64>,
    pub z_start: Option<f64>,
    pub z_end: Option<f64>,
    pub grid: GridOptions,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            destination: PathBuf::new(),
            grid_path: PathBuf::new(),
            output_grid_path: None,
            name: "phi".to_string(),
            encoding: Encoding::default(),
            x_start: None,
            x_end: None,
            y_start: None,
            y_end: None,
            z_start: None,
            z_end: None,
            grid: GridOptions::default(),
        }
    }
}

impl CropOptions {
    /// `(lo, hi)` per axis of the grid's dimensionality.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        [
            (self.x_start, self.x_end),
            (self.y_start, self.y_end),
            (self.z_start, self.z_end),
        ][..self.grid.dim()]
            .iter()
            .map(|&(lo, hi)| (lo.unwrap_or(f64::NEG_INFINITY), hi.unwrap_or(f64::INFINITY)))
            .collect()
    }

    pub fn output_grid_path(&self) -> PathBuf {
        self.output_grid_path
            .clone()
            .unwrap_or_else(|| self.destination.with_file_name("grid.h5"))
    }

    pub fn validate(&self) -> Result<(), GridError> {
        require_path("source", &self.source)?;
        require_path("destination", &self.destination)?;
        require_path("grid_path", &self.grid_path)?;
        self.grid.validate()?;
        for (axis, (lo, hi)) in ["x", "y", "z"].iter().zip(self.bounds()) {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(GridError::Config(format!(
                    "crop bounds [{lo}, {hi}] along {axis} are empty"
                )));
            }
        }
        Ok(())
    }
}
