//! `stagger-post`: post-processing of staggered-grid simulation output.
//!
//! ```text
//! stagger-post convert --source phi.dat --destination phi.h5 --nx 8 --ny 8
//! stagger-post vorticity --directory run --nstart 0 --nend 1000 --nstep 100
//! mpirun -n 4 stagger-post interpolate --config interp.json
//! ```
//!
//! Options are read from `--config <file.json>` first; flags override single
//! values.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::error;
use serde::de::DeserializeOwned;

use stagger_post::algs::communicator::Communicator;
use stagger_post::algs::interpolate::ExteriorMode;
use stagger_post::config::{
    ConvertOptions, CropOptions, Direction, GridOptions, InterpolateOptions, VorticityOptions,
    load_json,
};
use stagger_post::data::bc::ExteriorHaloOptions;
use stagger_post::drivers;
use stagger_post::grid_error::GridError;
use stagger_post::io::Encoding;

#[derive(Parser)]
#[command(name = "stagger-post")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Post-processing for staggered-grid CFD output", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a field between the flat and hierarchical encodings
    Convert(ConvertArgs),
    /// Interpolate a field onto another grid
    Interpolate(InterpolateArgs),
    /// Compute the vorticity of a range of snapshots
    Vorticity(VorticityArgs),
    /// Cut a box out of a field
    Crop(CropArgs),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Convert(_) => "convert",
            Commands::Interpolate(_) => "interpolate",
            Commands::Vorticity(_) => "vorticity",
            Commands::Crop(_) => "crop",
        }
    }
}

fn load_or_default<T: DeserializeOwned + Default>(config: Option<&Path>) -> Result<T, GridError> {
    config.map_or_else(|| Ok(T::default()), load_json)
}

macro_rules! set_if {
    ($target:expr, $value:expr) => {
        if let Some(v) = $value.clone() {
            $target = v;
        }
    };
}

#[derive(Args, Clone, Default)]
struct GridArgs {
    #[arg(long)]
    nx: Option<usize>,
    #[arg(long)]
    ny: Option<usize>,
    /// Makes the grid 3-D
    #[arg(long)]
    nz: Option<usize>,
    #[arg(long)]
    periodic_x: Option<bool>,
    #[arg(long)]
    periodic_y: Option<bool>,
    #[arg(long)]
    periodic_z: Option<bool>,
    #[arg(long)]
    halo_width: Option<usize>,
    /// Workers per axis, e.g. `2,2,1`
    #[arg(long, value_delimiter = ',', num_args = 3)]
    process_grid: Option<Vec<usize>>,
}

impl GridArgs {
    fn apply(&self, grid: &mut GridOptions) -> Result<(), GridError> {
        if self.nx.is_some() {
            grid.nx = self.nx;
        }
        if self.ny.is_some() {
            grid.ny = self.ny;
        }
        if self.nz.is_some() {
            grid.nz = self.nz;
        }
        set_if!(grid.periodic_x, self.periodic_x);
        set_if!(grid.periodic_y, self.periodic_y);
        set_if!(grid.periodic_z, self.periodic_z);
        set_if!(grid.halo_width, self.halo_width);
        if let Some(shape) = &self.process_grid {
            let shape: [usize; 3] = shape.as_slice().try_into().map_err(|_| {
                GridError::Config(format!("process grid needs 3 counts, got {}", shape.len()))
            })?;
            grid.process_grid = Some(shape);
        }
        Ok(())
    }
}

#[derive(Args)]
struct ConvertArgs {
    /// JSON options file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    source: Option<PathBuf>,
    #[arg(long)]
    destination: Option<PathBuf>,
    /// `flat-to-hierarchical` or `hierarchical-to-flat`
    #[arg(long)]
    direction: Option<Direction>,
    /// Dataset name in the hierarchical file
    #[arg(long)]
    name: Option<String>,
    #[command(flatten)]
    grid: GridArgs,
}

impl ConvertArgs {
    fn options(&self) -> Result<ConvertOptions, GridError> {
        let mut opts: ConvertOptions = load_or_default(self.config.as_deref())?;
        set_if!(opts.source, self.source);
        set_if!(opts.destination, self.destination);
        set_if!(opts.direction, self.direction);
        set_if!(opts.name, self.name);
        self.grid.apply(&mut opts.grid)?;
        Ok(opts)
    }
}

#[derive(Args)]
struct InterpolateArgs {
    /// JSON options file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    source: Option<PathBuf>,
    #[arg(long)]
    source_name: Option<String>,
    #[arg(long)]
    source_grid: Option<PathBuf>,
    #[arg(long)]
    source_encoding: Option<Encoding>,
    /// Value of the source's exterior halo cells
    #[arg(long)]
    bc_value: Option<f64>,
    #[arg(long)]
    destination: Option<PathBuf>,
    #[arg(long)]
    destination_name: Option<String>,
    #[arg(long)]
    destination_grid: Option<PathBuf>,
    #[arg(long)]
    destination_encoding: Option<Encoding>,
    /// `clamp` or `ghost`
    #[arg(long)]
    mode: Option<ExteriorMode>,
    #[command(flatten)]
    grid: GridArgs,
}

impl InterpolateArgs {
    fn options(&self) -> Result<InterpolateOptions, GridError> {
        let mut opts: InterpolateOptions = load_or_default(self.config.as_deref())?;
        set_if!(opts.source.path, self.source);
        set_if!(opts.source.name, self.source_name);
        set_if!(opts.source.grid_path, self.source_grid);
        set_if!(opts.source.encoding, self.source_encoding);
        if let Some(value) = self.bc_value {
            opts.source.exterior = ExteriorHaloOptions::Constant { value };
        }
        set_if!(opts.destination.path, self.destination);
        set_if!(opts.destination.name, self.destination_name);
        set_if!(opts.destination.grid_path, self.destination_grid);
        set_if!(opts.destination.encoding, self.destination_encoding);
        set_if!(opts.mode, self.mode);
        // grid flags describe both grids
        self.grid.apply(&mut opts.source.grid)?;
        let mut dst = self.grid.clone();
        dst.nx = None;
        dst.ny = None;
        dst.apply(&mut opts.destination.grid)?;
        Ok(opts)
    }
}

#[derive(Args)]
struct VorticityArgs {
    /// JSON options file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    directory: Option<PathBuf>,
    #[arg(long)]
    output_directory: Option<PathBuf>,
    /// Directory of the grid files (default `<directory>/grids`)
    #[arg(long)]
    grid_path: Option<PathBuf>,
    #[arg(long)]
    nstart: Option<u64>,
    #[arg(long)]
    nend: Option<u64>,
    #[arg(long)]
    nstep: Option<u64>,
    #[command(flatten)]
    grid: GridArgs,
}

impl VorticityArgs {
    fn options(&self) -> Result<VorticityOptions, GridError> {
        let mut opts: VorticityOptions = load_or_default(self.config.as_deref())?;
        set_if!(opts.directory, self.directory);
        if self.output_directory.is_some() {
            opts.output_directory = self.output_directory.clone();
        }
        if self.grid_path.is_some() {
            opts.grid_path = self.grid_path.clone();
        }
        set_if!(opts.steps.nstart, self.nstart);
        set_if!(opts.steps.nend, self.nend);
        set_if!(opts.steps.nstep, self.nstep);
        self.grid.apply(&mut opts.grid)?;
        Ok(opts)
    }
}

#[derive(Args)]
struct CropArgs {
    /// JSON options file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    source: Option<PathBuf>,
    #[arg(long)]
    destination: Option<PathBuf>,
    #[arg(long)]
    grid_path: Option<PathBuf>,
    #[arg(long)]
    output_grid_path: Option<PathBuf>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    encoding: Option<Encoding>,
    #[arg(long, allow_hyphen_values = true)]
    x_start: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    x_end: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    y_start: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    y_end: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    z_start: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    z_end: Option<f64>,
    #[command(flatten)]
    grid: GridArgs,
}

impl CropArgs {
    fn options(&self) -> Result<CropOptions, GridError> {
        let mut opts: CropOptions = load_or_default(self.config.as_deref())?;
        set_if!(opts.source, self.source);
        set_if!(opts.destination, self.destination);
        set_if!(opts.grid_path, self.grid_path);
        if self.output_grid_path.is_some() {
            opts.output_grid_path = self.output_grid_path.clone();
        }
        set_if!(opts.name, self.name);
        set_if!(opts.encoding, self.encoding);
        for (target, value) in [
            (&mut opts.x_start, self.x_start),
            (&mut opts.x_end, self.x_end),
            (&mut opts.y_start, self.y_start),
            (&mut opts.y_end, self.y_end),
            (&mut opts.z_start, self.z_start),
            (&mut opts.z_end, self.z_end),
        ] {
            if value.is_some() {
                *target = value;
            }
        }
        self.grid.apply(&mut opts.grid)?;
        Ok(opts)
    }
}

fn execute<C: Communicator>(comm: &C, command: &Commands) -> Result<(), GridError> {
    match command {
        Commands::Convert(args) => drivers::convert::run(comm, &args.options()?),
        Commands::Interpolate(args) => drivers::interpolate::run(comm, &args.options()?),
        Commands::Vorticity(args) => drivers::vorticity::run(comm, &args.options()?),
        Commands::Crop(args) => drivers::crop::run(comm, &args.options()?),
    }
}

#[cfg(feature = "mpi-support")]
fn world() -> Result<stagger_post::algs::communicator::MpiComm, GridError> {
    stagger_post::algs::communicator::MpiComm::new()
}

#[cfg(not(feature = "mpi-support"))]
fn world() -> Result<stagger_post::algs::communicator::NoComm, GridError> {
    Ok(stagger_post::algs::communicator::NoComm)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str()))
        .format_timestamp(None)
        .init();

    let operation = cli.command.name();
    let (rank, outcome) = match world() {
        Ok(comm) => (comm.rank(), execute(&comm, &cli.command)),
        Err(e) => (0, Err(e)),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{operation} failed on rank {rank}: {} ({e})", e.kind());
            eprintln!("stagger-post {operation}: {} on rank {rank}: {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}
