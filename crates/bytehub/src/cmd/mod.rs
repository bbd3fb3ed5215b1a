use std::path::PathBuf;

use bytehub::subsys::Builtin;
use bytehub::transport::DEFAULT_CHUNK_SIZE;
use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod doctor;
#[cfg(unix)]
pub mod listen;
pub mod replay;
pub mod subsystems;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Demultiplex a recorded stream from a file or stdin.
    Replay(ReplayArgs),
    /// Bind a Unix socket and demultiplex each connection.
    #[cfg(unix)]
    Listen(ListenArgs),
    /// List the built-in subsystems and their registry slots.
    Subsystems(SubsystemsArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Replay(args) => replay::run(args, format),
        #[cfg(unix)]
        Command::Listen(args) => listen::run(args, format),
        Command::Subsystems(args) => subsystems::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Doctor(args) => doctor::run(args, format),
    }
}

/// Hub settings shared by every command that runs sessions.
#[derive(Args, Debug, Default)]
pub struct HubArgs {
    /// JSON hub configuration file.
    #[arg(long, env = "BYTEHUB_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Registry capacity (minimum 2).
    #[arg(long, env = "BYTEHUB_MAX_SUBSYSTEMS", value_name = "N")]
    pub max_subsystems: Option<usize>,
    /// Probe buffer size per session in bytes (minimum 16).
    #[arg(long, env = "BYTEHUB_PROBE_BUFFER", value_name = "BYTES")]
    pub probe_buffer: Option<usize>,
    /// Quiet period that ends a timed discard, in milliseconds.
    #[arg(long, env = "BYTEHUB_QUIET_PERIOD_MS", value_name = "MS")]
    pub quiet_period_ms: Option<u64>,
    /// Built-in subsystems to enable (comma-separated). Default: all.
    #[arg(long, value_delimiter = ',', value_name = "NAME")]
    pub enable: Option<Vec<Builtin>>,
    /// Bytes requested per read.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_name = "BYTES")]
    pub chunk_size: usize,
    /// Do not print individual frames, only session summaries.
    #[arg(long)]
    pub no_frames: bool,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Input file. Reads stdin when omitted or `-`.
    pub path: Option<PathBuf>,
    #[command(flatten)]
    pub hub: HubArgs,
}

#[cfg(unix)]
#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after serving N connections.
    #[arg(long)]
    pub connections: Option<usize>,
    /// Read timeout that drives quiet-period checks on idle connections (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub idle_tick: String,
    #[command(flatten)]
    pub hub: HubArgs,
}

#[derive(Args, Debug)]
pub struct SubsystemsArgs {
    #[command(flatten)]
    pub hub: HubArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}
