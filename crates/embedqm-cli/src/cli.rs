use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu",
    version,
    about = "embedqm CLI - Self-consistent QM/MM coupling of a quantum core embedded in a polarizable classical environment.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used to run jobs in parallel.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate every job of a job file until self-consistency.
    Run(RunArgs),
    /// Validate a job file and configuration without running any program.
    Check(CheckArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the job file in TOML format.
    #[arg(short = 'i', long, required = true, value_name = "PATH")]
    pub jobs: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Write a CSV summary of all jobs to this path.
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,

    /// Do not write a separate `job.log` into each job directory.
    #[arg(long)]
    pub no_job_logs: bool,
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the job file in TOML format.
    #[arg(short = 'i', long, required = true, value_name = "PATH")]
    pub jobs: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Configuration sources shared by all subcommands.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the base directory under which job directories are created.
    #[arg(short, long, value_name = "PATH")]
    pub work_dir: Option<PathBuf>,

    /// Override the maximum number of outer iterations.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<usize>,

    #[command(flatten)]
    pub mode: ModeFlags,

    /// Archive the QM result of every iteration.
    #[arg(long)]
    pub archive: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S convergence.max-iterations=10
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Mutually exclusive flags selecting the coupling mode.
#[derive(Args, Debug, Clone, Copy, Default)]
#[group(required = false, multiple = false)]
pub struct ModeFlags {
    /// Run a single QM calculation in a fixed classical background.
    #[arg(long = "static")]
    pub static_mode: bool,
    /// Iterate classical induction and QM calculations to self-consistency.
    #[arg(long)]
    pub polarizable: bool,
}
