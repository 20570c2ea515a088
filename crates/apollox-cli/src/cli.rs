use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "ApolloX Developers",
    version,
    about = "ApolloX CLI - Surrogate-guided particle-swarm search over short-range-order descriptors for materials discovery.",
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

    /// Set the number of threads for descriptor computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the initial population of a run from a template structure.
    Seed(SeedArgs),
    /// Run (or resume) the generation loop of a seeded run.
    Run(RunArgs),
    /// Compute SRO descriptors for a directory of structure files.
    Describe(DescribeArgs),
}

/// Overrides shared by the `seed` and `run` subcommands.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override the template structure file.
    #[arg(short, long, value_name = "PATH")]
    pub template: Option<PathBuf>,

    /// Override the run directory.
    #[arg(short, long, value_name = "DIR")]
    pub run_dir: Option<PathBuf>,

    /// Override the number of generations.
    #[arg(short, long, value_name = "INT")]
    pub generations: Option<u32>,

    /// Override the number of structures carried into each generation.
    #[arg(short = 'n', long, value_name = "INT")]
    pub structures_per_generation: Option<usize>,

    /// Override the number of concurrent relaxations.
    #[arg(short = 'w', long, value_name = "INT")]
    pub max_workers: Option<usize>,

    /// Seed the random number generators for a reproducible run.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S swarm.iterations=200
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `seed` subcommand.
#[derive(Args, Debug)]
pub struct SeedArgs {
    #[command(flatten)]
    pub search: SearchArgs,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub search: SearchArgs,

    /// Override the feature-scaling statistics file.
    #[arg(long, value_name = "PATH")]
    pub scaler: Option<PathBuf>,
}

/// Descriptor orders selectable on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Pair,
    Triple,
    Quadruple,
}

/// Arguments for the `describe` subcommand.
#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Directory containing the structure files.
    #[arg(required = true, value_name = "DIR")]
    pub input_dir: PathBuf,

    /// Path for the output descriptor table (CSV).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Pair distance cutoff.
    #[arg(long, default_value_t = 5.0, value_name = "FLOAT")]
    pub cutoff: f64,

    /// Cluster orders to count. Can be used multiple times.
    #[arg(short, long = "mode", value_enum, default_values_t = [ModeArg::Pair])]
    pub modes: Vec<ModeArg>,

    /// Only describe files whose names start with this prefix.
    #[arg(long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Only describe files whose names end with this suffix.
    #[arg(long, value_name = "SUFFIX")]
    pub suffix: Option<String>,
}
