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
    author = "The tensorfit developers",
    version,
    about = "tensorfit CLI - Alignment tensor and N-state ensemble model optimisation against residual dipolar coupling data.",
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
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit an N-state model to RDC data: grid search, minimisation, and
    /// optional Monte Carlo error propagation.
    Fit(FitArgs),
    /// Print the full multi-section report for the alignment tensors of a
    /// system.
    Report(ReportArgs),
    /// Compare the alignment tensors of a system by inter-tensor angles and
    /// singular value decomposition.
    Compare(CompareArgs),
}

/// Arguments for the `fit` subcommand.
#[derive(Args, Debug)]
pub struct FitArgs {
    /// Path to the TOML system definition (spins, pairs, alignments).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub system: PathBuf,

    /// Path to the analysis configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override the number of states N from the config file.
    #[arg(short = 'n', long, value_name = "INT")]
    pub n_states: Option<usize>,

    /// Override the grid points per parameter dimension.
    #[arg(long, value_name = "INT")]
    pub increments: Option<usize>,

    /// Override the maximum number of minimisation iterations.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<usize>,

    /// Override the number of Monte Carlo replicates.
    #[arg(long, value_name = "INT")]
    pub replicates: Option<usize>,

    /// Seed for the Monte Carlo random number generator.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Skip the initial grid search and minimise from the current parameters.
    #[arg(long)]
    pub skip_grid: bool,
}

/// Arguments for the `report` subcommand.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Path to the TOML system definition.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub system: PathBuf,

    /// Report a single named tensor instead of all of them.
    #[arg(short, long, value_name = "NAME")]
    pub tensor: Option<String>,

    /// Write the report to a file instead of standard output.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// The tensor vector basis for the `compare` subcommand.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisArg {
    /// The full 3x3 matrices under the Euclidean inner product.
    Matrix,
    /// The 9D unitary Saupe basis.
    Unitary9,
    /// The 5D unitary Saupe basis {Sxx, Syy, Sxy, Sxz, Syz}.
    Unitary5,
    /// The geometric basis {Szz, Sxx-yy, Sxy, Sxz, Syz}.
    Geometric,
    /// The irreducible spherical basis {A-2, A-1, A0, A1, A2}.
    Irreducible,
}

/// Arguments for the `compare` subcommand.
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Path to the TOML system definition.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub system: PathBuf,

    /// The vector basis for the comparison.
    #[arg(short, long, value_enum, default_value_t = BasisArg::Irreducible)]
    pub basis: BasisArg,

    /// Also stack the tensors and report singular values and the condition
    /// number (unavailable for the matrix basis).
    #[arg(long)]
    pub svd: bool,
}
