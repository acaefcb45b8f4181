use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Strata: aggressivity stratification for breast cancer cohorts
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Per-cancer-type aggressivity stratification with k-means")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Patient table (CSV or TSV, optionally gzipped); overrides the config
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Directory for persisted models; overrides the config
    #[arg(long, global = true)]
    pub models_dir: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train and persist models for every cancer type, or the given ones
    Train(TrainArgs),

    /// Classify one patient from a JSON feature object
    Predict(PredictArgs),

    /// List every labeled patient
    Patients(OutputArgs),

    /// Highest-severity patients by prognostic index
    TopRisk(TopRiskArgs),

    /// Patient count and covariate means per severity level
    Stats(OutputArgs),

    /// Patient count per cancer type and severity level
    Counts(OutputArgs),

    /// Distinct cancer types in the dataset
    CancerTypes(OutputArgs),
}

/// Output destination shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Write JSON to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Training arguments
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Cancer type to train (repeatable); all types when omitted
    #[arg(short = 't', long = "cancer-type")]
    pub cancer_types: Vec<String>,

    /// Retrain even when a saved model exists
    #[arg(short, long)]
    pub force: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Prediction arguments
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// JSON feature object, or `-` for stdin
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Cancer type; falls back to the input's "Cancer Type" key
    #[arg(short = 't', long)]
    pub cancer_type: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Top-risk arguments
#[derive(Args, Debug)]
pub struct TopRiskArgs {
    /// Number of patients to return
    #[arg(short, default_value = "10")]
    pub n: usize,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl Commands {
    /// Output destination of the selected command
    pub fn output(&self) -> &OutputArgs {
        match self {
            Commands::Train(args) => &args.output,
            Commands::Predict(args) => &args.output,
            Commands::TopRisk(args) => &args.output,
            Commands::Patients(output)
            | Commands::Stats(output)
            | Commands::Counts(output)
            | Commands::CancerTypes(output) => output,
        }
    }
}

impl PredictArgs {
    /// Whether the feature object is read from stdin
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity
pub fn setup_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
