use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use sxflow_resource::DeliveryMode;

#[derive(Clone, Debug, Parser)]
#[command(name = "sxflow", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    #[command(subcommand)]
    pub cmd: Commands,

    /// Configuration file. Defaults to the nearest sxflow.toml or .sxflow.toml.
    #[arg(long, short, global = true, env = "SXFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Endpoint name from the configuration.
    #[arg(long, short, global = true)]
    pub endpoint: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Deliver every sample of a batch file
    #[command(alias = "d", name = "deliver")]
    Deliver(DeliverArgs),
    /// Inspect or prune the local cache
    #[command(subcommand, name = "cache")]
    Cache(CacheCommands),
    /// List the endpoint's code generators
    #[command(alias = "cg", name = "codegens")]
    Codegens {
        /// Ask the endpoint instead of using the cached list
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Clone, Debug, Args)]
pub struct DeliverArgs {
    /// Batch file with the sample descriptors (.toml or .json)
    pub batch: PathBuf,

    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Samples delivered at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Resubmit every sample even when a cached result exists
    #[arg(long)]
    pub ignore_cache: bool,

    /// Fail samples whose transform lost input files
    #[arg(long)]
    pub fail_if_incomplete: bool,

    /// Check codegen names against the endpoint before delivering
    #[arg(long)]
    pub check_codegens: bool,

    /// Print each artifact's path or URL
    #[arg(long, short)]
    pub list: bool,
}

#[derive(Clone, Debug, Subcommand)]
pub enum CacheCommands {
    #[command(alias = "ls", name = "list")]
    List,
    /// Remove the record with this fingerprint
    #[command(alias = "rm", name = "remove")]
    Remove { fingerprint: String },
    /// Remove every record produced by this transform
    #[command(name = "remove-transform")]
    RemoveTransform { transform_id: String },
    /// Remove every record not currently being delivered
    #[command(name = "clear")]
    Clear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Download,
    SignedUrls,
}

impl From<ModeArg> for DeliveryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Download => DeliveryMode::Download,
            ModeArg::SignedUrls => DeliveryMode::SignedUrls,
        }
    }
}
