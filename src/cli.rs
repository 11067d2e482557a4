use clap::{Parser, Subcommand};

/// Takt - Memoized dependency-pipeline engine
///
/// Takt executes declarative step plans through pluggable routines, caching
/// each step's output on disk under a content hash of its configuration.
#[derive(Parser, Debug)]
#[command(name = "takt")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Memoized dependency-pipeline engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Common configuration arguments shared across commands
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Project directory holding cache entries and configuration files
    #[arg(long, env = "TAKT_PROJECT_DIR", default_value = ".")]
    pub project: String,

    /// Routines manifest file (default: _init_routines.json in the project directory)
    #[arg(long, env = "TAKT_MANIFEST")]
    pub manifest: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and validate execution plans
    Plan(PlanArgs),

    /// Manage the step output cache
    Cache(CacheArgs),
}

#[derive(Parser, Debug)]
pub struct PlanArgs {
    #[command(subcommand)]
    pub command: PlanCommands,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Subcommand, Debug)]
pub enum PlanCommands {
    /// Load and validate a plan configuration
    Validate {
        /// Plan configuration file
        config: String,
    },

    /// Show the resolved per-step plan
    Show {
        /// Plan configuration file
        config: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Per-step cache status for a plan's cached steps
    Status {
        /// Plan configuration file
        config: String,
    },

    /// List committed cache entries
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show cache statistics
    Stats,

    /// Remove cache entries
    Clean {
        /// Entry hash to remove (omit with --all)
        hash: Option<String>,

        /// Remove all entries and clear the staging directory
        #[arg(long)]
        all: bool,
    },
}
