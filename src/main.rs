mod cli;
mod cli_utils;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize structured logging
    takt::logging::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Plan(args) => commands::plan::run(&args),
        Commands::Cache(args) => commands::cache::run(&args),
    }
}
