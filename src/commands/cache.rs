/// `takt cache` command implementation
///
/// Manages committed step outputs (status, list, stats, clean).
use anyhow::{Context, Result};

use crate::cli::{CacheArgs, CacheCommands};
use crate::cli_utils::takt_prefix;
use takt::CacheStore;

pub fn run(args: &CacheArgs) -> Result<()> {
    let project = super::project_dir(&args.common);
    let store = CacheStore::new(&project).context("Failed to open cache store")?;

    match &args.command {
        CacheCommands::Status { config } => status(args, &store, config),
        CacheCommands::List { verbose } => list(&store, *verbose),
        CacheCommands::Stats => stats(&store),
        CacheCommands::Clean { hash, all } => clean(&store, hash.as_deref(), *all),
    }
}

/// Show per-step hit/miss for a plan's cached steps
fn status(args: &CacheArgs, store: &CacheStore, config: &str) -> Result<()> {
    let plan = super::load_plan(&args.common, config)?;

    println!("Cache status for {} ({} steps):", config, plan.len());
    println!();

    for step in plan.steps() {
        match &step.hash {
            Some(hash) if store.has(hash) => {
                println!("  [{}] {} HIT    {}", step.position, step.name, hash);
            }
            Some(hash) => {
                println!("  [{}] {} MISS   {}", step.position, step.name, hash);
            }
            None => {
                println!("  [{}] {} (not cached)", step.position, step.name);
            }
        }
    }

    Ok(())
}

/// List all committed cache entries
fn list(store: &CacheStore, verbose: bool) -> Result<()> {
    let entries = store.list().context("Failed to list cache entries")?;

    if entries.is_empty() {
        println!("No cache entries.");
        return Ok(());
    }

    println!("Cache entries ({}):", entries.len());
    println!();

    for hash in entries {
        println!("  {}", hash);

        if verbose {
            if let Some(sidecar) = store.read_sidecar(&hash)? {
                println!("    Step: {}", sidecar.step);
                println!("    Routine: {}", sidecar.routine);
                println!(
                    "    Created: {}",
                    sidecar.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!();
        }
    }

    Ok(())
}

/// Show aggregate cache statistics
fn stats(store: &CacheStore) -> Result<()> {
    let report = store.report().context("Failed to get cache statistics")?;

    println!("Cache Statistics");
    println!();
    println!("Total entries: {}", report.total_entries);
    println!(
        "Total size: {:.2} MB",
        report.total_size_bytes as f64 / 1_000_000.0
    );
    println!("Total files: {}", report.total_files);

    Ok(())
}

/// Remove one entry, or everything with --all
fn clean(store: &CacheStore, hash: Option<&str>, all: bool) -> Result<()> {
    if all {
        println!("{} Cleaning all cache entries...", takt_prefix());
        store.clean_all().context("Failed to clean cache")?;
        println!("{} Cache cleaned.", takt_prefix());
        return Ok(());
    }

    let Some(hash) = hash else {
        anyhow::bail!("Specify --all to clean everything, or provide an entry hash");
    };

    store
        .remove(hash)
        .with_context(|| format!("Failed to remove cache entry: {hash}"))?;
    println!("{} Removed cache entry: {}", takt_prefix(), hash);

    Ok(())
}
