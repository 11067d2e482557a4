/// `takt plan` command implementation
///
/// Offline plan inspection: validate a configuration, or show the resolved
/// per-step plan with parameter closures and hashes.
use anyhow::Result;

use crate::cli::{PlanArgs, PlanCommands};
use crate::cli_utils::takt_prefix;
use takt::Plan;

pub fn run(args: &PlanArgs) -> Result<()> {
    match &args.command {
        PlanCommands::Validate { config } => validate(args, config),
        PlanCommands::Show { config, json } => show(args, config, *json),
    }
}

/// Load and validate a plan, printing a summary
fn validate(args: &PlanArgs, config: &str) -> Result<()> {
    let plan = super::load_plan(&args.common, config)?;

    let cached = plan.steps().iter().filter(|s| s.cached).count();
    println!("{} Plan is valid: {}", takt_prefix(), config);
    println!("  Steps: {}", plan.len());
    println!("  Cached: {}", cached);
    println!("  Non-cached: {}", plan.len() - cached);

    Ok(())
}

/// Show the resolved per-step plan
fn show(args: &PlanArgs, config: &str, json: bool) -> Result<()> {
    let plan = super::load_plan(&args.common, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(plan.steps())?);
        return Ok(());
    }

    print_table(&plan);
    Ok(())
}

fn print_table(plan: &Plan) {
    println!("Plan ({} steps):", plan.len());
    println!();

    for step in plan.steps() {
        println!("  [{}] {}", step.position, step.name);
        println!("    Routine: {}", step.routine);

        if !step.parents.is_empty() {
            println!("    Parents: {}", step.parents.join(", "));
        }

        println!(
            "    Parameters: {}",
            step.parameters
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );

        if !step.invariant.is_empty() {
            println!(
                "    Invariant: {}",
                step.invariant
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        match &step.hash {
            Some(hash) => println!("    Hash: {}", hash),
            None => println!("    Hash: (not cached)"),
        }

        println!();
    }
}
