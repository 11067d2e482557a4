pub mod cache;
pub mod plan;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::cli::CommonArgs;
use takt::{default_manifest_path, normalize_config_path, Plan, PlanConfig, RoutineManifest};

/// Resolve the project directory from common arguments.
pub fn project_dir(common: &CommonArgs) -> PathBuf {
    PathBuf::from(&common.project)
}

/// Load the routines manifest named by the common arguments.
pub fn load_manifest(common: &CommonArgs, project: &Path) -> Result<RoutineManifest> {
    let path = match &common.manifest {
        Some(name) => normalize_config_path(name, project),
        None => default_manifest_path(project),
    };
    RoutineManifest::from_file(&path)
        .with_context(|| format!("Failed to load routines manifest: {}", path.display()))
}

/// Load and build a plan from a configuration file name.
pub fn load_plan(common: &CommonArgs, config: &str) -> Result<Plan> {
    let project = project_dir(common);
    let manifest = load_manifest(common, &project)?;

    let config_path = normalize_config_path(config, &project);
    let plan_config = PlanConfig::from_file(&config_path)?;

    let plan = Plan::build(&plan_config, &manifest)
        .with_context(|| format!("Invalid plan: {}", config_path.display()))?;
    Ok(plan)
}
