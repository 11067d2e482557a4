//! Typed errors for the pipeline engine
//!
//! Two tiers: configuration errors (`PlanError`, `ManifestError`) are detected
//! while loading and abort the load with no partial state; runtime errors
//! (`CacheError`, `RegistryError`, `StepError`) are caught per step and
//! reported as a structured failure so completed steps stay available.

use std::path::PathBuf;
use thiserror::Error;

/// Errors detected while building an execution plan.
///
/// All of these are configuration-author mistakes; none is retried.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("duplicate step name: {0}")]
    DuplicateStepName(String),

    #[error("step {step} depends on {parent}, which is not an earlier step")]
    OutOfOrderDependency { step: String, parent: String },

    #[error("step {step} selects unknown routine: {routine}")]
    UnknownRoutine { step: String, routine: String },

    #[error("no routine selected for step {0} (missing ${0} entry)")]
    MissingRoutine(String),

    #[error("malformed plan configuration: {0}")]
    Malformed(String),
}

/// Errors while loading or interpreting a routines manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read routines manifest {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse routines manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("malformed routines manifest: {0}")]
    Malformed(String),
}

/// Errors from routine resolution.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown routine: {0}")]
    UnknownRoutine(String),

    #[error("routine loader failed for {name}: {cause}")]
    Loader { name: String, cause: anyhow::Error },
}

/// Filesystem errors from the cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to prepare staging directory {path}: {source}")]
    Staging {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to commit staged output to {path}: {source}")]
    Commit {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read statistics sidecar {path}: {source}")]
    StatsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse statistics sidecar {path}: {source}")]
    StatsParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write statistics sidecar {path}: {source}")]
    StatsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A single step's runtime failure.
///
/// The executor returns this instead of unwinding; the runner inspects it and
/// stops the run at the failing step.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("routine {name} failed: {cause}")]
    Routine { name: String, cause: anyhow::Error },
}
