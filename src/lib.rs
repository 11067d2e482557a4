// Library interface for Takt
// This allows integration tests and host applications to drive the engine

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod hashing;
pub mod logging;
pub mod plan;
pub mod registry;
pub mod runner;

// Re-export commonly used types
pub use cache::{CacheReport, CacheStore, Staging, StatsFile};
pub use config::{normalize_config_path, PlanConfig, SequenceEntry};
pub use error::{CacheError, ManifestError, PlanError, RegistryError, StepError};
pub use executor::{StepExecutor, StepSuccess};
pub use plan::{Plan, StepDescriptor};
pub use registry::{
    default_manifest_path, Invocation, Routine, RoutineLoader, RoutineManifest, RoutineOutput,
    RoutineRegistry,
};
pub use runner::{Pipeline, RunReport, StepFailure};
