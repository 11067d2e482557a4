//! Pipeline runner
//!
//! The `Pipeline` facade owns the routine registry and the cache store for a
//! project directory. It executes a validated plan strictly in ascending
//! position order, stops on the first failing step, and keeps the results and
//! statistics of every step completed before the failure.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::cache::CacheStore;
use crate::config::{normalize_config_path, PlanConfig};
use crate::error::{CacheError, PlanError, StepError};
use crate::executor::StepExecutor;
use crate::plan::Plan;
use crate::registry::RoutineRegistry;

/// The step a run stopped at, with its underlying error.
#[derive(Debug)]
pub struct StepFailure {
    pub position: usize,
    pub name: String,
    pub error: StepError,
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct RunReport {
    /// Steps completed before the run ended.
    pub executed: usize,
    pub failure: Option<StepFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Drives plans to completion for one project directory.
pub struct Pipeline {
    project_dir: PathBuf,
    registry: RoutineRegistry,
    cache: CacheStore,
    results: Vec<Option<Value>>,
    statistics: Vec<Option<Map<String, Value>>>,
    step_names: Vec<String>,
}

impl Pipeline {
    pub fn new(project_dir: &Path, registry: RoutineRegistry) -> Result<Self, CacheError> {
        let cache = CacheStore::new(project_dir)?;
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            registry,
            cache,
            results: Vec::new(),
            statistics: Vec::new(),
            step_names: Vec::new(),
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn registry(&self) -> &RoutineRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Build a plan from an already-loaded configuration.
    pub fn load_plan(&self, config: &PlanConfig) -> Result<Plan, PlanError> {
        Plan::build(config, self.registry.manifest())
    }

    /// Build a plan from a configuration file name, resolved against the
    /// project directory with `.json` appended when no extension is given.
    pub fn load_plan_file(&self, name: &str) -> anyhow::Result<Plan> {
        let path = normalize_config_path(name, &self.project_dir);
        let config = PlanConfig::from_file(&path)?;
        Ok(self.load_plan(&config)?)
    }

    /// Execute a plan in position order, stopping at the first failure.
    pub fn run(&mut self, plan: &Plan) -> RunReport {
        self.results = vec![None; plan.len()];
        self.statistics = vec![None; plan.len()];
        self.step_names = plan.steps().iter().map(|s| s.name.clone()).collect();

        let executor = StepExecutor::new(&self.registry, &self.cache);

        for step in plan.steps() {
            info!(
                step = %step.name,
                routine = %step.routine,
                position = step.position,
                "executing step"
            );

            // Parents always occupy earlier positions, so their results are
            // already populated
            let parent_results: Vec<Value> = step
                .parent_positions
                .iter()
                .map(|&p| self.results[p].clone().unwrap_or(Value::Null))
                .collect();

            match executor.run(step, &parent_results) {
                Ok(outcome) => {
                    self.results[step.position] = Some(outcome.result);
                    self.statistics[step.position] = Some(outcome.statistics);
                }
                Err(err) => {
                    error!(
                        step = %step.name,
                        position = step.position,
                        status = "error",
                        "step failed: {err}"
                    );
                    return RunReport {
                        executed: step.position,
                        failure: Some(StepFailure {
                            position: step.position,
                            name: step.name.clone(),
                            error: err,
                        }),
                    };
                }
            }
        }

        RunReport {
            executed: plan.len(),
            failure: None,
        }
    }

    /// Per-step statistics from the last run, keyed by step name. With
    /// `numbered`, keys are prefixed with the zero-padded position for stable
    /// lexicographic ordering.
    pub fn stats(&self, numbered: bool) -> Map<String, Value> {
        let mut out = Map::new();
        for (position, name) in self.step_names.iter().enumerate() {
            if let Some(stats) = &self.statistics[position] {
                let key = if numbered {
                    format!("{position:02}_{name}")
                } else {
                    name.clone()
                };
                out.insert(key, Value::Object(stats.clone()));
            }
        }
        out
    }

    /// Defensive copy of the last run's results, indexed by position.
    pub fn results(&self) -> Vec<Option<Value>> {
        self.results.clone()
    }

    /// Result of one step of the last run, by name.
    pub fn result_of(&self, plan: &Plan, name: &str) -> Option<Value> {
        let position = plan.position_of(name)?;
        self.results.get(position).cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Invocation, Routine, RoutineManifest, RoutineOutput};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Double;

    impl Routine for Double {
        fn invoke(&self, call: Invocation<'_>) -> anyhow::Result<RoutineOutput> {
            let x = call.config.get("x").and_then(Value::as_i64).unwrap_or(0);
            Ok(RoutineOutput::Plain(json!(x * 2)))
        }
    }

    struct AddOne;

    impl Routine for AddOne {
        fn invoke(&self, call: Invocation<'_>) -> anyhow::Result<RoutineOutput> {
            let parent = call.args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(RoutineOutput::Plain(json!(parent + 1)))
        }
    }

    struct Failing;

    impl Routine for Failing {
        fn invoke(&self, _call: Invocation<'_>) -> anyhow::Result<RoutineOutput> {
            anyhow::bail!("broken routine")
        }
    }

    fn pipeline(temp: &TempDir) -> Pipeline {
        let manifest = RoutineManifest::from_value(&json!([
            ["double", "x"],
            "addOne",
            "failing",
            {"_noncached": ["double", "addOne", "failing"]}
        ]))
        .unwrap();
        let registry = RoutineRegistry::new(manifest);
        registry.register("double", Arc::new(Double));
        registry.register("addOne", Arc::new(AddOne));
        registry.register("failing", Arc::new(Failing));
        Pipeline::new(temp.path(), registry).unwrap()
    }

    #[test]
    fn test_two_step_run() {
        let temp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&temp);

        let config = PlanConfig::from_value(json!({
            "_sequence": ["A", {"B": ["A"]}],
            "$A": "double",
            "$B": "addOne",
            "x": 5
        }))
        .unwrap();
        let plan = pipeline.load_plan(&config).unwrap();

        let report = pipeline.run(&plan);
        assert!(report.is_success());
        assert_eq!(report.executed, 2);
        assert_eq!(pipeline.result_of(&plan, "A"), Some(json!(10)));
        assert_eq!(pipeline.result_of(&plan, "B"), Some(json!(11)));
    }

    #[test]
    fn test_failure_preserves_earlier_results() {
        let temp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&temp);

        let config = PlanConfig::from_value(json!({
            "_sequence": ["A", {"B": ["A"]}, {"C": ["B"]}],
            "$A": "double",
            "$B": "failing",
            "$C": "addOne",
            "x": 5
        }))
        .unwrap();
        let plan = pipeline.load_plan(&config).unwrap();

        let report = pipeline.run(&plan);
        let failure = report.failure.expect("run should fail at B");
        assert_eq!(failure.position, 1);
        assert_eq!(failure.name, "B");
        assert_eq!(report.executed, 1);

        let results = pipeline.results();
        assert_eq!(results[0], Some(json!(10)));
        assert_eq!(results[1], None);
        assert_eq!(results[2], None);
    }

    #[test]
    fn test_run_resets_previous_state() {
        let temp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&temp);

        let ok = pipeline
            .load_plan(
                &PlanConfig::from_value(json!({
                    "_sequence": ["A"],
                    "$A": "double",
                    "x": 5
                }))
                .unwrap(),
            )
            .unwrap();
        let failing = pipeline
            .load_plan(
                &PlanConfig::from_value(json!({
                    "_sequence": ["A"],
                    "$A": "failing"
                }))
                .unwrap(),
            )
            .unwrap();

        assert!(pipeline.run(&ok).is_success());
        assert!(!pipeline.run(&failing).is_success());
        assert_eq!(pipeline.results(), vec![None]);
    }

    #[test]
    fn test_stats_keyed_by_step_name() {
        let temp = TempDir::new().unwrap();
        let mut pipeline = pipeline(&temp);

        let config = PlanConfig::from_value(json!({
            "_sequence": ["A", {"B": ["A"]}],
            "$A": "double",
            "$B": "addOne",
            "x": 5
        }))
        .unwrap();
        let plan = pipeline.load_plan(&config).unwrap();
        pipeline.run(&plan);

        let stats = pipeline.stats(false);
        assert!(stats.contains_key("A"));
        assert!(stats.contains_key("B"));

        let numbered = pipeline.stats(true);
        assert!(numbered.contains_key("00_A"));
        assert!(numbered.contains_key("01_B"));
    }
}
