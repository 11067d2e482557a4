//! Step execution
//!
//! Runs a single step: replays the committed cache entry on a hash hit,
//! otherwise invokes the routine against the staging directory (for cached
//! steps) and commits its output atomically. Timing is measured around the
//! invocation and merged into the step's statistics under `time`.

use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::config::keys;
use crate::error::StepError;
use crate::plan::StepDescriptor;
use crate::registry::{Invocation, RoutineOutput, RoutineRegistry};

/// Successful outcome of one step.
#[derive(Debug, Clone)]
pub struct StepSuccess {
    /// For cached steps, the committed cache directory path; otherwise the
    /// routine's returned value.
    pub result: Value,
    pub statistics: Map<String, Value>,
    pub cache_hit: bool,
}

/// Executes one step at a time against a registry and a cache store.
pub struct StepExecutor<'a> {
    registry: &'a RoutineRegistry,
    cache: &'a CacheStore,
}

impl<'a> StepExecutor<'a> {
    pub fn new(registry: &'a RoutineRegistry, cache: &'a CacheStore) -> Self {
        Self { registry, cache }
    }

    /// Run a step given its direct parents' results, in declared order.
    pub fn run(
        &self,
        step: &StepDescriptor,
        parent_results: &[Value],
    ) -> Result<StepSuccess, StepError> {
        // The sole cache-hit path: a committed directory at the step's hash
        if let Some(hash) = &step.hash {
            if self.cache.has(hash) {
                let path = self.cache.entry_path(hash);
                let statistics = self.cache.read_stats(hash)?;
                info!(
                    step = %step.name,
                    routine = %step.routine,
                    hash = %hash,
                    status = "hit",
                    "cache hit"
                );
                return Ok(StepSuccess {
                    result: Value::String(path.display().to_string()),
                    statistics,
                    cache_hit: true,
                });
            }
        }

        let routine = self.registry.resolve(&step.routine)?;
        let staging = match &step.hash {
            Some(_) => Some(self.cache.stage()?),
            None => None,
        };

        let call = Invocation {
            args: parent_results,
            staging: staging.as_ref().map(|s| s.path()),
            config: &step.config,
        };

        let started = step.timed.then(Instant::now);
        let output = routine.invoke(call).map_err(|cause| StepError::Routine {
            name: step.name.clone(),
            cause,
        })?;
        let elapsed = started.map(|t| t.elapsed().as_secs_f64());

        match (&step.hash, staging) {
            (Some(hash), Some(staging)) => {
                // Cached routines write their output (and any detailed stats)
                // into staging; the returned value is not interpreted
                let path = self.cache.commit(staging, hash)?;

                let mut statistics = Map::new();
                if let Some(seconds) = elapsed {
                    statistics.insert(keys::TIME.to_string(), json!(seconds));
                }
                self.cache
                    .write_stats(hash, &step.name, &step.routine, &statistics)?;

                debug!(
                    step = %step.name,
                    hash = %hash,
                    status = "miss",
                    "computed and committed"
                );
                Ok(StepSuccess {
                    result: Value::String(path.display().to_string()),
                    statistics,
                    cache_hit: false,
                })
            }
            _ => {
                let (result, mut statistics) = match output {
                    RoutineOutput::Plain(value) => (value, Map::new()),
                    RoutineOutput::WithStats { result, statistics } => (result, statistics),
                };
                // The internal timing entry wins on key collision
                if let Some(seconds) = elapsed {
                    statistics.insert(keys::TIME.to_string(), json!(seconds));
                }
                Ok(StepSuccess {
                    result,
                    statistics,
                    cache_hit: false,
                })
            }
        }
    }
}
