//! Plan building
//!
//! Turns a declared step sequence plus a flat configuration mapping into an
//! immutable, validated execution plan. Positions follow the declared order,
//! every parent must come strictly before its child, and each step carries
//! its transitive parameter closure, invariant subset, hash-relevant
//! parameter set, materialized configuration, and (for cached routines) the
//! content hash addressing its cache directory.
//!
//! Building is atomic: any validation failure discards the whole attempt.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

use crate::config::{keys, PlanConfig, SequenceEntry};
use crate::error::PlanError;
use crate::hashing;
use crate::registry::RoutineManifest;

/// One node of the execution plan.
#[derive(Debug, Clone, Serialize)]
pub struct StepDescriptor {
    pub name: String,
    /// Index in the plan's total order.
    pub position: usize,
    pub routine: String,
    /// Parent step names, in declared order.
    pub parents: Vec<String>,
    /// Parent positions; each is strictly less than `position`.
    pub parent_positions: Vec<usize>,
    /// Materialized configuration handed to the routine.
    pub config: Map<String, Value>,
    /// Transitive parameter closure: own identity marker, the routine's
    /// sensitive parameters, and every ancestor's closure.
    pub parameters: BTreeSet<String>,
    /// Parameters excluded from hashing though still passed to the routine.
    pub invariant: BTreeSet<String>,
    /// The parameter set actually folded into the content hash.
    pub hashed: BTreeSet<String>,
    /// Content hash addressing the cache directory; present iff cached.
    pub hash: Option<String>,
    pub cached: bool,
    pub timed: bool,
}

impl StepDescriptor {
    /// The step's identity marker (`$<name>`), always part of its closure.
    pub fn identity_marker(&self) -> String {
        format!("{}{}", keys::STEP_PREFIX, self.name)
    }
}

/// An immutable, validated execution plan.
///
/// A new load produces a new `Plan` value; nothing is mutated in place.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    steps: Vec<StepDescriptor>,
}

impl Plan {
    /// Build a plan from a configuration and a routines manifest.
    pub fn build(config: &PlanConfig, manifest: &RoutineManifest) -> Result<Plan, PlanError> {
        let sequence = config.sequence()?;

        let mut positions: HashMap<String, usize> = HashMap::with_capacity(sequence.len());
        for (position, entry) in sequence.iter().enumerate() {
            if positions.insert(entry.name.clone(), position).is_some() {
                return Err(PlanError::DuplicateStepName(entry.name.clone()));
            }
        }

        // Resolve parents to positions; parents must come strictly earlier
        let mut parent_positions: Vec<Vec<usize>> = Vec::with_capacity(sequence.len());
        for (position, entry) in sequence.iter().enumerate() {
            let mut resolved = Vec::with_capacity(entry.parents.len());
            for parent in &entry.parents {
                match positions.get(parent) {
                    Some(&p) if p < position => resolved.push(p),
                    _ => {
                        return Err(PlanError::OutOfOrderDependency {
                            step: entry.name.clone(),
                            parent: parent.clone(),
                        })
                    }
                }
            }
            parent_positions.push(resolved);
        }

        let invariant_declared = config.invariant_names()?;
        let always_hashed = [keys::SEQUENCE, keys::TIMED];

        let mut closures: Vec<BTreeSet<String>> = Vec::with_capacity(sequence.len());
        let mut steps: Vec<StepDescriptor> = Vec::with_capacity(sequence.len());

        for (position, entry) in sequence.iter().enumerate() {
            let routine = config.routine_for(&entry.name)?.to_string();
            let Some(routine_params) = manifest.params_of(&routine) else {
                return Err(PlanError::UnknownRoutine {
                    step: entry.name.clone(),
                    routine,
                });
            };

            // Parameter closure: parents are processed first, so their
            // closures are already transitively complete
            let mut closure: BTreeSet<String> = BTreeSet::new();
            closure.insert(format!("{}{}", keys::STEP_PREFIX, entry.name));
            closure.extend(routine_params.iter().cloned());
            for &parent in &parent_positions[position] {
                closure.extend(closures[parent].iter().cloned());
            }

            let mut relevant: BTreeSet<String> = closure.clone();
            relevant.extend(always_hashed.iter().map(|s| s.to_string()));

            let invariant: BTreeSet<String> = invariant_declared
                .intersection(&relevant)
                .cloned()
                .collect();

            let mut hashed = relevant;
            if !invariant.is_empty() {
                hashed.insert(keys::INVARIANT.to_string());
            }
            for name in &invariant {
                hashed.remove(name);
            }

            let timed = config.is_timed(&entry.name)?;
            let subsequence = dependency_subsequence(&sequence, &parent_positions, position);

            let mut materialized = Map::new();
            for name in &closure {
                // Missing keys materialize as null; routines may tolerate
                // absent optional parameters
                let value = config.get(name).cloned().unwrap_or(Value::Null);
                materialized.insert(name.clone(), value);
            }
            materialized.insert(keys::SEQUENCE.to_string(), subsequence);
            if !invariant.is_empty() {
                materialized.insert(
                    keys::INVARIANT.to_string(),
                    Value::Array(
                        invariant
                            .iter()
                            .map(|name| Value::String(name.clone()))
                            .collect(),
                    ),
                );
            }
            materialized.insert(keys::TIMED.to_string(), Value::Bool(timed));

            let cached = manifest.is_cached(&routine);
            let hash = if cached {
                let mut hash_input = Map::new();
                for name in &hashed {
                    if let Some(value) = materialized.get(name) {
                        hash_input.insert(name.clone(), value.clone());
                    }
                }
                Some(hashing::digest(&Value::Object(hash_input)))
            } else {
                None
            };

            steps.push(StepDescriptor {
                name: entry.name.clone(),
                position,
                routine,
                parents: entry.parents.clone(),
                parent_positions: parent_positions[position].clone(),
                config: materialized,
                parameters: closure.clone(),
                invariant,
                hashed,
                hash,
                cached,
                timed,
            });
            closures.push(closure);
        }

        Ok(Plan { steps })
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.name == name)
    }

    pub fn step(&self, name: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|step| step.name == name)
    }
}

/// The order-preserving dependency closure subsequence for one step: the step
/// and all of its transitive ancestors, each represented with its own parent
/// list, in original sequence order. Worklist traversal over positions, no
/// recursion.
fn dependency_subsequence(
    sequence: &[SequenceEntry],
    parent_positions: &[Vec<usize>],
    position: usize,
) -> Value {
    let mut included = vec![false; position + 1];
    let mut stack = vec![position];

    while let Some(current) = stack.pop() {
        if included[current] {
            continue;
        }
        included[current] = true;
        stack.extend(parent_positions[current].iter().copied());
    }

    let mut items = Vec::new();
    for (entry, keep) in sequence.iter().take(position + 1).zip(&included) {
        if *keep {
            items.push(entry.to_value());
        }
    }
    Value::Array(items)
}
