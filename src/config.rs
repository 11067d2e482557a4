//! Plan configuration access
//!
//! A plan configuration is a flat JSON mapping: a handful of reserved entries
//! (`_sequence`, `_invariant`, `_timed`/`_nontimed`, `$<step>` routine
//! selections) plus arbitrary keys consumed as routine parameters by name.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::PlanError;

/// Reserved configuration keys and naming conventions.
pub mod keys {
    /// Prepended to a step name to form its routine-selection entry.
    pub const STEP_PREFIX: &str = "$";
    /// The step sequence definition.
    pub const SEQUENCE: &str = "_sequence";
    /// Globally declared invariant parameter names.
    pub const INVARIANT: &str = "_invariant";
    /// Step names whose execution is timed (takes precedence).
    pub const TIMED: &str = "_timed";
    /// Step names whose execution is not timed.
    pub const NONTIMED: &str = "_nontimed";
    /// Internal statistics entry holding elapsed seconds.
    pub const TIME: &str = "time";
}

/// Step name used when the configuration omits `_sequence`.
pub const DEFAULT_STEP_NAME: &str = "Main";

/// One entry of the declared step sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceEntry {
    pub name: String,
    /// Parent step names, in declared order.
    pub parents: Vec<String>,
}

impl SequenceEntry {
    /// Render the entry back into its configuration form: a bare name when
    /// there are no parents, otherwise a single-entry mapping.
    pub fn to_value(&self) -> Value {
        if self.parents.is_empty() {
            Value::String(self.name.clone())
        } else {
            let mut map = Map::new();
            map.insert(
                self.name.clone(),
                Value::Array(
                    self.parents
                        .iter()
                        .map(|p| Value::String(p.clone()))
                        .collect(),
                ),
            );
            Value::Object(map)
        }
    }
}

/// A loaded plan configuration.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    values: Map<String, Value>,
}

impl PlanConfig {
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn from_value(value: Value) -> Result<Self, PlanError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(PlanError::Malformed(format!(
                "plan configuration must be a mapping, got: {other}"
            ))),
        }
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan configuration: {}", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse plan configuration: {}", path.display()))?;
        Self::from_value(value)
            .with_context(|| format!("Invalid plan configuration: {}", path.display()))
    }

    /// Raw parameter lookup.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The declared step sequence. A missing `_sequence` defaults to a single
    /// step named "Main" with no parents.
    pub fn sequence(&self) -> Result<Vec<SequenceEntry>, PlanError> {
        let Some(raw) = self.values.get(keys::SEQUENCE) else {
            return Ok(vec![SequenceEntry {
                name: DEFAULT_STEP_NAME.to_string(),
                parents: Vec::new(),
            }]);
        };

        let Value::Array(items) = raw else {
            return Err(PlanError::Malformed(format!(
                "{} must be a sequence",
                keys::SEQUENCE
            )));
        };

        items.iter().map(parse_sequence_entry).collect()
    }

    /// The routine selected for a step via its `$<step>` entry.
    pub fn routine_for(&self, step: &str) -> Result<&str, PlanError> {
        let key = format!("{}{step}", keys::STEP_PREFIX);
        match self.values.get(&key) {
            Some(Value::String(routine)) => Ok(routine),
            Some(other) => Err(PlanError::Malformed(format!(
                "{key} must name a routine, got: {other}"
            ))),
            None => Err(PlanError::MissingRoutine(step.to_string())),
        }
    }

    /// Globally declared invariant parameter names.
    pub fn invariant_names(&self) -> Result<BTreeSet<String>, PlanError> {
        match self.string_list(keys::INVARIANT)? {
            Some(names) => Ok(names.into_iter().collect()),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Whether a step's execution is timed. An explicit `_timed` list takes
    /// precedence over `_nontimed`; with neither, every step is timed.
    pub fn is_timed(&self, step: &str) -> Result<bool, PlanError> {
        if let Some(timed) = self.string_list(keys::TIMED)? {
            return Ok(timed.iter().any(|name| name == step));
        }
        if let Some(nontimed) = self.string_list(keys::NONTIMED)? {
            return Ok(!nontimed.iter().any(|name| name == step));
        }
        Ok(true)
    }

    /// Read a reserved entry as a list of strings; a bare string counts as a
    /// one-element list.
    fn string_list(&self, key: &str) -> Result<Option<Vec<String>>, PlanError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::String(single)) => Ok(Some(vec![single.clone()])),
            Some(Value::Array(items)) => {
                let names = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            PlanError::Malformed(format!("{key} must list step/parameter names"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(names))
            }
            Some(other) => Err(PlanError::Malformed(format!(
                "{key} must be a name or a list of names, got: {other}"
            ))),
        }
    }
}

fn parse_sequence_entry(item: &Value) -> Result<SequenceEntry, PlanError> {
    match item {
        Value::String(name) => Ok(SequenceEntry {
            name: name.clone(),
            parents: Vec::new(),
        }),
        Value::Object(map) => {
            let mut entries = map.iter();
            match (entries.next(), entries.next()) {
                (Some((name, parents)), None) => Ok(SequenceEntry {
                    name: name.clone(),
                    parents: parse_parents(name, parents)?,
                }),
                _ => Err(PlanError::Malformed(format!(
                    "sequence entry must be a name or a single-entry mapping, got: {item}"
                ))),
            }
        }
        other => Err(PlanError::Malformed(format!(
            "sequence entry must be a name or a single-entry mapping, got: {other}"
        ))),
    }
}

fn parse_parents(step: &str, value: &Value) -> Result<Vec<String>, PlanError> {
    match value {
        // A bare name counts as a one-element parent list
        Value::String(parent) => Ok(vec![parent.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    PlanError::Malformed(format!("parents of step {step} must be step names"))
                })
            })
            .collect(),
        other => Err(PlanError::Malformed(format!(
            "parents of step {step} must be a list of step names, got: {other}"
        ))),
    }
}

/// Resolve a configuration file name against a folder, appending `.json` when
/// the name carries no extension. Absolute names ignore the folder.
pub fn normalize_config_path(name: &str, folder: &Path) -> PathBuf {
    let path = folder.join(name);
    if path.extension().is_some() {
        path
    } else {
        path.with_extension("json")
    }
}
