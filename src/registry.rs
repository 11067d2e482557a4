//! Routine registry and manifest
//!
//! The manifest half records, per routine, the configuration parameters it is
//! sensitive to and whether its output is cached; it is loadable on its own so
//! plans can be built without any implementations present. The registry half
//! maps routine names to callable units registered by the host application,
//! with an optional loader hook for on-demand loading. The engine itself never
//! imports or discovers routines.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{ManifestError, RegistryError};

/// Default manifest file name, resolved against the project directory.
pub const MANIFEST_FILE: &str = "_init_routines.json";
/// Manifest key listing the cached routines (takes precedence).
pub const CACHED_KEY: &str = "_cached";
/// Manifest key listing the non-cached routines.
pub const NONCACHED_KEY: &str = "_noncached";

/// Arguments for one routine invocation.
pub struct Invocation<'a> {
    /// Results of the step's direct parents, in declared order.
    pub args: &'a [Value],
    /// Staging directory to write output into; `Some` iff the step is cached.
    pub staging: Option<&'a Path>,
    /// The step's materialized configuration.
    pub config: &'a Map<String, Value>,
}

/// What a routine hands back to the executor.
///
/// `WithStats` is only meaningful for non-cached routines; cached routines
/// write their output (and any detailed statistics) into the staging
/// directory instead.
#[derive(Debug, Clone)]
pub enum RoutineOutput {
    Plain(Value),
    WithStats {
        result: Value,
        statistics: Map<String, Value>,
    },
}

/// A pluggable computation unit consumed by a step.
pub trait Routine: Send + Sync {
    fn invoke(&self, call: Invocation<'_>) -> anyhow::Result<RoutineOutput>;
}

/// Host-supplied hook for loading routine implementations on demand.
///
/// Returning `Ok(None)` means the loader does not know the name either.
pub trait RoutineLoader: Send + Sync {
    fn load(&self, name: &str) -> anyhow::Result<Option<Arc<dyn Routine>>>;
}

#[derive(Debug, Clone)]
enum CachePolicy {
    /// No explicit list: every routine is cached.
    AllCached,
    /// Explicit `_cached` list: only the listed routines are cached.
    CachedOnly(BTreeSet<String>),
    /// Explicit `_noncached` list: everything but the listed routines.
    AllExcept(BTreeSet<String>),
}

/// Per-routine parameter sets and caching policy.
#[derive(Debug, Clone)]
pub struct RoutineManifest {
    params: BTreeMap<String, BTreeSet<String>>,
    policy: CachePolicy,
}

impl RoutineManifest {
    /// Parse a manifest from its JSON form: a sequence whose entries are
    /// `["name", "param", ...]` lists, bare `"name"` strings, or mappings.
    /// A mapping entry may carry the reserved `_cached` / `_noncached` lists
    /// or plain `"name": ["param", ...]` pairs.
    pub fn from_value(value: &Value) -> Result<Self, ManifestError> {
        let Value::Array(entries) = value else {
            return Err(ManifestError::Malformed(
                "manifest must be a sequence of entries".to_string(),
            ));
        };

        let mut params: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut cached_list: Option<BTreeSet<String>> = None;
        let mut noncached_list: Option<BTreeSet<String>> = None;

        for entry in entries {
            match entry {
                Value::String(name) => {
                    params.insert(name.clone(), BTreeSet::new());
                }
                Value::Array(items) => {
                    let mut names = items.iter().map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        other => Err(ManifestError::Malformed(format!(
                            "expected string in manifest list entry, got: {other}"
                        ))),
                    });
                    let Some(name) = names.next().transpose()? else {
                        return Err(ManifestError::Malformed(
                            "empty manifest list entry".to_string(),
                        ));
                    };
                    let sensitive = names.collect::<Result<BTreeSet<_>, _>>()?;
                    params.insert(name, sensitive);
                }
                Value::Object(map) => {
                    for (key, val) in map {
                        let names = string_set(val).ok_or_else(|| {
                            ManifestError::Malformed(format!(
                                "manifest entry {key} must map to a list of strings"
                            ))
                        })?;
                        match key.as_str() {
                            CACHED_KEY => cached_list = Some(names),
                            NONCACHED_KEY => noncached_list = Some(names),
                            _ => {
                                params.insert(key.clone(), names);
                            }
                        }
                    }
                }
                other => {
                    return Err(ManifestError::Malformed(format!(
                        "unexpected manifest entry: {other}"
                    )));
                }
            }
        }

        // Only one list governs; an explicit _cached list wins
        let policy = match (cached_list, noncached_list) {
            (Some(cached), _) => CachePolicy::CachedOnly(cached),
            (None, Some(noncached)) => CachePolicy::AllExcept(noncached),
            (None, None) => CachePolicy::AllCached,
        };

        Ok(Self { params, policy })
    }

    /// Load a manifest from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value =
            serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_value(&value)
    }

    /// Whether the manifest knows this routine at all.
    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// The configuration parameters a routine is sensitive to.
    pub fn params_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.params.get(name)
    }

    /// Whether a routine's output is cached. Defaults to true.
    pub fn is_cached(&self, name: &str) -> bool {
        match &self.policy {
            CachePolicy::AllCached => true,
            CachePolicy::CachedOnly(cached) => cached.contains(name),
            CachePolicy::AllExcept(noncached) => !noncached.contains(name),
        }
    }

    /// All routine names known to the manifest.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }
}

fn string_set(value: &Value) -> Option<BTreeSet<String>> {
    let Value::Array(items) = value else {
        return None;
    };
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Maps routine names to implementations registered by the host.
pub struct RoutineRegistry {
    manifest: RoutineManifest,
    routines: RwLock<HashMap<String, Arc<dyn Routine>>>,
    loader: Option<Box<dyn RoutineLoader>>,
}

impl RoutineRegistry {
    pub fn new(manifest: RoutineManifest) -> Self {
        Self {
            manifest,
            routines: RwLock::new(HashMap::new()),
            loader: None,
        }
    }

    /// Attach a loader hook consulted when a name has no registered
    /// implementation yet; loaded routines are memoized.
    pub fn with_loader(manifest: RoutineManifest, loader: Box<dyn RoutineLoader>) -> Self {
        Self {
            manifest,
            routines: RwLock::new(HashMap::new()),
            loader: Some(loader),
        }
    }

    pub fn manifest(&self) -> &RoutineManifest {
        &self.manifest
    }

    /// Register an implementation under a name (possibly "module.name"
    /// qualified; the registry treats the name as opaque).
    pub fn register(&self, name: impl Into<String>, routine: Arc<dyn Routine>) {
        self.routines
            .write()
            .expect("registry lock poisoned")
            .insert(name.into(), routine);
    }

    /// Resolve a routine name to its implementation.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Routine>, RegistryError> {
        if let Some(routine) = self
            .routines
            .read()
            .expect("registry lock poisoned")
            .get(name)
        {
            return Ok(routine.clone());
        }

        let Some(loader) = &self.loader else {
            return Err(RegistryError::UnknownRoutine(name.to_string()));
        };

        match loader.load(name) {
            Ok(Some(routine)) => {
                self.routines
                    .write()
                    .expect("registry lock poisoned")
                    .insert(name.to_string(), routine.clone());
                Ok(routine)
            }
            Ok(None) => Err(RegistryError::UnknownRoutine(name.to_string())),
            Err(cause) => Err(RegistryError::Loader {
                name: name.to_string(),
                cause,
            }),
        }
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.manifest.is_cached(name)
    }
}

/// Default manifest path for a project directory.
pub fn default_manifest_path(project_dir: &Path) -> PathBuf {
    project_dir.join(MANIFEST_FILE)
}
