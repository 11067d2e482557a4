//! Cache store
//!
//! Maps a step's content hash to a committed output directory directly under
//! the project root, with a versioned statistics sidecar inside each entry.
//! Commits are atomic: routines write into a single reusable staging
//! directory which is renamed onto the hash-addressed path. Reusing one
//! staging directory keeps disk usage bounded but requires sequential step
//! execution.
//!
//! Entries at the same hash are last-writer-wins; there is no reference
//! counting, garbage collection, or automatic eviction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::CacheError;

/// Reserved staging directory name under the project root.
pub const STAGING_DIR: &str = "_staging";
/// Reserved statistics sidecar name inside each committed entry.
pub const STATS_FILE: &str = "_stats.json";

/// Versioned statistics sidecar, self-describing on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsFile {
    pub version: u32,
    pub step: String,
    pub routine: String,
    pub created_at: DateTime<Utc>,
    pub statistics: Map<String, Value>,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone)]
pub struct CacheReport {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub total_files: usize,
}

/// Handle to the prepared staging directory. Consumed by `commit`; a failed
/// step simply drops it, leaving the staged output in place for inspection.
#[derive(Debug)]
pub struct Staging {
    path: PathBuf,
}

impl Staging {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Hash-addressed store of committed step outputs.
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open (creating if needed) the store rooted at a project directory.
    pub fn new(root: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(root).map_err(|source| CacheError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The committed directory path for a hash.
    pub fn entry_path(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    /// Whether a committed entry exists for this hash.
    pub fn has(&self, hash: &str) -> bool {
        self.entry_path(hash).is_dir()
    }

    /// Clear and recreate the shared staging directory.
    pub fn stage(&self) -> Result<Staging, CacheError> {
        let path = self.root.join(STAGING_DIR);

        if path.exists() {
            fs::remove_dir_all(&path).map_err(|source| CacheError::Staging {
                path: path.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&path).map_err(|source| CacheError::Staging {
            path: path.clone(),
            source,
        })?;

        Ok(Staging { path })
    }

    /// Atomically commit the staged output to the hash-addressed path,
    /// replacing any pre-existing entry at the same hash.
    pub fn commit(&self, staging: Staging, hash: &str) -> Result<PathBuf, CacheError> {
        let target = self.entry_path(hash);

        if target.exists() {
            fs::remove_dir_all(&target).map_err(|source| CacheError::Commit {
                path: target.clone(),
                source,
            })?;
        }
        fs::rename(&staging.path, &target).map_err(|source| CacheError::Commit {
            path: target.clone(),
            source,
        })?;

        debug!(hash = %hash, path = %target.display(), "committed cache entry");
        Ok(target)
    }

    /// Read the statistics sidecar of a committed entry. A missing sidecar
    /// reads as empty statistics.
    pub fn read_stats(&self, hash: &str) -> Result<Map<String, Value>, CacheError> {
        Ok(self
            .read_sidecar(hash)?
            .map(|sidecar| sidecar.statistics)
            .unwrap_or_default())
    }

    /// Read the full sidecar document, if present.
    pub fn read_sidecar(&self, hash: &str) -> Result<Option<StatsFile>, CacheError> {
        let path = self.entry_path(hash).join(STATS_FILE);

        if !path.exists() {
            warn!(hash = %hash, "committed entry has no statistics sidecar");
            return Ok(None);
        }

        let text = fs::read_to_string(&path).map_err(|source| CacheError::StatsRead {
            path: path.clone(),
            source,
        })?;
        let sidecar: StatsFile =
            serde_json::from_str(&text).map_err(|source| CacheError::StatsParse {
                path: path.clone(),
                source,
            })?;
        Ok(Some(sidecar))
    }

    /// Write the statistics sidecar into a committed entry.
    pub fn write_stats(
        &self,
        hash: &str,
        step: &str,
        routine: &str,
        statistics: &Map<String, Value>,
    ) -> Result<(), CacheError> {
        let path = self.entry_path(hash).join(STATS_FILE);
        let sidecar = StatsFile {
            version: 1,
            step: step.to_string(),
            routine: routine.to_string(),
            created_at: Utc::now(),
            statistics: statistics.clone(),
        };

        let json = serde_json::to_string_pretty(&sidecar).map_err(|source| {
            CacheError::StatsParse {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&path, json).map_err(|source| CacheError::StatsWrite { path, source })
    }

    /// Sorted hashes of all committed entries. Reserved `_`-prefixed
    /// directories (staging) are not entries.
    pub fn list(&self) -> Result<Vec<String>, CacheError> {
        let mut entries = Vec::new();

        let dir = fs::read_dir(&self.root).map_err(|source| CacheError::Io {
            path: self.root.clone(),
            source,
        })?;
        for entry in dir {
            let entry = entry.map_err(|source| CacheError::Io {
                path: self.root.clone(),
                source,
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('_') {
                    entries.push(name.to_string());
                }
            }
        }

        entries.sort();
        Ok(entries)
    }

    /// Remove one committed entry.
    pub fn remove(&self, hash: &str) -> Result<(), CacheError> {
        let path = self.entry_path(hash);
        if path.exists() {
            fs::remove_dir_all(&path).map_err(|source| CacheError::Io { path, source })?;
        }
        Ok(())
    }

    /// Remove every committed entry and clear the staging directory.
    pub fn clean_all(&self) -> Result<(), CacheError> {
        for hash in self.list()? {
            self.remove(&hash)?;
        }

        let staging = self.root.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|source| CacheError::Staging {
                path: staging,
                source,
            })?;
        }
        Ok(())
    }

    /// Aggregate entry count, byte size, and file count across the store.
    pub fn report(&self) -> Result<CacheReport, CacheError> {
        let mut report = CacheReport {
            total_entries: 0,
            total_size_bytes: 0,
            total_files: 0,
        };

        for hash in self.list()? {
            report.total_entries += 1;
            for file in WalkDir::new(self.entry_path(&hash))
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                report.total_files += 1;
                if let Ok(metadata) = file.metadata() {
                    report.total_size_bytes += metadata.len();
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, CacheStore) {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path()).unwrap();
        (temp, store)
    }

    #[test]
    fn test_stage_commit_has() {
        let (_temp, store) = store();
        assert!(!store.has("abc123"));

        let staging = store.stage().unwrap();
        fs::write(staging.path().join("out.txt"), "result").unwrap();
        let committed = store.commit(staging, "abc123").unwrap();

        assert!(store.has("abc123"));
        assert_eq!(committed, store.entry_path("abc123"));
        assert_eq!(
            fs::read_to_string(committed.join("out.txt")).unwrap(),
            "result"
        );
    }

    #[test]
    fn test_stage_wipes_previous_contents() {
        let (_temp, store) = store();

        let staging = store.stage().unwrap();
        fs::write(staging.path().join("stale.txt"), "old").unwrap();

        let staging = store.stage().unwrap();
        assert!(!staging.path().join("stale.txt").exists());
    }

    #[test]
    fn test_commit_replaces_existing_entry() {
        let (_temp, store) = store();

        let staging = store.stage().unwrap();
        fs::write(staging.path().join("out.txt"), "first").unwrap();
        store.commit(staging, "abc123").unwrap();

        let staging = store.stage().unwrap();
        fs::write(staging.path().join("out.txt"), "second").unwrap();
        store.commit(staging, "abc123").unwrap();

        assert_eq!(
            fs::read_to_string(store.entry_path("abc123").join("out.txt")).unwrap(),
            "second"
        );
    }

    #[test]
    fn test_stats_round_trip() {
        let (_temp, store) = store();
        let staging = store.stage().unwrap();
        store.commit(staging, "abc123").unwrap();

        let mut statistics = Map::new();
        statistics.insert("time".to_string(), json!(1.5));
        store
            .write_stats("abc123", "A", "double", &statistics)
            .unwrap();

        assert_eq!(store.read_stats("abc123").unwrap(), statistics);

        let sidecar = store.read_sidecar("abc123").unwrap().unwrap();
        assert_eq!(sidecar.version, 1);
        assert_eq!(sidecar.step, "A");
        assert_eq!(sidecar.routine, "double");
    }

    #[test]
    fn test_missing_sidecar_reads_as_empty() {
        let (_temp, store) = store();
        let staging = store.stage().unwrap();
        store.commit(staging, "abc123").unwrap();

        assert!(store.read_stats("abc123").unwrap().is_empty());
    }

    #[test]
    fn test_list_excludes_staging() {
        let (_temp, store) = store();

        let staging = store.stage().unwrap();
        store.commit(staging, "bbb").unwrap();
        let staging = store.stage().unwrap();
        store.commit(staging, "aaa").unwrap();
        // Leave a fresh staging directory behind
        store.stage().unwrap();

        assert_eq!(store.list().unwrap(), vec!["aaa", "bbb"]);
    }

    #[test]
    fn test_remove_and_clean_all() {
        let (_temp, store) = store();

        for hash in ["aaa", "bbb"] {
            let staging = store.stage().unwrap();
            fs::write(staging.path().join("out.txt"), hash).unwrap();
            store.commit(staging, hash).unwrap();
        }

        store.remove("aaa").unwrap();
        assert_eq!(store.list().unwrap(), vec!["bbb"]);

        store.clean_all().unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(!store.root().join(STAGING_DIR).exists());
    }

    #[test]
    fn test_report_counts_files_and_bytes() {
        let (_temp, store) = store();

        let staging = store.stage().unwrap();
        fs::write(staging.path().join("a.txt"), "12345").unwrap();
        fs::write(staging.path().join("b.txt"), "678").unwrap();
        store.commit(staging, "abc123").unwrap();

        let report = store.report().unwrap();
        assert_eq!(report.total_entries, 1);
        assert_eq!(report.total_files, 2);
        assert_eq!(report.total_size_bytes, 8);
    }
}
