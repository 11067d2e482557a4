// Common test utilities shared across acceptance tests
//
// Each test gets a fully isolated project directory (cache entries, staging,
// manifest, and plan configs all live under one TempDir) so tests can run in
// parallel without interfering with each other.

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// An isolated project directory with its own manifest and plan configs.
pub struct TestProject {
    temp_dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write the default routines manifest (_init_routines.json).
    pub fn write_manifest(&self, json: &str) {
        fs::write(self.path().join("_init_routines.json"), json)
            .expect("Failed to write manifest");
    }

    /// Write a plan configuration file.
    pub fn write_config(&self, name: &str, json: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, json).expect("Failed to write plan config");
        path
    }

    /// A takt command pointed at this project.
    pub fn takt(&self) -> Command {
        let mut cmd = Command::new(std::env!("CARGO_BIN_EXE_takt"));
        cmd.env("TAKT_PROJECT_DIR", self.path());
        cmd
    }
}
