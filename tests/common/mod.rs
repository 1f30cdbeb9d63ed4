//! Common test utilities for strata integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's home directory or OS credential store.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test environment with isolated config layers and vault.
///
/// Each `TestEnv` creates three temporary directories:
/// - `project_dir`: The working directory (project layers)
/// - `home_dir`: The global anchor (via `STRATA_CLI_HOME`)
/// - `vault_dir`: Holds the file vault (via `STRATA_VAULT_FILE`)
///
/// The `strata()` method sets all three per-invocation, making tests
/// parallel-safe.
pub struct TestEnv {
    pub project_dir: TempDir,
    pub home_dir: TempDir,
    pub vault_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            project_dir: TempDir::new().unwrap(),
            home_dir: TempDir::new().unwrap(),
            vault_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the strata binary with isolated directories.
    pub fn strata(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_strata"));
        cmd.current_dir(self.project_dir.path());
        cmd.env("STRATA_CLI_HOME", self.home_dir.path());
        cmd.env("STRATA_VAULT_FILE", self.vault_file());
        cmd.env_remove("STRATA_APP");
        cmd.env_remove("STRATA_LOG");
        cmd
    }

    pub fn project_path(&self) -> &Path {
        self.project_dir.path()
    }

    pub fn home_path(&self) -> &Path {
        self.home_dir.path()
    }

    pub fn vault_file(&self) -> PathBuf {
        self.vault_dir.path().join("vault.json")
    }

    pub fn project_file(&self) -> PathBuf {
        self.project_path().join("strata.config.json")
    }

    pub fn project_user_file(&self) -> PathBuf {
        self.project_path().join("strata.config.user.json")
    }

    pub fn global_file(&self) -> PathBuf {
        self.home_path().join("strata.config.json")
    }

    pub fn global_user_file(&self) -> PathBuf {
        self.home_path().join("strata.config.user.json")
    }

    /// Read a file as a string, empty if missing.
    pub fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }

    /// Write raw JSON to a path.
    pub fn write_json(&self, path: &Path, json: &serde_json::Value) {
        std::fs::write(path, serde_json::to_string_pretty(json).unwrap()).unwrap();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
