//! Common test utilities for crowbar integration tests.
//!
//! Provides `TestEnv` for isolated test environments that never touch the
//! user's settings, `/srv/tftpboot` or `/etc/crowbar`.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// Every variable the binary reads; cleared so the host environment cannot leak in.
const CROWBAR_VARS: &[&str] = &[
    "CROWBAR_CONFIG",
    "CROWBAR_DATA_DIR",
    "CROWBAR_LOCK_DIR",
    "CROWBAR_LOCK_TIMEOUT",
    "CROWBAR_REPOS_ROOT",
    "CROWBAR_REPOS_CATALOG",
    "CROWBAR_REPOS_OVERRIDE",
    "CROWBAR_ADMIN_ADDRESS",
    "CROWBAR_WEB_PORT",
    "CROWBAR_REVISION_POLICY",
    "RUST_LOG",
];

/// A test environment with isolated data and repository directories.
///
/// - `data_dir`: the file backend (via `CROWBAR_DATA_DIR`)
/// - `work_dir`: settings file, repository override and mirror tree
///
/// The `crowbar()` method sets every path per command, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub work_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            work_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the crowbar binary with isolated paths.
    pub fn crowbar(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_crowbar"));
        for var in CROWBAR_VARS {
            cmd.env_remove(var);
        }
        cmd.current_dir(self.work_dir.path());
        cmd.env("CROWBAR_CONFIG", self.config_path());
        cmd.env("CROWBAR_DATA_DIR", self.data_dir.path());
        cmd.env("CROWBAR_REPOS_ROOT", self.repos_root());
        cmd.env("CROWBAR_REPOS_OVERRIDE", self.override_path());
        cmd
    }

    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }

    pub fn work_path(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.work_dir.path().join("config.toml")
    }

    pub fn repos_root(&self) -> PathBuf {
        self.work_dir.path().join("tftpboot")
    }

    pub fn override_path(&self) -> PathBuf {
        self.work_dir.path().join("repos.yml")
    }

    pub fn write_config(&self, contents: &str) {
        fs::write(self.config_path(), contents).unwrap();
    }

    pub fn write_override(&self, contents: &str) {
        fs::write(self.override_path(), contents).unwrap();
    }

    /// Write a file under the work directory and return its path.
    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.work_dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    /// Create the local mirror directory of a repository.
    pub fn create_mirror(&self, platform: &str, name: &str) -> PathBuf {
        let dir = self.repos_root().join(platform).join("repos").join(name);
        fs::create_dir_all(dir.join("repodata")).unwrap();
        dir
    }

    /// Publish the active repositories data bag.
    pub fn publish_active(&self, item: &serde_json::Value) {
        let dir = self.data_dir.path().join("data_bags").join("crowbar");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("repositories.json"), item.to_string()).unwrap();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse JSON output from a command.
pub fn parse_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("Failed to parse JSON output")
}
