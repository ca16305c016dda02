//! Crowbar - role and repository registries for bare-metal cluster orchestration.
//!
//! This library provides the core functionality for the `crowbar` CLI tool:
//! versioned role records shared between barclamps (with lock-guarded,
//! revision-checked saves) and the per-platform software repository registry
//! with its validation chain.

pub mod backend;
pub mod barclamp;
pub mod cli;
pub mod commands;
pub mod config;
pub mod lock;
pub mod repository;
pub mod role;

/// Test utilities for isolated test environments.
#[cfg(test)]
pub(crate) mod test_utils {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::backend::MemoryBackend;
    use crate::lock::MemoryLockService;
    use crate::role::RoleRegistry;

    /// Test environment with an in-memory backend and lock table.
    pub struct TestEnv {
        pub backend: Arc<MemoryBackend>,
        pub locks: Arc<MemoryLockService>,
        /// Scratch directory for repository trees and exports
        pub scratch: TempDir,
    }

    impl TestEnv {
        pub fn new() -> Self {
            Self {
                backend: Arc::new(MemoryBackend::new()),
                locks: Arc::new(MemoryLockService::new(Duration::from_secs(5))),
                scratch: TempDir::new().unwrap(),
            }
        }

        pub fn path(&self) -> &Path {
            self.scratch.path()
        }

        pub fn roles(&self) -> RoleRegistry {
            RoleRegistry::new(self.backend.clone(), self.locks.clone())
        }
    }

    impl Default for TestEnv {
        fn default() -> Self {
            Self::new()
        }
    }
}

/// Library-level error type for Crowbar operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Settings error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    Transport(String),

    #[error("Timed out after {waited:?} waiting for lock {name}")]
    LockTimeout {
        name: String,
        waited: std::time::Duration,
    },

    #[error("Revision conflict on role {role}: expected {expected:?}, found {found:?}")]
    RevisionConflict {
        role: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Crowbar operations.
pub type Result<T> = std::result::Result<T, Error>;
