//! Strata - layered JSON configuration for CLI frameworks.
//!
//! This library discovers, loads, merges and mutates the configuration layers
//! of a CLI application (project-user, project, global-user, global) and
//! redirects properties marked as secure to an external secret vault instead
//! of storing them in plaintext.
//!
//! The `strata` binary is a thin driver over [`config::Config`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod vault;

pub use config::{Config, ConfigLayer, ConfigProperties, LoadOptions, SetOptions};
pub use vault::{SecureVault, VaultError};

/// Test utilities for isolated config directories.
#[cfg(test)]
pub(crate) mod test_utils {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::config::{Config, LoadOptions};
    use crate::vault::keyring_store::mock::MockKeyringStore;
    use crate::vault::{CredentialAdapter, SecureVault};

    pub const TEST_APP: &str = "strata";

    /// Test environment with an isolated project directory, home directory
    /// and in-memory credential store.
    ///
    /// Nothing touches the real home directory or OS keyring.
    pub struct TestEnv {
        /// Simulated project directory (the working directory)
        pub project_dir: TempDir,
        /// Simulated home directory (the global anchor)
        pub home_dir: TempDir,
        /// Credential store shared by every vault created from this env
        pub store: MockKeyringStore,
    }

    impl TestEnv {
        pub fn new() -> Self {
            Self {
                project_dir: TempDir::new().unwrap(),
                home_dir: TempDir::new().unwrap(),
                store: MockKeyringStore::default(),
            }
        }

        pub fn project(&self) -> &Path {
            self.project_dir.path()
        }

        pub fn home(&self) -> &Path {
            self.home_dir.path()
        }

        pub fn project_file(&self) -> PathBuf {
            self.project().join("strata.config.json")
        }

        pub fn project_user_file(&self) -> PathBuf {
            self.project().join("strata.config.user.json")
        }

        pub fn global_file(&self) -> PathBuf {
            self.home().join("strata.config.json")
        }

        pub fn global_user_file(&self) -> PathBuf {
            self.home().join("strata.config.user.json")
        }

        /// Write raw JSON to a layer file.
        pub fn write(&self, path: &Path, json: &serde_json::Value) {
            fs::write(path, serde_json::to_string_pretty(json).unwrap()).unwrap();
        }

        /// An initialized vault over this env's shared store.
        pub fn vault(&self) -> Arc<dyn SecureVault> {
            let mut adapter = CredentialAdapter::with_store(TEST_APP, self.store.clone())
                .with_max_value_len(None);
            adapter.initialize();
            Arc::new(adapter)
        }

        pub fn options(&self) -> LoadOptions {
            LoadOptions::new()
                .with_cwd(self.project())
                .with_home(self.home())
                .with_vault(self.vault())
        }

        /// Load config for this env with the mock vault attached.
        pub fn load(&self) -> Config {
            Config::load_with_options(TEST_APP, self.options()).unwrap()
        }
    }

    impl Default for TestEnv {
        fn default() -> Self {
            Self::new()
        }
    }
}

/// Library-level error type for Strata operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed config file {path}: {source}")]
    MalformedConfig {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Secure vault unavailable: {0}")]
    VaultUnavailable(String),

    #[error("Secret not found in vault: {0}")]
    SecretNotFound(String),

    #[error("Secure vault error: {0}")]
    Vault(String),

    #[error("Invalid property path: {0}")]
    InvalidPath(String),

    #[error("Not writable: {0}")]
    NotWritable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

impl From<VaultError> for Error {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Unavailable(cause) => Error::VaultUnavailable(cause),
            VaultError::NotFound(account) => Error::SecretNotFound(account),
            VaultError::Backend(message) => Error::Vault(message),
        }
    }
}

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_errors_map_to_distinct_classes() {
        assert!(matches!(
            Error::from(VaultError::Unavailable("x".to_string())),
            Error::VaultUnavailable(_)
        ));
        assert!(matches!(
            Error::from(VaultError::NotFound("x".to_string())),
            Error::SecretNotFound(_)
        ));
        assert!(matches!(
            Error::from(VaultError::Backend("x".to_string())),
            Error::Vault(_)
        ));
    }
}
