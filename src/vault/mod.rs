//! Secure storage for configuration properties marked as secure.
//!
//! Config files never hold the plaintext of a secure property. Instead the
//! owning layer records the dotted path in its `secure` list and the value is
//! kept in a [`SecureVault`], keyed by an opaque account string derived from
//! the layer file path and the dotted path.
//!
//! Two backends are provided:
//! - [`CredentialAdapter`] - the OS credential store via the `keyring` crate,
//!   with fallback service names and chunking for length-limited platforms
//! - [`FileVault`] - a `0600` JSON file, for headless machines and tests
//!
//! ## Lifecycle
//!
//! Every backend must be [`initialize`](SecureVault::initialize)d once before
//! use. Initialization never fails loudly: the cause is recorded and every
//! later call returns [`VaultError::Unavailable`], so hosts whose users never
//! touch secure properties are not blocked at startup.

pub mod credential;
pub mod file;
pub mod keyring_store;

pub use credential::{
    CHUNK_TERMINATOR, CredentialAdapter, LEGACY_ACCOUNT_SUFFIXES, PLATFORM_MAX_VALUE_LEN,
};
pub use file::FileVault;
pub use keyring_store::{CredentialStoreError, DefaultKeyringStore, KeyringStore};

use std::fmt::Debug;
use std::path::Path;

/// Errors raised by a secure vault backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    /// The backend failed to initialize, was never initialized, or timed out.
    #[error("secure vault unavailable: {0}")]
    Unavailable(String),

    /// A required secret was absent under every service name.
    #[error("secret not found: {0}")]
    NotFound(String),

    /// The backend is reachable but the operation failed.
    #[error("secure vault error: {0}")]
    Backend(String),
}

/// Pluggable secret store.
///
/// Keys are opaque strings; the vault knows nothing about config structure.
/// `load` returning `Ok(None)` is the normal "not stored" outcome.
pub trait SecureVault: Debug + Send + Sync {
    /// Bind the backend. Failures are recorded, not returned.
    fn initialize(&mut self);

    /// Why the backend is unusable, if it is.
    fn unavailable_reason(&self) -> Option<String>;

    /// Fetch a value, `None` when absent.
    fn load(&self, key: &str) -> Result<Option<String>, VaultError>;

    /// Store a value, replacing any previous entry for the key.
    fn save(&self, key: &str, value: &str) -> Result<(), VaultError>;

    /// Remove a value. Returns whether anything was removed.
    fn delete(&self, key: &str) -> Result<bool, VaultError>;

    /// Fetch a value that must exist.
    fn load_required(&self, key: &str) -> Result<String, VaultError> {
        self.load(key)?
            .ok_or_else(|| VaultError::NotFound(key.to_string()))
    }
}

/// Build the vault account for a secure property.
///
/// The account uniquely identifies the pair (layer file, dotted JSON path).
pub fn secure_account(layer_path: &Path, dotted_path: &str) -> String {
    format!("{}:{}", layer_path.display(), dotted_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[derive(Debug, Default)]
    struct EmptyVault;

    impl SecureVault for EmptyVault {
        fn initialize(&mut self) {}

        fn unavailable_reason(&self) -> Option<String> {
            None
        }

        fn load(&self, _key: &str) -> Result<Option<String>, VaultError> {
            Ok(None)
        }

        fn save(&self, _key: &str, _value: &str) -> Result<(), VaultError> {
            Ok(())
        }

        fn delete(&self, _key: &str) -> Result<bool, VaultError> {
            Ok(false)
        }
    }

    #[test]
    fn test_secure_account_distinguishes_layers_and_paths() {
        let a = secure_account(&PathBuf::from("/p/strata.config.json"), "profiles.a.properties.pw");
        let b = secure_account(
            &PathBuf::from("/p/strata.config.user.json"),
            "profiles.a.properties.pw",
        );
        let c = secure_account(&PathBuf::from("/p/strata.config.json"), "profiles.b.properties.pw");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, "/p/strata.config.json:profiles.a.properties.pw");
    }

    #[test]
    fn test_load_required_reports_not_found() {
        let vault = EmptyVault;
        assert_eq!(
            vault.load_required("acct"),
            Err(VaultError::NotFound("acct".to_string()))
        );
    }

    #[test]
    fn test_vault_error_display() {
        assert_eq!(
            VaultError::Unavailable("no dbus".to_string()).to_string(),
            "secure vault unavailable: no dbus"
        );
        assert_eq!(
            VaultError::NotFound("acct".to_string()).to_string(),
            "secret not found: acct"
        );
    }
}
