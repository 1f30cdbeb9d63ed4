//! Thin seam over the OS credential store.
//!
//! [`KeyringStore`] addresses entries by `(service, account)` and is the only
//! place that talks to the `keyring` crate. [`super::CredentialAdapter`] layers
//! fallback services, chunking and lifecycle on top of it.

use keyring::Entry;
use keyring::Error as KeyringError;
use std::fmt::Debug;
use tracing::trace;

/// Account used to check backend access during initialization.
const ACCESS_CHECK_ACCOUNT: &str = "__strata_access_check__";

/// Error from the underlying credential store.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CredentialStoreError(#[from] KeyringError);

impl CredentialStoreError {
    pub fn new(error: KeyringError) -> Self {
        Self(error)
    }

    /// Whether the failure means the store itself cannot be reached
    /// (no session bus, locked store, platform timeout).
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.0,
            KeyringError::NoStorageAccess(_) | KeyringError::PlatformFailure(_)
        )
    }
}

/// Credential store addressed by `(service, account)`.
pub trait KeyringStore: Debug + Send + Sync {
    /// Check that the backend can be reached for `service`.
    fn check_access(&self, service: &str) -> Result<(), CredentialStoreError> {
        let _ = service;
        Ok(())
    }

    fn load(&self, service: &str, account: &str) -> Result<Option<String>, CredentialStoreError>;
    fn save(&self, service: &str, account: &str, value: &str) -> Result<(), CredentialStoreError>;
    fn delete(&self, service: &str, account: &str) -> Result<bool, CredentialStoreError>;
}

/// The platform credential store selected at build time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyringStore;

impl KeyringStore for DefaultKeyringStore {
    fn check_access(&self, service: &str) -> Result<(), CredentialStoreError> {
        trace!("keyring.check_access start, service={service}");
        let entry = Entry::new(service, ACCESS_CHECK_ACCOUNT)?;
        match entry.get_password() {
            Ok(_) | Err(KeyringError::NoEntry) => Ok(()),
            Err(error) => {
                trace!("keyring.check_access error, service={service}, error={error}");
                Err(CredentialStoreError::new(error))
            }
        }
    }

    fn load(&self, service: &str, account: &str) -> Result<Option<String>, CredentialStoreError> {
        trace!("keyring.load start, service={service}, account={account}");
        let entry = Entry::new(service, account)?;
        match entry.get_password() {
            Ok(password) => {
                trace!("keyring.load success, service={service}, account={account}");
                Ok(Some(password))
            }
            Err(KeyringError::NoEntry) => {
                trace!("keyring.load no entry, service={service}, account={account}");
                Ok(None)
            }
            Err(error) => {
                trace!("keyring.load error, service={service}, account={account}, error={error}");
                Err(CredentialStoreError::new(error))
            }
        }
    }

    fn save(&self, service: &str, account: &str, value: &str) -> Result<(), CredentialStoreError> {
        trace!(
            "keyring.save start, service={service}, account={account}, value_len={}",
            value.len()
        );
        let entry = Entry::new(service, account)?;
        entry.set_password(value).map_err(|error| {
            trace!("keyring.save error, service={service}, account={account}, error={error}");
            CredentialStoreError::new(error)
        })
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, CredentialStoreError> {
        trace!("keyring.delete start, service={service}, account={account}");
        let entry = Entry::new(service, account)?;
        match entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(KeyringError::NoEntry) => Ok(false),
            Err(error) => {
                trace!("keyring.delete error, service={service}, account={account}, error={error}");
                Err(CredentialStoreError::new(error))
            }
        }
    }
}
