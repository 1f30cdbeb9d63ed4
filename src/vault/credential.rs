//! OS credential store adapter.
//!
//! ## Service resolution
//!
//! Loads try the adapter's own service first, then each fallback service in
//! priority order, returning the first hit. This lets users keep secrets that
//! were stored under a predecessor application's identity. Saves always write
//! under the current service only.
//!
//! ## Chunking
//!
//! Some platforms cap the length of a stored credential (2560 characters on
//! Windows). A longer value is split into `account-1`, `account-2`, ... with
//! [`CHUNK_TERMINATOR`] appended to the payload before splitting. Loads read
//! the single entry first and only then walk the chunk sequence.

use super::{CredentialStoreError, DefaultKeyringStore, KeyringStore, SecureVault, VaultError};
use tracing::{debug, warn};

/// Appended to the final chunk of a split value.
pub const CHUNK_TERMINATOR: &str = "--end--";

/// Maximum credential length enforced by the platform store.
#[cfg(windows)]
pub const PLATFORM_MAX_VALUE_LEN: Option<usize> = Some(2560);

/// Maximum credential length enforced by the platform store.
#[cfg(not(windows))]
pub const PLATFORM_MAX_VALUE_LEN: Option<usize> = None;

/// Deprecated account suffixes and their modern replacements.
///
/// Only consulted on load. Saves never write the rewritten name.
pub const LEGACY_ACCOUNT_SUFFIXES: &[(&str, &str)] =
    &[("_username", "_user"), ("_password", "_pass")];

/// Hard stop for chunk walking so a corrupt store cannot loop forever.
const MAX_CHUNKS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AdapterState {
    Uninitialized,
    Ready,
    Failed(String),
}

/// [`SecureVault`] backed by a [`KeyringStore`].
#[derive(Debug)]
pub struct CredentialAdapter<S: KeyringStore = DefaultKeyringStore> {
    service: String,
    fallback_services: Vec<String>,
    max_value_len: Option<usize>,
    store: S,
    state: AdapterState,
}

impl CredentialAdapter<DefaultKeyringStore> {
    /// Adapter over the platform credential store.
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_store(service, DefaultKeyringStore)
    }
}

impl<S: KeyringStore> CredentialAdapter<S> {
    pub fn with_store(service: impl Into<String>, store: S) -> Self {
        Self {
            service: service.into(),
            fallback_services: Vec::new(),
            max_value_len: PLATFORM_MAX_VALUE_LEN,
            store,
            state: AdapterState::Uninitialized,
        }
    }

    /// Historical service names consulted on load, highest priority first.
    pub fn with_fallback_services<I, T>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.fallback_services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Override the platform length limit. `None` disables chunking.
    ///
    /// The limit is raised to leave room for at least one payload character
    /// next to the terminator.
    pub fn with_max_value_len(mut self, max_value_len: Option<usize>) -> Self {
        let floor = CHUNK_TERMINATOR.chars().count() + 1;
        self.max_value_len = max_value_len.map(|len| len.max(floor));
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn fallback_services(&self) -> &[String] {
        &self.fallback_services
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn ensure_ready(&self) -> Result<(), VaultError> {
        match &self.state {
            AdapterState::Ready => Ok(()),
            AdapterState::Failed(cause) => Err(VaultError::Unavailable(cause.clone())),
            AdapterState::Uninitialized => Err(VaultError::Unavailable(
                "credential adapter used before initialize()".to_string(),
            )),
        }
    }

    /// Current service followed by fallbacks, without repeats.
    fn services(&self) -> Vec<&str> {
        let mut services = vec![self.service.as_str()];
        for fallback in &self.fallback_services {
            if !services.contains(&fallback.as_str()) {
                services.push(fallback);
            }
        }
        services
    }

    fn load_from(&self, service: &str, account: &str) -> Result<Option<String>, VaultError> {
        if let Some(value) = self.store.load(service, account).map_err(store_error)? {
            return Ok(Some(value));
        }

        // The terminator only counts after the last stored chunk, since the
        // value itself may contain it at a chunk boundary.
        let mut assembled = String::new();
        for index in 1..=MAX_CHUNKS + 1 {
            let chunk = self
                .store
                .load(service, &chunk_account(account, index))
                .map_err(store_error)?;
            let Some(chunk) = chunk else {
                if index == 1 {
                    return Ok(None);
                }
                if let Some(value) = assembled.strip_suffix(CHUNK_TERMINATOR) {
                    debug!("Reassembled {} from {} chunks", account, index - 1);
                    return Ok(Some(value.to_string()));
                }
                warn!(
                    "Chunked credential {} under {} ends at chunk {} without terminator",
                    account,
                    service,
                    index - 1
                );
                return Err(VaultError::Backend(format!(
                    "incomplete chunked credential for {}",
                    account
                )));
            };
            if index > MAX_CHUNKS {
                break;
            }
            assembled.push_str(&chunk);
        }

        Err(VaultError::Backend(format!(
            "chunked credential for {} exceeds {} chunks",
            account, MAX_CHUNKS
        )))
    }

    fn delete_from(&self, service: &str, account: &str) -> Result<bool, VaultError> {
        let mut removed = self.store.delete(service, account).map_err(store_error)?;
        for index in 1..=MAX_CHUNKS {
            if !self
                .store
                .delete(service, &chunk_account(account, index))
                .map_err(store_error)?
            {
                break;
            }
            removed = true;
        }
        Ok(removed)
    }
}

impl<S: KeyringStore> SecureVault for CredentialAdapter<S> {
    fn initialize(&mut self) {
        self.state = match self.store.check_access(&self.service) {
            Ok(()) => {
                debug!("Credential store ready for service {}", self.service);
                AdapterState::Ready
            }
            Err(error) => {
                warn!(
                    "Credential store unavailable for service {}: {}",
                    self.service, error
                );
                AdapterState::Failed(error.to_string())
            }
        };
    }

    fn unavailable_reason(&self) -> Option<String> {
        self.ensure_ready().err().map(|e| match e {
            VaultError::Unavailable(cause) => cause,
            other => other.to_string(),
        })
    }

    fn load(&self, key: &str) -> Result<Option<String>, VaultError> {
        self.ensure_ready()?;
        let accounts = account_variants(key);
        for service in self.services() {
            for account in &accounts {
                if let Some(value) = self.load_from(service, account)? {
                    if service != self.service || account != key {
                        debug!("Loaded {} via legacy location {}/{}", key, service, account);
                    }
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    fn save(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.ensure_ready()?;
        self.delete(key)?;

        match self.max_value_len {
            Some(max) if value.chars().count() > max => {
                let chunks = split_chunks(value, max);
                debug!("Saving {} as {} chunks", key, chunks.len());
                for (index, chunk) in chunks.iter().enumerate() {
                    self.store
                        .save(&self.service, &chunk_account(key, index + 1), chunk)
                        .map_err(store_error)?;
                }
                Ok(())
            }
            _ => self
                .store
                .save(&self.service, key, value)
                .map_err(store_error),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, VaultError> {
        self.ensure_ready()?;
        let mut removed = false;
        for service in self.services() {
            removed |= self.delete_from(service, key)?;
        }
        Ok(removed)
    }
}

fn store_error(error: CredentialStoreError) -> VaultError {
    if error.is_unavailable() {
        VaultError::Unavailable(error.to_string())
    } else {
        VaultError::Backend(error.to_string())
    }
}

fn chunk_account(account: &str, index: usize) -> String {
    format!("{}-{}", account, index)
}

/// The account itself followed by its legacy-suffix rewrites.
fn account_variants(account: &str) -> Vec<String> {
    let mut variants = vec![account.to_string()];
    for (deprecated, modern) in LEGACY_ACCOUNT_SUFFIXES {
        if let Some(stem) = account.strip_suffix(deprecated) {
            variants.push(format!("{}{}", stem, modern));
        }
    }
    variants
}

/// Split `value` plus terminator into chunks of at most `max` characters.
fn split_chunks(value: &str, max: usize) -> Vec<String> {
    let payload: Vec<char> = value.chars().chain(CHUNK_TERMINATOR.chars()).collect();
    payload
        .chunks(max)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::keyring_store::mock::MockKeyringStore;

    fn adapter(store: &MockKeyringStore) -> CredentialAdapter<MockKeyringStore> {
        let mut adapter = CredentialAdapter::with_store("strata", store.clone())
            .with_max_value_len(None);
        adapter.initialize();
        adapter
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_uninitialized_adapter_is_unavailable() {
        let adapter = CredentialAdapter::with_store("strata", MockKeyringStore::default());
        assert!(matches!(
            adapter.load("acct"),
            Err(VaultError::Unavailable(_))
        ));
        assert!(matches!(
            adapter.save("acct", "v"),
            Err(VaultError::Unavailable(_))
        ));
    }

    #[test]
    fn test_failed_initialize_records_cause() {
        let mut adapter =
            CredentialAdapter::with_store("strata", MockKeyringStore::unreachable("no dbus"));
        adapter.initialize();

        let reason = adapter.unavailable_reason().unwrap();
        assert!(reason.contains("no dbus"));
        match adapter.load("acct") {
            Err(VaultError::Unavailable(cause)) => assert!(cause.contains("no dbus")),
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_ready_adapter_has_no_unavailable_reason() {
        let store = MockKeyringStore::default();
        assert_eq!(adapter(&store).unavailable_reason(), None);
    }

    // ==================== Load/Save Tests ====================

    #[test]
    fn test_save_then_load() {
        let store = MockKeyringStore::default();
        let adapter = adapter(&store);

        adapter.save("acct", "hunter2").unwrap();
        assert_eq!(adapter.load("acct").unwrap().as_deref(), Some("hunter2"));
        assert_eq!(store.saved_value("strata", "acct").as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_missing_value_is_none() {
        let store = MockKeyringStore::default();
        assert_eq!(adapter(&store).load("nothing").unwrap(), None);
    }

    #[test]
    fn test_load_required_missing_is_not_found() {
        let store = MockKeyringStore::default();
        assert_eq!(
            adapter(&store).load_required("nothing"),
            Err(VaultError::NotFound("nothing".to_string()))
        );
    }

    #[test]
    fn test_save_overwrites_without_duplicates() {
        let store = MockKeyringStore::default();
        let adapter = adapter(&store);

        adapter.save("acct", "one").unwrap();
        adapter.save("acct", "two").unwrap();
        assert_eq!(adapter.load("acct").unwrap().as_deref(), Some("two"));
        assert_eq!(store.len(), 1);
    }

    // ==================== Fallback Service Tests ====================

    #[test]
    fn test_load_falls_back_to_legacy_services_in_order() {
        let store = MockKeyringStore::default();
        store.save("old-two", "acct", "from-two").unwrap();
        store.save("old-one", "acct", "from-one").unwrap();

        let adapter = adapter(&store).with_fallback_services(["old-one", "old-two"]);
        assert_eq!(adapter.load("acct").unwrap().as_deref(), Some("from-one"));
    }

    #[test]
    fn test_current_service_wins_over_fallback() {
        let store = MockKeyringStore::default();
        store.save("old", "acct", "stale").unwrap();
        store.save("strata", "acct", "fresh").unwrap();

        let adapter = adapter(&store).with_fallback_services(["old"]);
        assert_eq!(adapter.load("acct").unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_save_writes_current_service_and_clears_legacy() {
        let store = MockKeyringStore::default();
        store.save("old", "acct", "stale").unwrap();

        let adapter = adapter(&store).with_fallback_services(["old"]);
        adapter.save("acct", "fresh").unwrap();

        assert_eq!(store.saved_value("strata", "acct").as_deref(), Some("fresh"));
        assert_eq!(store.saved_value("old", "acct"), None);
    }

    #[test]
    fn test_legacy_suffix_is_read_but_never_written() {
        let store = MockKeyringStore::default();
        store.save("strata", "server_user", "admin").unwrap();

        let adapter = adapter(&store);
        assert_eq!(
            adapter.load("server_username").unwrap().as_deref(),
            Some("admin")
        );

        adapter.save("server_username", "root").unwrap();
        assert_eq!(
            store.saved_value("strata", "server_username").as_deref(),
            Some("root")
        );
        assert_eq!(store.saved_value("strata", "server_user").as_deref(), Some("admin"));
    }

    #[test]
    fn test_account_variants() {
        assert_eq!(account_variants("plain"), vec!["plain"]);
        assert_eq!(account_variants("x_password"), vec!["x_password", "x_pass"]);
    }

    // ==================== Chunking Tests ====================

    #[test]
    fn test_oversized_value_round_trips_through_chunks() {
        let store = MockKeyringStore::default();
        let adapter = adapter(&store).with_max_value_len(Some(16));
        let value: String = (0..100).map(|i| char::from(b'a' + (i % 26) as u8)).collect();

        adapter.save("acct", &value).unwrap();
        assert_eq!(store.saved_value("strata", "acct"), None);
        assert!(store.saved_value("strata", "acct-1").is_some());
        assert!(store.len() > 1);
        assert!(store.all_values().iter().all(|v| v.chars().count() <= 16));

        assert_eq!(adapter.load("acct").unwrap(), Some(value));
    }

    #[test]
    fn test_terminator_inside_value_at_chunk_boundary() {
        let store = MockKeyringStore::default();
        let adapter = adapter(&store).with_max_value_len(Some(10));

        adapter.save("acct", "abc--end--zzz").unwrap();
        assert_eq!(store.saved_value("strata", "acct-1").as_deref(), Some("abc--end--"));
        assert_eq!(store.saved_value("strata", "acct-2").as_deref(), Some("zzz--end--"));

        assert_eq!(
            adapter.load("acct").unwrap().as_deref(),
            Some("abc--end--zzz")
        );
    }

    #[test]
    fn test_value_at_limit_is_stored_whole() {
        let store = MockKeyringStore::default();
        let adapter = adapter(&store).with_max_value_len(Some(16));

        adapter.save("acct", "0123456789abcdef").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            adapter.load("acct").unwrap().as_deref(),
            Some("0123456789abcdef")
        );
    }

    #[test]
    fn test_chunking_respects_multibyte_characters() {
        let store = MockKeyringStore::default();
        let adapter = adapter(&store).with_max_value_len(Some(10));
        let value = "ünïcödé-välüé-çhünkß".repeat(3);

        adapter.save("acct", &value).unwrap();
        assert_eq!(adapter.load("acct").unwrap(), Some(value));
    }

    #[test]
    fn test_delete_removes_every_chunk() {
        let store = MockKeyringStore::default();
        let adapter = adapter(&store).with_max_value_len(Some(12));

        adapter.save("acct", &"x".repeat(80)).unwrap();
        assert!(adapter.delete("acct").unwrap());
        assert_eq!(store.len(), 0);
        assert_eq!(adapter.load("acct").unwrap(), None);
    }

    #[test]
    fn test_shorter_resave_leaves_no_stale_chunks() {
        let store = MockKeyringStore::default();
        let adapter = adapter(&store).with_max_value_len(Some(12));

        adapter.save("acct", &"x".repeat(80)).unwrap();
        adapter.save("acct", "short").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(adapter.load("acct").unwrap().as_deref(), Some("short"));
    }

    #[test]
    fn test_missing_terminator_is_backend_error() {
        let store = MockKeyringStore::default();
        store.save("strata", "acct-1", "partial").unwrap();

        assert!(matches!(
            adapter(&store).load("acct"),
            Err(VaultError::Backend(_))
        ));
    }

    #[test]
    fn test_max_value_len_floor() {
        let store = MockKeyringStore::default();
        let adapter = adapter(&store).with_max_value_len(Some(1));

        adapter.save("acct", "abcdefghijklmnop").unwrap();
        assert_eq!(
            adapter.load("acct").unwrap().as_deref(),
            Some("abcdefghijklmnop")
        );
    }
}
