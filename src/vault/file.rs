//! File-backed vault for machines without an OS credential store.
//!
//! Secrets live in a single JSON object mapping account to value. The file
//! MUST be owner read/write only (0600) because it holds secrets in the clear.

use super::{SecureVault, VaultError};
use serde_json::{Map, Value};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, trace};

/// Required permissions for the vault file (Unix: 0600, owner read/write only).
#[cfg(unix)]
pub const VAULT_FILE_MODE: u32 = 0o600;

/// [`SecureVault`] stored in a JSON file.
#[derive(Debug)]
pub struct FileVault {
    path: PathBuf,
    unavailable: Option<String>,
    initialized: bool,
    lock: Mutex<()>,
}

impl FileVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            unavailable: None,
            initialized: false,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_ready(&self) -> Result<(), VaultError> {
        if !self.initialized {
            return Err(VaultError::Unavailable(
                "file vault used before initialize()".to_string(),
            ));
        }
        match &self.unavailable {
            Some(cause) => Err(VaultError::Unavailable(cause.clone())),
            None => Ok(()),
        }
    }

    fn read_entries(&self) -> Result<Map<String, Value>, VaultError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(VaultError::Unavailable(format!(
                    "failed to read vault file {}: {}",
                    self.path.display(),
                    err
                )));
            }
        };
        serde_json::from_str(&contents).map_err(|e| {
            VaultError::Backend(format!(
                "failed to parse vault file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> Result<(), VaultError> {
        let io_err = |e: std::io::Error| {
            VaultError::Backend(format!(
                "failed to write vault file {}: {}",
                self.path.display(),
                e
            ))
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let serialized = serde_json::to_string_pretty(entries)
            .map_err(|e| VaultError::Backend(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(serialized.as_bytes()).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(VAULT_FILE_MODE))
                .map_err(io_err)?;
        }

        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl SecureVault for FileVault {
    fn initialize(&mut self) {
        self.initialized = true;
        self.unavailable = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => Some(format!(
                "vault directory {} does not exist",
                parent.display()
            )),
            _ => None,
        };
        debug!(
            "File vault at {} initialized (available: {})",
            self.path.display(),
            self.unavailable.is_none()
        );
    }

    fn unavailable_reason(&self) -> Option<String> {
        self.ensure_ready().err().map(|e| match e {
            VaultError::Unavailable(cause) => cause,
            other => other.to_string(),
        })
    }

    fn load(&self, key: &str) -> Result<Option<String>, VaultError> {
        self.ensure_ready()?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        trace!("file_vault.load account={}", key);
        let entries = self.read_entries()?;
        Ok(entries
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.ensure_ready()?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        trace!("file_vault.save account={}, value_len={}", key, value.len());
        let mut entries = self.read_entries()?;
        entries.shift_remove(key);
        entries.insert(key.to_string(), Value::String(value.to_string()));
        self.write_entries(&entries)
    }

    fn delete(&self, key: &str) -> Result<bool, VaultError> {
        self.ensure_ready()?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        trace!("file_vault.delete account={}", key);
        let mut entries = self.read_entries()?;
        if entries.shift_remove(key).is_none() {
            return Ok(false);
        }
        self.write_entries(&entries)?;
        Ok(true)
    }
}
