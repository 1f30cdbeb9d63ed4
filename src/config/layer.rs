//! A single configuration file and its secure-property bookkeeping.
//!
//! ## Secure values
//!
//! On save every path from [`ConfigProperties::secure_paths`] that holds a
//! value is removed from the plaintext tree and written to the vault. On
//! secure-load the inverse happens: each secure path is fetched from the vault
//! and spliced back into the tree. A vault entry that is missing leaves the
//! property absent.

use super::path;
use super::schema::ConfigProperties;
use crate::vault::{SecureVault, secure_account};
use crate::{Error, Result};
use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One on-disk JSON document, present or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    /// Absolute file path (may not exist yet)
    pub path: PathBuf,
    /// Whether the file was on disk at load time (or has since been saved)
    pub exists: bool,
    /// Whether this is a `.user.` layer
    pub user: bool,
    /// Whether this layer lives at the global anchor
    pub global: bool,
    /// Parsed contents, or the empty skeleton
    pub properties: ConfigProperties,
    /// Secure paths dropped since the last save, pending vault deletion
    retired_secure: Vec<String>,
}

impl ConfigLayer {
    /// A layer with no file behind it.
    pub fn empty(path: impl Into<PathBuf>, user: bool, global: bool) -> Self {
        Self {
            path: path.into(),
            exists: false,
            user,
            global,
            properties: ConfigProperties::skeleton(),
            retired_secure: Vec::new(),
        }
    }

    /// Read and parse the layer file.
    ///
    /// A missing file yields an empty layer. Invalid JSON is an error, never
    /// silently replaced by defaults.
    pub fn load(path: &Path, user: bool, global: bool) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("Layer {} not found, using empty skeleton", path.display());
                return Ok(Self::empty(path, user, global));
            }
            Err(err) => return Err(Error::Io(err)),
        };

        let properties =
            serde_json::from_str(&contents).map_err(|source| Error::MalformedConfig {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded layer {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            exists: true,
            user,
            global,
            properties,
            retired_secure: Vec::new(),
        })
    }

    /// The properties as a JSON tree.
    pub fn tree(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.properties)?)
    }

    /// Replace the properties from a JSON tree.
    ///
    /// Fails without modifying the layer if the tree no longer fits the
    /// config layout (e.g. a profile node was overwritten by a string).
    pub fn replace_tree(&mut self, tree: Value) -> Result<()> {
        self.properties = serde_json::from_value(tree).map_err(|e| {
            Error::InvalidInput(format!(
                "change does not fit the layout of {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Value at a dotted path in this layer only.
    pub fn get(&self, dotted_path: &str) -> Result<Option<Value>> {
        Ok(path::get(&self.tree()?, dotted_path).cloned())
    }

    /// Full secure paths of this layer.
    pub fn secure_paths(&self) -> Vec<String> {
        self.properties.secure_paths()
    }

    pub fn is_secure(&self, dotted_path: &str) -> bool {
        self.secure_paths().iter().any(|p| p == dotted_path)
    }

    /// Mark a path secure. Idempotent.
    pub fn add_secure(&mut self, dotted_path: &str) {
        self.retired_secure.retain(|p| p != dotted_path);
        if !self.is_secure(dotted_path) {
            self.properties.secure.push(dotted_path.to_string());
        }
    }

    /// Remove a path and everything below it.
    ///
    /// Secure entries at or below the path are dropped from the secure lists
    /// and their vault entries are deleted on the next save.
    pub fn remove(&mut self, dotted_path: &str) -> Result<Option<Value>> {
        let mut tree = self.tree()?;
        let removed = path::remove(&mut tree, dotted_path)?;
        self.replace_tree(tree)?;

        let retired = self
            .properties
            .retain_secure(|p| path::is_within(p, dotted_path));
        for entry in retired {
            if !self.retired_secure.contains(&entry) {
                self.retired_secure.push(entry);
            }
        }
        Ok(removed)
    }

    /// Secure paths waiting for their vault entries to be deleted.
    pub fn retired_secure(&self) -> &[String] {
        &self.retired_secure
    }

    /// Splice secure values from the vault into the tree.
    ///
    /// With `required`, any vault error or missing entry fails the load.
    /// Otherwise a failing entry is skipped and the rest are still spliced;
    /// the first such error is returned once the tree is updated. An
    /// unreachable vault stops the load right away.
    pub fn load_secure(&mut self, vault: &dyn SecureVault, required: bool) -> Result<()> {
        let secure = self.secure_paths();
        if secure.is_empty() {
            return Ok(());
        }

        let mut tree = self.tree()?;
        let mut first_error = None;
        for dotted in &secure {
            let account = secure_account(&self.path, dotted);
            let loaded = match vault.load(&account).map_err(Error::from) {
                Ok(loaded) => loaded,
                Err(err) if required || matches!(err, Error::VaultUnavailable(_)) => {
                    return Err(err);
                }
                Err(err) => {
                    warn!("Skipping secure value {}: {}", account, err);
                    first_error.get_or_insert(err);
                    continue;
                }
            };
            match loaded {
                Some(text) => {
                    let value =
                        serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text));
                    path::set(&mut tree, dotted, value)?;
                }
                None if required => return Err(Error::SecretNotFound(account)),
                None => debug!("No vault entry for {}", account),
            }
        }
        self.replace_tree(tree)?;
        first_error.map_or(Ok(()), Err)
    }

    /// Serialized file contents with secure values stripped.
    pub fn plaintext(&self) -> Result<String> {
        let (tree, _) = self.split_secure()?;
        let mut text = serde_json::to_string_pretty(&tree)?;
        text.push('\n');
        Ok(text)
    }

    fn split_secure(&self) -> Result<(Value, Vec<(String, Value)>)> {
        let mut tree = self.tree()?;
        let mut secrets = Vec::new();
        for dotted in self.secure_paths() {
            if let Some(value) = path::remove(&mut tree, &dotted)? {
                secrets.push((dotted, value));
            }
        }
        Ok((tree, secrets))
    }

    /// Write secure values to the vault, then the plaintext file.
    ///
    /// Fails with [`Error::VaultUnavailable`] before touching the file when
    /// secure values are present and no usable vault is given. The parent
    /// directory must already exist.
    pub fn save(&mut self, vault: Option<&dyn SecureVault>) -> Result<()> {
        let (tree, secrets) = self.split_secure()?;

        let usable_vault = match vault {
            Some(vault) => match vault.unavailable_reason() {
                Some(reason) => Err(reason),
                None => Ok(vault),
            },
            None => Err("no secure vault configured".to_string()),
        };

        match usable_vault {
            Ok(vault) => {
                for (dotted, value) in &secrets {
                    let account = secure_account(&self.path, dotted);
                    vault.save(&account, &serde_json::to_string(value)?)?;
                }
                for dotted in &self.retired_secure {
                    vault.delete(&secure_account(&self.path, dotted))?;
                }
                self.retired_secure.clear();
            }
            Err(reason) if !secrets.is_empty() => return Err(Error::VaultUnavailable(reason)),
            Err(reason) => {
                if !self.retired_secure.is_empty() {
                    warn!(
                        "Keeping {} stale vault entries for {}: {}",
                        self.retired_secure.len(),
                        self.path.display(),
                        reason
                    );
                }
            }
        }

        let mut text = serde_json::to_string_pretty(&tree)?;
        text.push('\n');
        write_atomically(&self.path, text.as_bytes())?;
        self.exists = true;
        debug!(
            "Saved layer {} ({} secure values)",
            self.path.display(),
            secrets.len()
        );
        Ok(())
    }
}

/// Replace `path` with `contents` via a temp file in the same directory.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
