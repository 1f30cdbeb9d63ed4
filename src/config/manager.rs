//! The layered configuration of one application.
//!
//! ## Layers (highest precedence first)
//!
//! 0. project-user: `<project>/<app>.config.user.json`
//! 1. project: `<project>/<app>.config.json`
//! 2. global-user: `<home>/<app>.config.user.json`
//! 3. global: `<home>/<app>.config.json`
//!
//! Reads resolve against the merged view of all four layers. Mutations
//! (`set`, `add_secure`, `delete`, `set_schema`, `set_default`) target the
//! single active layer, project-user unless [`Config::activate`] says
//! otherwise. Mutation is not synchronized; callers serialize it.

use super::layer::{ConfigLayer, write_atomically};
use super::locator::{LayerLocator, LayerPaths};
use super::path;
use super::schema::ConfigProperties;
use crate::vault::SecureVault;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Inputs for [`Config::load_with_options`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Directory to start the project search from (default: process cwd)
    pub cwd: Option<PathBuf>,
    /// Global anchor (default: `<APP>_CLI_HOME`, then the user's home)
    pub home: Option<PathBuf>,
    /// Vault for secure properties, already initialized
    pub vault: Option<Arc<dyn SecureVault>>,
    /// Fail the load when a secure value cannot be read
    pub require_secure: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_vault(mut self, vault: Arc<dyn SecureVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn require_secure(mut self) -> Self {
        self.require_secure = true;
        self
    }
}

/// Options for [`Config::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Also mark the path secure so the next save moves it to the vault
    pub secure: bool,
}

impl SetOptions {
    pub fn secure() -> Self {
        Self { secure: true }
    }
}

/// Ordered layers plus the active-layer selection.
#[derive(Debug, Clone)]
pub struct Config {
    pub(super) app_name: String,
    pub(super) layers: Vec<ConfigLayer>,
    pub(super) active: usize,
    pub(super) vault: Option<Arc<dyn SecureVault>>,
    pub(super) secure_load_error: Option<String>,
}

impl Config {
    /// Load using the process working directory and home, without a vault.
    pub fn load(app_name: &str) -> Result<Self> {
        Self::load_with_options(app_name, LoadOptions::default())
    }

    /// Locate, load and secure-load every layer.
    pub fn load_with_options(app_name: &str, options: LoadOptions) -> Result<Self> {
        let mut locator = LayerLocator::new(app_name);
        if let Some(cwd) = &options.cwd {
            locator = locator.with_cwd(cwd);
        }
        if let Some(home) = &options.home {
            locator = locator.with_home(home);
        }
        let paths = locator.locate()?;
        let layers = load_layers(&paths)?;

        let mut config = Self {
            app_name: app_name.to_string(),
            layers,
            active: 0,
            vault: options.vault,
            secure_load_error: None,
        };
        config.load_secure(options.require_secure)?;
        Ok(config)
    }

    fn load_secure(&mut self, required: bool) -> Result<()> {
        if !self.secure_fields() {
            return Ok(());
        }

        let Some(vault) = self.vault.clone() else {
            let reason = "no secure vault configured".to_string();
            if required {
                return Err(Error::VaultUnavailable(reason));
            }
            warn!("Secure properties present but {}", reason);
            self.secure_load_error = Some(reason);
            return Ok(());
        };

        for layer in self.layers.iter_mut().filter(|l| l.exists) {
            if let Err(err) = layer.load_secure(vault.as_ref(), required) {
                if required {
                    return Err(err);
                }
                warn!(
                    "Could not load secure values for {}: {}",
                    layer.path.display(),
                    err
                );
                self.secure_load_error = Some(err.to_string());
                if matches!(err, Error::VaultUnavailable(_)) {
                    break;
                }
            }
        }
        Ok(())
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// True iff any layer file exists on disk.
    pub fn exists(&self) -> bool {
        self.layers.iter().any(|layer| layer.exists)
    }

    /// Deep copy of every layer, highest precedence first.
    ///
    /// Changes to the returned layers never affect this config.
    pub fn layers(&self) -> Vec<ConfigLayer> {
        self.layers.clone()
    }

    pub fn layer_paths(&self) -> Vec<PathBuf> {
        self.layers.iter().map(|layer| layer.path.clone()).collect()
    }

    /// Select the layer targeted by mutations.
    pub fn activate(&mut self, user: bool, global: bool) {
        self.active = usize::from(global) * 2 + usize::from(!user);
        debug!("Active layer: {}", self.layers[self.active].path.display());
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_layer(&self) -> &ConfigLayer {
        &self.layers[self.active]
    }

    /// Why secure values were not loaded, if they were not.
    pub fn secure_load_error(&self) -> Option<&str> {
        self.secure_load_error.as_deref()
    }

    pub fn vault(&self) -> Option<&Arc<dyn SecureVault>> {
        self.vault.as_ref()
    }

    /// Merged read view, computed fresh on every call.
    pub fn properties(&self) -> ConfigProperties {
        ConfigProperties::merged(self.layers.iter().map(|layer| &layer.properties))
    }

    /// Value at a dotted path in the merged view.
    pub fn get(&self, dotted_path: &str) -> Result<Option<Value>> {
        path::segments(dotted_path)?;
        let tree = serde_json::to_value(self.properties())?;
        Ok(path::get(&tree, dotted_path).cloned())
    }

    /// Write a value into the active layer.
    ///
    /// Strings are coerced (`"true"`, `"false"`, integers) unless the slot
    /// only takes strings. If the active layer already holds an array at the
    /// path, a non-array value is appended to it; an array value always
    /// replaces.
    pub fn set(&mut self, dotted_path: &str, value: impl Into<Value>, options: SetOptions) -> Result<()> {
        self.set_in_layer(self.active, dotted_path, value.into(), options)
    }

    pub(super) fn set_in_layer(
        &mut self,
        index: usize,
        dotted_path: &str,
        value: Value,
        options: SetOptions,
    ) -> Result<()> {
        let coerced = path::coerce(value.clone());
        if coerced == value {
            return self.merge_in_layer(index, dotted_path, value, options.secure);
        }
        match self.merge_in_layer(index, dotted_path, coerced, options.secure) {
            // string-only slots such as `$schema`, `defaults` and profile types
            Err(Error::InvalidInput(reason)) => {
                debug!("Storing {} uncoerced: {}", dotted_path, reason);
                self.merge_in_layer(index, dotted_path, value, options.secure)
            }
            result => result,
        }
    }

    /// Append to an existing array or replace, keeping secure lists unique.
    fn merge_in_layer(
        &mut self,
        index: usize,
        dotted_path: &str,
        value: Value,
        secure: bool,
    ) -> Result<()> {
        if dotted_path == "secure"
            && let Value::String(secure_path) = &value
        {
            path::segments(secure_path)?;
            self.layers[index].add_secure(secure_path);
            return Ok(());
        }

        let current = self.layers[index].get(dotted_path)?;
        let mut next = match current {
            Some(Value::Array(mut items)) if !value.is_array() => {
                items.push(value);
                Value::Array(items)
            }
            _ => value,
        };
        if is_secure_list(dotted_path)
            && let Value::Array(items) = &mut next
        {
            let mut seen = Vec::with_capacity(items.len());
            items.retain(|item| {
                if seen.contains(item) {
                    false
                } else {
                    seen.push(item.clone());
                    true
                }
            });
        }
        self.write_in_layer(index, dotted_path, next, secure)
    }

    /// Write exactly `value` at a path, without coercion or appending.
    pub(super) fn write_in_layer(
        &mut self,
        index: usize,
        dotted_path: &str,
        value: Value,
        secure: bool,
    ) -> Result<()> {
        let layer = &mut self.layers[index];
        let mut tree = layer.tree()?;
        path::set(&mut tree, dotted_path, value)?;
        layer.replace_tree(tree)?;
        if secure {
            layer.add_secure(dotted_path);
        }
        Ok(())
    }

    /// Mark a path secure in the active layer without touching its value.
    pub fn add_secure(&mut self, dotted_path: &str) -> Result<()> {
        path::segments(dotted_path)?;
        self.layers[self.active].add_secure(dotted_path);
        Ok(())
    }

    /// Remove a path from the active layer. Returns whether anything was there.
    pub fn delete(&mut self, dotted_path: &str) -> Result<bool> {
        Ok(self.layers[self.active].remove(dotted_path)?.is_some())
    }

    /// True iff any layer lists a secure path.
    pub fn secure_fields(&self) -> bool {
        self.layers
            .iter()
            .any(|layer| !layer.secure_paths().is_empty())
    }

    /// Stamp `$schema` on the active layer, optionally writing the schema file.
    ///
    /// Relative paths resolve against the active layer's directory. Only
    /// local paths (plain or `file://`) can receive a schema document.
    pub fn set_schema(&mut self, uri: &str, schema: Option<&Value>) -> Result<()> {
        if let Some(schema) = schema {
            let target = schema_file_path(&self.layers[self.active].path, uri)?;
            let mut text = serde_json::to_string_pretty(schema)?;
            text.push('\n');
            write_atomically(&target, text.as_bytes())?;
            debug!("Wrote schema to {}", target.display());
        }
        self.layers[self.active].properties.schema = Some(uri.to_string());
        Ok(())
    }

    /// Merged view with every secure value replaced by a mask.
    pub fn mask_secure(&self) -> Result<Value> {
        let mut tree = serde_json::to_value(self.properties())?;
        let mut secure = Vec::new();
        for layer in &self.layers {
            for entry in layer.secure_paths() {
                if !secure.contains(&entry) {
                    secure.push(entry);
                }
            }
        }
        ConfigProperties::mask_paths(&mut tree, &secure)?;
        Ok(tree)
    }

    /// Properties of a profile in the merged view, parents included.
    pub fn profile_properties(&self, profile_path: &str) -> Option<Map<String, Value>> {
        self.properties().profile_properties(profile_path)
    }

    pub fn profile_exists(&self, profile_path: &str) -> bool {
        self.properties().profile(profile_path).is_some()
    }

    /// Default profile path for a profile type.
    pub fn default_profile(&self, profile_type: &str) -> Option<String> {
        self.properties().defaults.get(profile_type).cloned()
    }

    /// Set the default profile for a type in the active layer.
    pub fn set_default(&mut self, profile_type: &str, profile_path: &str) {
        self.layers[self.active]
            .properties
            .defaults
            .insert(profile_type.to_string(), profile_path.to_string());
    }

    /// Persist the active layer, or with `all_layers` also every layer on disk.
    pub fn save(&mut self, all_layers: bool) -> Result<()> {
        let vault = self.vault.clone();
        for (index, layer) in self.layers.iter_mut().enumerate() {
            if index == self.active || (all_layers && layer.exists) {
                layer.save(vault.as_deref())?;
            }
        }
        Ok(())
    }
}

/// Load the four layers concurrently. A missing file never blocks the others.
fn load_layers(paths: &LayerPaths) -> Result<Vec<ConfigLayer>> {
    let ordered = paths.ordered();
    let results: Vec<Result<ConfigLayer>> = thread::scope(|scope| {
        let handles: Vec<_> = ordered
            .iter()
            .map(|&(path, user, global)| scope.spawn(move || ConfigLayer::load(path, user, global)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(Error::Other("layer load panicked".to_string())))
            })
            .collect()
    });
    results.into_iter().collect()
}

fn schema_file_path(layer_path: &Path, uri: &str) -> Result<PathBuf> {
    let local = match uri.strip_prefix("file://") {
        Some(local) => local,
        None if uri.contains("://") => {
            return Err(Error::InvalidInput(format!(
                "cannot write a schema file to remote URI {}",
                uri
            )));
        }
        None => uri,
    };
    let local = Path::new(local);
    if local.is_absolute() {
        return Ok(local.to_path_buf());
    }
    let dir = layer_path.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(local))
}

/// Whether a path names the top-level `secure` list or a profile's own.
fn is_secure_list(dotted_path: &str) -> bool {
    let parts: Vec<&str> = dotted_path.split('.').collect();
    match parts.as_slice() {
        ["secure"] => true,
        ["profiles", .., parent, "secure"] => *parent != "properties",
        _ => false,
    }
}
