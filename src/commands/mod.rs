//! Command implementations for the Strata CLI.
//!
//! Each command takes a loaded [`Config`], performs one operation and returns
//! a result that renders as JSON (default) or human-readable text. Commands
//! that change a layer save it before returning.

use crate::config::{Config, ConfigLayer, LoadOptions, ResolvedProperty, SECURE_VALUE_MASK, SetOptions};
use crate::vault::{CredentialAdapter, FileVault, SecureVault};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// Which layer a mutating command targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Target {
    pub user: bool,
    pub global: bool,
}

impl Target {
    pub fn new(user: bool, global: bool) -> Self {
        Self { user, global }
    }
}

/// Build the vault and load the config for `app_name`.
///
/// With `vault_file` set, secrets go to that file instead of the OS keyring.
/// Any vault already set on `options` is replaced.
pub fn open(
    app_name: &str,
    vault_file: Option<&Path>,
    legacy_services: &[String],
    options: LoadOptions,
) -> Result<Config> {
    let vault: Arc<dyn SecureVault> = match vault_file {
        Some(path) => {
            let mut vault = FileVault::new(path);
            vault.initialize();
            Arc::new(vault)
        }
        None => {
            let mut vault = CredentialAdapter::new(app_name)
                .with_fallback_services(legacy_services.iter().cloned());
            vault.initialize();
            Arc::new(vault)
        }
    };
    debug!("Opening config for {}", app_name);
    Config::load_with_options(app_name, options.with_vault(vault))
}

fn active_for(config: &mut Config, target: Target) -> PathBuf {
    config.activate(target.user, target.global);
    config.active_layer().path.clone()
}

// === get ===

#[derive(Serialize)]
pub struct GetResult {
    pub path: String,
    pub value: Option<Value>,
}

impl Output for GetResult {
    fn to_json(&self) -> String {
        pretty(self)
    }

    fn to_human(&self) -> String {
        match &self.value {
            Some(Value::String(s)) => s.clone(),
            Some(value) => pretty(value),
            None => format!("{} is not set", self.path),
        }
    }
}

pub fn get(config: &Config, path: &str) -> Result<GetResult> {
    Ok(GetResult {
        path: path.to_string(),
        value: config.get(path)?,
    })
}

// === set / unset / secure ===

#[derive(Serialize)]
pub struct SetResult {
    pub path: String,
    pub layer: PathBuf,
    pub secure: bool,
}

impl Output for SetResult {
    fn to_json(&self) -> String {
        pretty(self)
    }

    fn to_human(&self) -> String {
        let kind = if self.secure { "secure property" } else { "property" };
        format!("Set {} {} in {}", kind, self.path, self.layer.display())
    }
}

/// Parse `raw` as JSON when `json` is set, otherwise pass it on as a string.
pub fn parse_value(raw: &str, json: bool) -> Result<Value> {
    if json {
        serde_json::from_str(raw)
            .map_err(|e| Error::InvalidInput(format!("value is not valid JSON: {}", e)))
    } else {
        Ok(Value::String(raw.to_string()))
    }
}

pub fn set(
    config: &mut Config,
    path: &str,
    value: Value,
    secure: bool,
    target: Target,
) -> Result<SetResult> {
    let layer = active_for(config, target);
    config.set(path, value, SetOptions { secure })?;
    config.save(false)?;
    Ok(SetResult {
        path: path.to_string(),
        layer,
        secure: config.active_layer().is_secure(path),
    })
}

#[derive(Serialize)]
pub struct UnsetResult {
    pub path: String,
    pub layer: PathBuf,
    pub removed: bool,
}

impl Output for UnsetResult {
    fn to_json(&self) -> String {
        pretty(self)
    }

    fn to_human(&self) -> String {
        if self.removed {
            format!("Removed {} from {}", self.path, self.layer.display())
        } else {
            format!("{} was not set in {}", self.path, self.layer.display())
        }
    }
}

pub fn unset(config: &mut Config, path: &str, target: Target) -> Result<UnsetResult> {
    let layer = active_for(config, target);
    let removed = config.delete(path)?;
    if removed {
        config.save(false)?;
    }
    Ok(UnsetResult {
        path: path.to_string(),
        layer,
        removed,
    })
}

pub fn secure(config: &mut Config, path: &str, target: Target) -> Result<SetResult> {
    let layer = active_for(config, target);
    config.add_secure(path)?;
    config.save(false)?;
    Ok(SetResult {
        path: path.to_string(),
        layer,
        secure: true,
    })
}

// === list ===

#[derive(Serialize)]
pub struct ListResult {
    pub properties: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure_load_error: Option<String>,
}

impl Output for ListResult {
    fn to_json(&self) -> String {
        pretty(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        flatten(&self.properties, "", &mut lines);
        if let Some(err) = &self.secure_load_error {
            lines.push(format!("warning: secure values not loaded: {}", err));
        }
        lines.join("\n")
    }
}

fn flatten(value: &Value, prefix: &str, lines: &mut Vec<String>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(child, &path, lines);
            }
        }
        _ if prefix.is_empty() => {}
        other => lines.push(format!("{} = {}", prefix, other)),
    }
}

pub fn list(config: &Config, show_secure: bool) -> Result<ListResult> {
    let properties = if show_secure {
        serde_json::to_value(config.properties())?
    } else {
        config.mask_secure()?
    };
    Ok(ListResult {
        properties,
        secure_load_error: config.secure_load_error().map(str::to_string),
    })
}

// === layers ===

#[derive(Serialize)]
pub struct LayerInfo {
    pub path: PathBuf,
    pub user: bool,
    pub global: bool,
    pub exists: bool,
    pub active: bool,
    pub secure_paths: Vec<String>,
}

impl LayerInfo {
    fn from_layer(layer: &ConfigLayer, active: bool) -> Self {
        Self {
            path: layer.path.clone(),
            user: layer.user,
            global: layer.global,
            exists: layer.exists,
            active,
            secure_paths: layer.secure_paths(),
        }
    }

    fn label(&self) -> &'static str {
        match (self.global, self.user) {
            (false, true) => "project-user",
            (false, false) => "project",
            (true, true) => "global-user",
            (true, false) => "global",
        }
    }
}

#[derive(Serialize)]
pub struct LayersResult {
    pub layers: Vec<LayerInfo>,
}

impl Output for LayersResult {
    fn to_json(&self) -> String {
        pretty(self)
    }

    fn to_human(&self) -> String {
        self.layers
            .iter()
            .map(|info| {
                format!(
                    "{} {:<12} {}{}",
                    if info.active { "*" } else { " " },
                    info.label(),
                    info.path.display(),
                    if info.exists { "" } else { " (missing)" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn layers(config: &Config) -> LayersResult {
    let active = config.active_index();
    LayersResult {
        layers: config
            .layers()
            .iter()
            .enumerate()
            .map(|(index, layer)| LayerInfo::from_layer(layer, index == active))
            .collect(),
    }
}

// === schema ===

#[derive(Serialize)]
pub struct SchemaResult {
    pub uri: String,
    pub layer: PathBuf,
    pub schema_written: bool,
}

impl Output for SchemaResult {
    fn to_json(&self) -> String {
        pretty(self)
    }

    fn to_human(&self) -> String {
        format!("Set $schema of {} to {}", self.layer.display(), self.uri)
    }
}

pub fn schema(
    config: &mut Config,
    uri: &str,
    schema_file: Option<&Path>,
    target: Target,
) -> Result<SchemaResult> {
    let layer = active_for(config, target);
    let document = match schema_file {
        Some(file) => {
            let text = fs::read_to_string(file)?;
            Some(serde_json::from_str::<Value>(&text).map_err(|source| {
                Error::MalformedConfig {
                    path: file.to_path_buf(),
                    source,
                }
            })?)
        }
        None => None,
    };
    config.set_schema(uri, document.as_ref())?;
    config.save(false)?;
    Ok(SchemaResult {
        uri: uri.to_string(),
        layer,
        schema_written: document.is_some(),
    })
}

// === profile ===

#[derive(Serialize)]
pub struct ProfileResult {
    pub profile: String,
    pub properties: Vec<ResolvedProperty>,
}

impl Output for ProfileResult {
    fn to_json(&self) -> String {
        pretty(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Profile {}", self.profile)];
        for property in &self.properties {
            lines.push(format!(
                "  {} = {}  ({})",
                property.name, property.value, property.loc
            ));
        }
        lines.join("\n")
    }
}

/// Properties of a profile with the location each value resolved from.
///
/// Secure values are masked.
pub fn profile(config: &Config, profile_path: &str) -> Result<ProfileResult> {
    let names = config
        .profile_properties(profile_path)
        .ok_or_else(|| Error::InvalidInput(format!("profile {} not found", profile_path)))?;

    let mut properties = Vec::new();
    for name in names.keys() {
        if let Some(mut resolved) = config.locate_property(profile_path, name)? {
            if resolved.secure {
                resolved.value = Value::String(SECURE_VALUE_MASK.to_string());
            }
            properties.push(resolved);
        }
    }
    Ok(ProfileResult {
        profile: profile_path.to_string(),
        properties,
    })
}

// === default ===

#[derive(Serialize)]
pub struct DefaultResult {
    pub profile_type: String,
    pub profile: Option<String>,
}

impl Output for DefaultResult {
    fn to_json(&self) -> String {
        pretty(self)
    }

    fn to_human(&self) -> String {
        match &self.profile {
            Some(profile) => format!("{}: {}", self.profile_type, profile),
            None => format!("No default {} profile", self.profile_type),
        }
    }
}

pub fn default_get(config: &Config, profile_type: &str) -> DefaultResult {
    DefaultResult {
        profile_type: profile_type.to_string(),
        profile: config.default_profile(profile_type),
    }
}

pub fn default_set(
    config: &mut Config,
    profile_type: &str,
    profile_path: &str,
    target: Target,
) -> Result<DefaultResult> {
    active_for(config, target);
    config.set_default(profile_type, profile_path);
    config.save(false)?;
    Ok(DefaultResult {
        profile_type: profile_type.to_string(),
        profile: Some(profile_path.to_string()),
    })
}
