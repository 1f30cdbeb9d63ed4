//! Provenance of resolved profile properties.
//!
//! ## Lookup order (highest to lowest)
//!
//! 1. `<APP>_OPT_<PROPERTY>` environment variable
//! 2. Team config layers, in layer precedence order, for the profile itself
//!    and then each parent profile
//! 3. A caller-supplied default ([`ResolvedProperty::with_default`])
//!
//! Every resolved value carries a [`ProfLoc`] so write-back knows whether the
//! value may be persisted and where. Environment and default values are never
//! written back in place.

use super::locator::env_prefix;
use super::manager::Config;
use super::path;
use super::schema::{profile_chain, profile_json_path};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Kind of location a value was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfLocType {
    /// Pre-layered profile file (read-only here)
    OldProfile,
    /// One of the layered config files
    TeamConfig,
    /// Environment variable
    Env,
    /// Built-in or caller-supplied default
    Default,
}

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfLoc {
    #[serde(rename = "locType")]
    pub loc_type: ProfLocType,
    /// File path (old profile, team config) or variable name (env)
    #[serde(rename = "osLoc", skip_serializing_if = "Option::is_none")]
    pub os_loc: Option<String>,
    /// Dotted path inside the owning layer (team config only)
    #[serde(rename = "jsonLoc", skip_serializing_if = "Option::is_none")]
    pub json_loc: Option<String>,
}

impl ProfLoc {
    pub fn team_config(layer_path: &Path, json_loc: impl Into<String>) -> Self {
        Self {
            loc_type: ProfLocType::TeamConfig,
            os_loc: Some(layer_path.display().to_string()),
            json_loc: Some(json_loc.into()),
        }
    }

    pub fn env(var_name: impl Into<String>) -> Self {
        Self {
            loc_type: ProfLocType::Env,
            os_loc: Some(var_name.into()),
            json_loc: None,
        }
    }

    pub fn old_profile(profile_file: &Path) -> Self {
        Self {
            loc_type: ProfLocType::OldProfile,
            os_loc: Some(profile_file.display().to_string()),
            json_loc: None,
        }
    }

    pub fn default_value() -> Self {
        Self {
            loc_type: ProfLocType::Default,
            os_loc: None,
            json_loc: None,
        }
    }

    /// Only team config locations can receive a write.
    pub fn is_writable(&self) -> bool {
        self.loc_type == ProfLocType::TeamConfig
    }
}

impl std::fmt::Display for ProfLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let os_loc = self.os_loc.as_deref().unwrap_or("");
        match self.loc_type {
            ProfLocType::TeamConfig => match &self.json_loc {
                Some(json_loc) => write!(f, "{}:{}", os_loc, json_loc),
                None => write!(f, "{}", os_loc),
            },
            ProfLocType::Env => write!(f, "env:{}", os_loc),
            ProfLocType::OldProfile => write!(f, "old-profile:{}", os_loc),
            ProfLocType::Default => write!(f, "default"),
        }
    }
}

/// A property value with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedProperty {
    pub name: String,
    pub value: Value,
    pub loc: ProfLoc,
    /// Whether the owning layer lists the property as secure
    pub secure: bool,
}

impl ResolvedProperty {
    /// A value that no layer or variable supplied.
    pub fn with_default(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            loc: ProfLoc::default_value(),
            secure: false,
        }
    }
}

/// `<APP>_OPT_<PROPERTY>`, with camelCase and `-` split into `_`.
pub fn env_var_name(app_name: &str, property: &str) -> String {
    let mut name = String::new();
    let mut previous_lower = false;
    for c in property.chars() {
        if c.is_ascii_uppercase() && previous_lower {
            name.push('_');
        }
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_uppercase());
        } else {
            name.push('_');
        }
        previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
    }
    format!("{}_OPT_{}", env_prefix(app_name), name)
}

/// JSON path of a property on a profile node.
pub fn property_json_path(profile_path: &str, name: &str) -> String {
    format!("{}.properties.{}", profile_json_path(profile_path), name)
}

impl Config {
    /// Resolve a profile property against the process environment and layers.
    pub fn locate_property(&self, profile_path: &str, name: &str) -> Result<Option<ResolvedProperty>> {
        self.locate_property_with_env(profile_path, name, |var| std::env::var(var).ok())
    }

    /// Resolve a profile property with an injected environment lookup.
    pub fn locate_property_with_env(
        &self,
        profile_path: &str,
        name: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<ResolvedProperty>> {
        path::segments(profile_path)?;
        path::segments(name)?;

        let var_name = env_var_name(&self.app_name, name);
        if let Some(raw) = env(&var_name) {
            debug!("Property {} resolved from {}", name, var_name);
            return Ok(Some(ResolvedProperty {
                name: name.to_string(),
                value: path::coerce(Value::String(raw)),
                loc: ProfLoc::env(var_name),
                secure: false,
            }));
        }

        for profile in profile_chain(profile_path) {
            let json_loc = property_json_path(&profile, name);
            for layer in &self.layers {
                if let Some(value) = layer.get(&json_loc)? {
                    return Ok(Some(ResolvedProperty {
                        name: name.to_string(),
                        value,
                        secure: layer.is_secure(&json_loc),
                        loc: ProfLoc::team_config(&layer.path, json_loc),
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Persist a value at a known team config location.
    ///
    /// The value stays secure if its path is secure in that layer. Other
    /// location kinds fail with [`Error::NotWritable`].
    pub fn update_known_property(&mut self, loc: &ProfLoc, value: impl Into<Value>) -> Result<()> {
        if !loc.is_writable() {
            return Err(Error::NotWritable(format!(
                "cannot write a value whose location is {}",
                loc
            )));
        }
        let (Some(os_loc), Some(json_loc)) = (&loc.os_loc, &loc.json_loc) else {
            return Err(Error::InvalidInput(format!("incomplete location {}", loc)));
        };
        let index = self
            .layers
            .iter()
            .position(|layer| Path::new(os_loc) == layer.path)
            .ok_or_else(|| Error::InvalidInput(format!("{} is not a layer of this config", os_loc)))?;

        let secure = self.layers[index].is_secure(json_loc);
        self.write_in_layer(index, json_loc, value.into(), secure)
    }

    /// Persist a profile property wherever it belongs.
    ///
    /// A value that came from a layer is updated in place. Anything else is
    /// written to the active layer. Returns the location written.
    pub fn update_property(
        &mut self,
        profile_path: &str,
        name: &str,
        value: impl Into<Value>,
        secure: bool,
    ) -> Result<ProfLoc> {
        let value = value.into();
        let existing = self.locate_property(profile_path, name)?;

        if let Some(resolved) = existing.filter(|r| r.loc.is_writable()) {
            self.update_known_property(&resolved.loc, value)?;
            if secure {
                self.mark_secure_at(&resolved.loc)?;
            }
            return Ok(resolved.loc);
        }

        let json_loc = property_json_path(profile_path, name);
        self.write_in_layer(self.active, &json_loc, value, secure)?;
        Ok(ProfLoc::team_config(&self.layers[self.active].path, json_loc))
    }

    fn mark_secure_at(&mut self, loc: &ProfLoc) -> Result<()> {
        let (Some(os_loc), Some(json_loc)) = (&loc.os_loc, &loc.json_loc) else {
            return Ok(());
        };
        if let Some(layer) = self
            .layers
            .iter_mut()
            .find(|layer| Path::new(os_loc) == layer.path)
        {
            layer.add_secure(json_loc);
        }
        Ok(())
    }
}
