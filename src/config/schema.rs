//! On-disk layout of a configuration layer.
//!
//! ```json
//! {
//!   "$schema": "./strata.schema.json",
//!   "profiles": {
//!     "lpar1": {
//!       "properties": { "host": "example.com" },
//!       "profiles": {
//!         "zosmf": { "type": "zosmf", "properties": { "port": 443 }, "secure": ["password"] }
//!       }
//!     }
//!   },
//!   "defaults": { "zosmf": "lpar1.zosmf" },
//!   "plugins": ["@acme/plugin"],
//!   "autoStore": true,
//!   "secure": ["profiles.lpar1.properties.user"]
//! }
//! ```
//!
//! `$schema` is declared first so it serializes as the first key. Keys this
//! module does not know about are kept in `extra` and survive a round trip.

use super::path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder shown in place of secure values when listing config.
pub const SECURE_VALUE_MASK: &str = "(secure value)";

/// Parsed contents of one config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigProperties {
    /// Schema URI, always serialized first.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Profile tree keyed by profile name.
    #[serde(default)]
    pub profiles: IndexMap<String, ProfileNode>,

    /// Default profile path per profile type.
    #[serde(default)]
    pub defaults: IndexMap<String, String>,

    /// Installed plugin package names.
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Whether prompted values should be stored automatically.
    #[serde(rename = "autoStore", default, skip_serializing_if = "Option::is_none")]
    pub auto_store: Option<bool>,

    /// Dotted paths (relative to this object) whose values live in the vault.
    #[serde(default)]
    pub secure: Vec<String>,

    /// Unrecognized top-level keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One node of the profile tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub profile_type: Option<String>,

    #[serde(default)]
    pub properties: Map<String, Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub profiles: IndexMap<String, ProfileNode>,

    /// Property names of this node that are secure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secure: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigProperties {
    /// The layout of a layer whose file does not exist yet.
    pub fn skeleton() -> Self {
        Self::default()
    }

    /// Every secure path of this layer as a full dotted path.
    ///
    /// Combines the top-level `secure` list with node-local lists, which name
    /// properties of their own node. Order is preserved and duplicates are
    /// dropped.
    pub fn secure_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for entry in &self.secure {
            if !paths.contains(entry) {
                paths.push(entry.clone());
            }
        }
        for (name, node) in &self.profiles {
            node.collect_secure(&format!("profiles.{}", name), &mut paths);
        }
        paths
    }

    /// Drop secure entries matching `remove`, returning the full paths dropped.
    pub fn retain_secure(&mut self, remove: impl Fn(&str) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        self.secure.retain(|entry| {
            if remove(entry) {
                removed.push(entry.clone());
                false
            } else {
                true
            }
        });
        for (name, node) in self.profiles.iter_mut() {
            node.retain_secure(&format!("profiles.{}", name), &remove, &mut removed);
        }
        removed
    }

    /// Merge layers given highest precedence first.
    ///
    /// - `profiles` deep-merge, the higher layer's leaves win
    /// - `defaults` merge shallowly, the higher layer's entries win
    /// - `plugins` is the ordered union, first occurrence kept
    /// - `$schema` and `secure` are layer-local and left empty
    pub fn merged<'a>(layers: impl IntoIterator<Item = &'a ConfigProperties>) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            for (name, node) in &layer.profiles {
                match merged.profiles.get_mut(name) {
                    Some(existing) => existing.absorb(node),
                    None => {
                        merged.profiles.insert(name.clone(), node.clone());
                    }
                }
            }
            for (profile_type, profile_path) in &layer.defaults {
                merged
                    .defaults
                    .entry(profile_type.clone())
                    .or_insert_with(|| profile_path.clone());
            }
            for plugin in &layer.plugins {
                if !merged.plugins.contains(plugin) {
                    merged.plugins.push(plugin.clone());
                }
            }
            if merged.auto_store.is_none() {
                merged.auto_store = layer.auto_store;
            }
            absorb_map(&mut merged.extra, &layer.extra);
        }
        merged
    }

    /// Find a profile node by dotted profile path (`lpar1.zosmf`).
    pub fn profile(&self, profile_path: &str) -> Option<&ProfileNode> {
        let mut names = profile_path.split('.');
        let mut node = self.profiles.get(names.next()?)?;
        for name in names {
            node = node.profiles.get(name)?;
        }
        Some(node)
    }

    /// Properties of a profile including those inherited from its parents.
    ///
    /// A child's value overrides the same property on any ancestor.
    pub fn profile_properties(&self, profile_path: &str) -> Option<Map<String, Value>> {
        self.profile(profile_path)?;
        let mut properties = Map::new();
        for ancestor in profile_chain(profile_path).iter().rev() {
            if let Some(node) = self.profile(ancestor) {
                for (key, value) in &node.properties {
                    properties.insert(key.clone(), value.clone());
                }
            }
        }
        Some(properties)
    }

    /// Replace every secure path in `tree` that holds a value with the mask.
    pub fn mask_paths(tree: &mut Value, secure_paths: &[String]) -> crate::Result<()> {
        for secure in secure_paths {
            if path::get(tree, secure).is_some() {
                path::set(tree, secure, Value::String(SECURE_VALUE_MASK.to_string()))?;
            }
        }
        Ok(())
    }
}

impl ProfileNode {
    fn collect_secure(&self, prefix: &str, paths: &mut Vec<String>) {
        for name in &self.secure {
            let full = format!("{}.properties.{}", prefix, name);
            if !paths.contains(&full) {
                paths.push(full);
            }
        }
        for (name, child) in &self.profiles {
            child.collect_secure(&format!("{}.profiles.{}", prefix, name), paths);
        }
    }

    fn retain_secure(
        &mut self,
        prefix: &str,
        remove: &impl Fn(&str) -> bool,
        removed: &mut Vec<String>,
    ) {
        self.secure.retain(|name| {
            let full = format!("{}.properties.{}", prefix, name);
            if remove(&full) {
                removed.push(full);
                false
            } else {
                true
            }
        });
        for (name, child) in self.profiles.iter_mut() {
            child.retain_secure(&format!("{}.profiles.{}", prefix, name), remove, removed);
        }
    }

    /// Fill in anything this node lacks from a lower-precedence node.
    fn absorb(&mut self, lower: &ProfileNode) {
        if self.profile_type.is_none() {
            self.profile_type = lower.profile_type.clone();
        }
        absorb_map(&mut self.properties, &lower.properties);
        for (name, node) in &lower.profiles {
            match self.profiles.get_mut(name) {
                Some(existing) => existing.absorb(node),
                None => {
                    self.profiles.insert(name.clone(), node.clone());
                }
            }
        }
        for name in &lower.secure {
            if !self.secure.contains(name) {
                self.secure.push(name.clone());
            }
        }
        absorb_map(&mut self.extra, &lower.extra);
    }
}

/// Deep-merge `lower` into `upper` without overwriting anything in `upper`.
fn absorb_map(upper: &mut Map<String, Value>, lower: &Map<String, Value>) {
    for (key, lower_value) in lower {
        match upper.get_mut(key) {
            Some(Value::Object(upper_object)) => {
                if let Value::Object(lower_object) = lower_value {
                    absorb_map(upper_object, lower_object);
                }
            }
            Some(_) => {}
            None => {
                upper.insert(key.clone(), lower_value.clone());
            }
        }
    }
}

/// JSON path of a profile node: `a.b` becomes `profiles.a.profiles.b`.
pub fn profile_json_path(profile_path: &str) -> String {
    profile_path
        .split('.')
        .map(|name| format!("profiles.{}", name))
        .collect::<Vec<_>>()
        .join(".")
}

/// A profile path followed by each of its ancestors: `a.b.c`, `a.b`, `a`.
pub fn profile_chain(profile_path: &str) -> Vec<String> {
    let names: Vec<&str> = profile_path.split('.').collect();
    (1..=names.len())
        .rev()
        .map(|len| names[..len].join("."))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> ConfigProperties {
        serde_json::from_value(value).unwrap()
    }

    // ==================== Serialization Tests ====================

    #[test]
    fn test_skeleton_serializes_empty_sections() {
        let json = serde_json::to_value(ConfigProperties::skeleton()).unwrap();
        assert_eq!(
            json,
            json!({"profiles": {}, "defaults": {}, "plugins": [], "secure": []})
        );
    }

    #[test]
    fn test_schema_serializes_first() {
        let mut props = parse(json!({"plugins": ["p"], "profiles": {}}));
        props.schema = Some("./strata.schema.json".to_string());
        let text = serde_json::to_string(&props).unwrap();
        assert!(text.starts_with(r#"{"$schema":"./strata.schema.json""#));
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let input = json!({
            "profiles": {"a": {"properties": {}, "note": "kept"}},
            "defaults": {},
            "plugins": [],
            "secure": [],
            "custom": {"x": 1}
        });
        let props = parse(input.clone());
        assert_eq!(props.extra.get("custom"), Some(&json!({"x": 1})));
        assert_eq!(serde_json::to_value(&props).unwrap(), input);
    }

    #[test]
    fn test_missing_sections_default() {
        let props = parse(json!({"profiles": {"a": {"type": "ssh"}}}));
        assert!(props.defaults.is_empty());
        assert!(props.plugins.is_empty());
        assert_eq!(props.profiles["a"].profile_type.as_deref(), Some("ssh"));
    }

    // ==================== Secure Path Tests ====================

    #[test]
    fn test_secure_paths_combine_top_level_and_node_lists() {
        let props = parse(json!({
            "profiles": {
                "a": {
                    "properties": {},
                    "secure": ["password"],
                    "profiles": {"b": {"properties": {}, "secure": ["token"]}}
                }
            },
            "secure": ["profiles.a.properties.user", "profiles.a.properties.password"]
        }));
        assert_eq!(
            props.secure_paths(),
            vec![
                "profiles.a.properties.user",
                "profiles.a.properties.password",
                "profiles.a.profiles.b.properties.token",
            ]
        );
    }

    #[test]
    fn test_retain_secure_reports_removed() {
        let mut props = parse(json!({
            "profiles": {"a": {"properties": {}, "secure": ["password"]}},
            "secure": ["profiles.a.properties.user", "profiles.b.properties.x"]
        }));
        let removed = props.retain_secure(|p| path::is_within(p, "profiles.a"));
        assert_eq!(
            removed,
            vec!["profiles.a.properties.user", "profiles.a.properties.password"]
        );
        assert_eq!(props.secure_paths(), vec!["profiles.b.properties.x"]);
    }

    // ==================== Merge Tests ====================

    #[test]
    fn test_merge_higher_precedence_leaf_wins() {
        let high = parse(json!({"profiles": {"a": {"properties": {"host": "high"}}}}));
        let low = parse(json!({
            "profiles": {"a": {"type": "ssh", "properties": {"host": "low", "port": 22}}}
        }));
        let merged = ConfigProperties::merged([&high, &low]);
        let node = &merged.profiles["a"];
        assert_eq!(node.properties["host"], json!("high"));
        assert_eq!(node.properties["port"], json!(22));
        assert_eq!(node.profile_type.as_deref(), Some("ssh"));
    }

    #[test]
    fn test_merge_nested_profiles() {
        let high = parse(json!({"profiles": {"a": {"profiles": {"x": {"properties": {"k": 1}}}}}}));
        let low = parse(json!({"profiles": {"a": {"profiles": {"y": {"properties": {"k": 2}}}}}}));
        let merged = ConfigProperties::merged([&high, &low]);
        assert!(merged.profile("a.x").is_some());
        assert!(merged.profile("a.y").is_some());
    }

    #[test]
    fn test_merge_defaults_plugins_and_layer_local_fields() {
        let mut high = parse(json!({
            "defaults": {"ssh": "a"},
            "plugins": ["one", "two"],
            "secure": ["profiles.a.properties.pw"]
        }));
        high.schema = Some("s.json".to_string());
        let low = parse(json!({
            "defaults": {"ssh": "b", "zosmf": "z"},
            "plugins": ["two", "three"],
            "autoStore": false
        }));
        let merged = ConfigProperties::merged([&high, &low]);
        assert_eq!(merged.defaults["ssh"], "a");
        assert_eq!(merged.defaults["zosmf"], "z");
        assert_eq!(merged.plugins, vec!["one", "two", "three"]);
        assert_eq!(merged.auto_store, Some(false));
        assert_eq!(merged.schema, None);
        assert!(merged.secure.is_empty());
    }

    // ==================== Profile Tests ====================

    #[test]
    fn test_profile_properties_inherit_from_parents() {
        let props = parse(json!({
            "profiles": {
                "lpar": {
                    "properties": {"host": "h", "port": 1},
                    "profiles": {"zosmf": {"properties": {"port": 443}}}
                }
            }
        }));
        let resolved = props.profile_properties("lpar.zosmf").unwrap();
        assert_eq!(resolved["host"], json!("h"));
        assert_eq!(resolved["port"], json!(443));
        assert!(props.profile_properties("lpar.missing").is_none());
    }

    #[test]
    fn test_profile_paths() {
        assert_eq!(profile_json_path("a.b"), "profiles.a.profiles.b");
        assert_eq!(profile_chain("a.b.c"), vec!["a.b.c", "a.b", "a"]);
    }

    #[test]
    fn test_mask_paths() {
        let mut tree = json!({"profiles": {"a": {"properties": {"pw": "x", "host": "h"}}}});
        ConfigProperties::mask_paths(
            &mut tree,
            &[
                "profiles.a.properties.pw".to_string(),
                "profiles.a.properties.absent".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(tree["profiles"]["a"]["properties"]["pw"], json!(SECURE_VALUE_MASK));
        assert_eq!(tree["profiles"]["a"]["properties"]["host"], json!("h"));
        assert!(tree["profiles"]["a"]["properties"].get("absent").is_none());
    }
}
