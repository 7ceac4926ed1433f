//! Feature specs known to the diff engine.
//!
//! A feature-pack layout stores one `spec.json` per feature spec:
//!
//! ```json
//! { "name": "subsystem.logging.console-handler",
//!   "params": [
//!     { "name": "subsystem", "feature-id": true, "default": "logging" },
//!     { "name": "console-handler", "feature-id": true },
//!     { "name": "level", "nillable": true } ],
//!   "annotations": { "jboss-op": "add" } }
//! ```
//!
//! When `name` is absent the directory holding the file names the spec.

use crate::error::{Error, Result};
use crate::types::SpecId;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// File name of a serialized feature spec.
pub const SPEC_FILE: &str = "spec.json";

/// A declared parameter of a feature spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SpecParam {
    pub name: String,
    /// Part of the feature identity (an address segment).
    #[serde(default)]
    pub feature_id: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub nillable: bool,
}

impl SpecParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feature_id: false,
            default: None,
            nillable: false,
        }
    }

    pub fn id(name: impl Into<String>) -> Self {
        Self {
            feature_id: true,
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Schema of one kind of manageable resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: Vec<SpecParam>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, params: Vec<SpecParam>) -> Self {
        Self {
            name: name.into(),
            params,
            annotations: BTreeMap::new(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&SpecParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Parameters that form the feature identity, in declaration order.
    pub fn id_params(&self) -> impl Iterator<Item = &SpecParam> {
        self.params.iter().filter(|p| p.feature_id)
    }
}

/// Lookup of feature specs by name.
pub trait SpecRegistry {
    /// Resolve a spec name to a loaded spec.
    fn resolve(&self, name: &str) -> Option<SpecId>;

    /// The spec behind a resolved id.
    fn spec(&self, id: &SpecId) -> Option<&FeatureSpec>;
}

/// Registry backed by specs loaded from disk or built in memory.
#[derive(Debug, Default)]
pub struct LocalSpecRegistry {
    specs: BTreeMap<String, FeatureSpec>,
}

impl LocalSpecRegistry {
    /// Build a registry from specs; the first spec with a given name wins.
    pub fn from_specs(specs: impl IntoIterator<Item = FeatureSpec>) -> Self {
        let mut registry = Self::default();
        for spec in specs {
            registry.insert(spec, None);
        }
        registry
    }

    /// Load every `spec.json` under `layout`.
    ///
    /// Directories are visited in file-name order, so the winner among
    /// duplicates is stable.
    pub fn load(layout: &Path) -> Result<Self> {
        if !layout.is_dir() {
            return Err(Error::io(
                layout,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let mut registry = Self::default();
        for entry in WalkDir::new(layout).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(layout).to_path_buf();
                Error::io(path, e.into())
            })?;
            if !entry.file_type().is_file() || entry.file_name() != SPEC_FILE {
                continue;
            }
            let path = entry.path();
            let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
            let mut spec: FeatureSpec =
                serde_json::from_str(&content).map_err(|source| Error::Decode {
                    what: "feature spec",
                    path: path.to_path_buf(),
                    source,
                })?;
            if spec.name.is_empty() {
                spec.name = path
                    .parent()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
            }
            registry.insert(spec, Some(path));
        }
        debug!("Loaded {} feature spec(s) from {}", registry.len(), layout.display());
        Ok(registry)
    }

    fn insert(&mut self, spec: FeatureSpec, origin: Option<&Path>) {
        if self.specs.contains_key(&spec.name) {
            match origin {
                Some(path) => warn!(
                    "Ignoring duplicate feature spec '{}' from {}",
                    spec.name,
                    path.display()
                ),
                None => warn!("Ignoring duplicate feature spec '{}'", spec.name),
            }
            return;
        }
        self.specs.insert(spec.name.clone(), spec);
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}

impl SpecRegistry for LocalSpecRegistry {
    fn resolve(&self, name: &str) -> Option<SpecId> {
        self.specs.get(name).map(|s| SpecId::new(s.name.clone()))
    }

    fn spec(&self, id: &SpecId) -> Option<&FeatureSpec> {
        self.specs.get(id.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_spec(root: &Path, dir: &str, content: &str) {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(SPEC_FILE), content).unwrap();
    }

    #[test]
    fn test_load_layout() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(
            dir.path(),
            "fp-a/features/subsystem.logging",
            r#"{"params": [{"name": "subsystem", "feature-id": true, "default": "logging"}]}"#,
        );
        write_spec(
            dir.path(),
            "fp-a/features/path",
            r#"{"name": "path", "params": [{"name": "path", "feature-id": true}, {"name": "relative-to", "nillable": true}]}"#,
        );
        fs::write(dir.path().join("fp-a/README.txt"), "ignored").unwrap();

        let registry = LocalSpecRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        let id = registry.resolve("subsystem.logging").unwrap();
        let spec = registry.spec(&id).unwrap();
        assert_eq!(spec.param("subsystem").unwrap().default, Some(json!("logging")));
        assert!(registry.spec(&registry.resolve("path").unwrap()).unwrap().param("relative-to").unwrap().nillable);
        assert!(registry.resolve("subsystem.ee").is_none());
    }

    #[test]
    fn test_first_duplicate_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(dir.path(), "a/path", r#"{"params": [{"name": "first"}]}"#);
        write_spec(dir.path(), "b/path", r#"{"params": [{"name": "second"}]}"#);
        let registry = LocalSpecRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
        let spec = registry.spec(&SpecId::new("path")).unwrap();
        assert_eq!(spec.params[0].name, "first");
    }

    #[test]
    fn test_bad_spec_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(dir.path(), "broken", "{ not json");
        let err = LocalSpecRegistry::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Decode { what: "feature spec", .. }));
    }

    #[test]
    fn test_missing_layout() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalSpecRegistry::load(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_in_memory_registry() {
        let registry = LocalSpecRegistry::from_specs([
            FeatureSpec::new("subsystem.ee", vec![SpecParam::id("subsystem").with_default("ee")]),
            FeatureSpec::new("subsystem.ee", Vec::new()),
        ]);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["subsystem.ee"]);
        let spec = registry.spec(&SpecId::new("subsystem.ee")).unwrap();
        assert_eq!(spec.id_params().count(), 1);
    }
}
