//! Provisioned configuration model.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Kind of configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigModel {
    Standalone,
    Domain,
    Host,
}

impl ConfigModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Domain => "domain",
            Self::Host => "host",
        }
    }
}

impl fmt::Display for ConfigModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a loaded feature spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecId(String);

impl SpecId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a feature: its spec plus the values of its id parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureId {
    pub spec: SpecId,
    pub params: BTreeMap<String, Value>,
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec)?;
        let mut sep = ':';
        for (name, value) in &self.params {
            match value {
                Value::String(s) => write!(f, "{}{}={}", sep, name, s)?,
                other => write!(f, "{}{}={}", sep, name, other)?,
            }
            sep = ',';
        }
        Ok(())
    }
}

/// Declarative equivalent of one management resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFeature {
    pub spec: SpecId,
    /// Present only when the spec declares id parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FeatureId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

/// Features of one rendered configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedConfig {
    pub model: ConfigModel,
    pub name: String,
    #[serde(default)]
    pub features: Vec<ResolvedFeature>,
}

impl ProvisionedConfig {
    pub fn new(model: ConfigModel, name: impl Into<String>) -> Self {
        Self {
            model,
            name: name.into(),
            features: Vec::new(),
        }
    }

    /// Whether `other` describes the same (model, name) configuration.
    pub fn same_identity(&self, other: &ProvisionedConfig) -> bool {
        self.model == other.model && self.name == other.name
    }

    /// Number of features per spec.
    pub fn feature_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for feature in &self.features {
            *counts.entry(feature.spec.name()).or_insert(0) += 1;
        }
        counts
    }
}

/// Previously provisioned configurations, the diff baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedState {
    #[serde(default)]
    pub configs: Vec<ProvisionedConfig>,
}

impl ProvisionedState {
    /// Load a baseline from JSON. A missing file is an empty baseline.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&content).map_err(|source| Error::Decode {
            what: "baseline",
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the baseline as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|source| Error::Decode {
            what: "baseline",
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(|e| Error::io(path, e))
    }

    /// Config with this (model, name) identity.
    pub fn find(&self, model: ConfigModel, name: &str) -> Option<&ProvisionedConfig> {
        self.configs.iter().find(|c| c.model == model && c.name == name)
    }

    /// Replace the config with the same identity, or append it.
    pub fn upsert(&mut self, config: ProvisionedConfig) {
        match self.configs.iter_mut().find(|c| c.same_identity(&config)) {
            Some(existing) => *existing = config,
            None => self.configs.push(config),
        }
    }
}

/// Read configurations classified against a baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDiff {
    pub added: Vec<ProvisionedConfig>,
    pub updated: Vec<ProvisionedConfig>,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty()
    }
}
