//! Added-versus-updated classification against a baseline.

use crate::types::{ConfigDiff, ProvisionedConfig, ProvisionedState};
use log::debug;

/// Split `configs` by whether the baseline already has their (model, name).
pub fn classify(baseline: &ProvisionedState, configs: impl IntoIterator<Item = ProvisionedConfig>) -> ConfigDiff {
    let mut diff = ConfigDiff::default();
    for config in configs {
        if baseline.find(config.model, &config.name).is_some() {
            debug!("{} config {} is updated", config.model, config.name);
            diff.updated.push(config);
        } else {
            debug!("{} config {} is added", config.model, config.name);
            diff.added.push(config);
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConfigModel;

    #[test]
    fn test_classify() {
        let baseline = ProvisionedState {
            configs: vec![ProvisionedConfig::new(ConfigModel::Standalone, "standalone.xml")],
        };
        let diff = classify(
            &baseline,
            [
                ProvisionedConfig::new(ConfigModel::Standalone, "standalone.xml"),
                ProvisionedConfig::new(ConfigModel::Standalone, "standalone-ha.xml"),
                ProvisionedConfig::new(ConfigModel::Domain, "standalone.xml"),
            ],
        );
        assert_eq!(diff.updated.len(), 1);
        assert_eq!(diff.updated[0].name, "standalone.xml");
        assert_eq!(diff.added.len(), 2);
        assert!(diff.added.iter().any(|c| c.model == ConfigModel::Domain));
    }

    #[test]
    fn test_empty_baseline_adds_everything() {
        let diff = classify(
            &ProvisionedState::default(),
            [ProvisionedConfig::new(ConfigModel::Host, "host.xml")],
        );
        assert_eq!(diff.added.len(), 1);
        assert!(diff.updated.is_empty());
        assert!(!diff.is_empty());
    }
}
