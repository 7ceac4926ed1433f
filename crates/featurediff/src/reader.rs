//! Read a configuration file back as features.

use crate::error::{Error, Result};
use crate::registry::SpecRegistry;
use crate::resolve::resolve_features;
use crate::sniff::sniff_model;
use crate::types::{ConfigModel, ProvisionedConfig};
use dmr::{Address, ModelNode, Operation};
use embedded::kind::{ADMIN_ONLY, DOMAIN_CONFIG, HOST_CONFIG, SERVER_CONFIG};
use embedded::error::report;
use embedded::{EmbeddedExecutor, EmbeddedSession, ManagementBridge, ProcessKind};
use log::{debug, info, warn};
use std::fs;
use std::path::Path;

/// Operation returning the configuration as a list of feature nodes.
pub const READ_CONFIG_AS_FEATURES: &str = "read-config-as-features";
/// Operation listing child resource names.
pub const READ_CHILDREN_NAMES: &str = "read-children-names";

const SERVER_CONFIG_DIR: &str = "jboss.server.config.dir";
const DOMAIN_CONFIG_DIR: &str = "jboss.domain.config.dir";

/// Startup arguments that boot `file` of `model` in admin-only mode.
pub fn startup_args(model: ConfigModel, file: &Path) -> Vec<String> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = file
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let (flag, dir_property) = match model {
        ConfigModel::Standalone => (SERVER_CONFIG, SERVER_CONFIG_DIR),
        ConfigModel::Domain => (DOMAIN_CONFIG, DOMAIN_CONFIG_DIR),
        ConfigModel::Host => (HOST_CONFIG, DOMAIN_CONFIG_DIR),
    };
    vec![
        ADMIN_ONLY.to_string(),
        flag.to_string(),
        name,
        format!("-D{}={}", dir_property, dir),
    ]
}

fn process_kind(model: ConfigModel) -> ProcessKind {
    match model {
        ConfigModel::Standalone => ProcessKind::Standalone,
        ConfigModel::Domain | ConfigModel::Host => ProcessKind::HostController,
    }
}

/// Boots configurations in an embedded process and reads them as features.
///
/// Each [`read`](ConfigReader::read) owns the process from start to stop;
/// the process is stopped whatever the outcome.
pub struct ConfigReader<'r, B: ManagementBridge> {
    session: EmbeddedSession<B>,
    registry: &'r dyn SpecRegistry,
    extra_args: Vec<String>,
}

impl<'r, B: ManagementBridge> ConfigReader<'r, B> {
    pub fn new(session: EmbeddedSession<B>, registry: &'r dyn SpecRegistry) -> Self {
        Self {
            session,
            registry,
            extra_args: Vec::new(),
        }
    }

    /// Arguments appended to every startup, e.g. system properties.
    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn read(&mut self, config_file: &Path) -> Result<ProvisionedConfig> {
        let file = fs::canonicalize(config_file).map_err(|e| Error::io(config_file, e))?;
        let model = sniff_model(&file)?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Reading {} config {}", model, name);

        let mut args = startup_args(model, &file);
        args.extend(self.extra_args.iter().cloned());
        self.session.start(process_kind(model), args)?;

        let outcome = self.read_features(model);
        let stopped = self.session.stop_embedded();
        let nodes = match (outcome, stopped) {
            (Ok(nodes), Ok(())) => nodes,
            (Ok(_), Err(stop_err)) => return Err(stop_err.into()),
            (Err(e), Ok(())) => return Err(e),
            (Err(e), Err(stop_err)) => {
                warn!("Failed to stop after read error: {}", report(&stop_err));
                return Err(e);
            }
        };

        let features = resolve_features(self.registry, &nodes)?;
        debug!("{} resolved {} feature(s)", name, features.len());
        Ok(ProvisionedConfig {
            model,
            name,
            features,
        })
    }

    fn read_features(&mut self, model: ConfigModel) -> Result<Vec<ModelNode>> {
        let address = match model {
            ConfigModel::Standalone => Address::root(),
            ConfigModel::Domain => {
                // The domain model is read at the root. The host lookup only
                // makes a host controller that reports no host fatal.
                let host = self.host_name()?;
                debug!("Domain config read through host controller '{}'", host);
                Address::root()
            }
            ConfigModel::Host => Address::root().child("host", self.host_name()?),
        };
        let op = Operation::new(READ_CONFIG_AS_FEATURES, address).param("nested", false);
        match self.session.execute(&op)? {
            ModelNode::Array(nodes) => Ok(nodes),
            other => Err(Error::malformed(
                None,
                format!("{} returned {} instead of a list", op, other),
            )),
        }
    }

    fn host_name(&mut self) -> Result<String> {
        let op = Operation::new(READ_CHILDREN_NAMES, Address::root()).param("child-type", "host");
        let result = self
            .session
            .execute(&op)
            .map_err(|e| Error::HostName(e.to_string()))?;
        result
            .as_array()
            .and_then(|names| names.first())
            .and_then(ModelNode::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::HostName(format!("no host in {}", result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FeatureSpec, LocalSpecRegistry, SpecParam};
    use embedded::bridge::{BridgeCall, MockBridge};
    use serde_json::json;
    use std::path::PathBuf;

    fn registry() -> LocalSpecRegistry {
        LocalSpecRegistry::from_specs([
            FeatureSpec::new("subsystem.ee", vec![SpecParam::id("subsystem").with_default("ee")]),
            FeatureSpec::new("path", vec![SpecParam::id("path"), SpecParam::new("relative-to")]),
            FeatureSpec::new("host.interface", vec![SpecParam::id("host"), SpecParam::id("interface")]),
        ])
    }

    fn write(dir: &Path, name: &str, root: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("<?xml version=\"1.0\"?>\n<{} xmlns=\"urn:jboss:domain:20.0\"/>\n", root)).unwrap();
        path
    }

    #[test]
    fn test_startup_args() {
        let args = startup_args(ConfigModel::Host, Path::new("/opt/server/domain/configuration/host.xml"));
        assert_eq!(
            args,
            vec![
                "--admin-only",
                "--host-config",
                "host.xml",
                "-Djboss.domain.config.dir=/opt/server/domain/configuration",
            ]
        );
    }

    #[test]
    fn test_read_standalone() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "standalone-custom.xml", "server");
        let mock = MockBridge::new();
        mock.respond(
            READ_CONFIG_AS_FEATURES,
            json!([
                {"spec": "subsystem.ee", "id": {"subsystem": "ee"}},
                {"spec": "path", "id": {"path": "jboss.server.log.dir"}},
                {"spec": "path", "id": {"path": "app.dir"}, "params": {"relative-to": null}}
            ]),
        );
        let registry = registry();
        let mut reader = ConfigReader::new(EmbeddedSession::new(mock.clone()), &registry)
            .with_extra_args(vec!["-Dx=y".to_string()]);

        let config = reader.read(&file).unwrap();
        assert_eq!(config.model, ConfigModel::Standalone);
        assert_eq!(config.name, "standalone-custom.xml");
        assert_eq!(config.features.len(), 2);
        assert!(config.features[1].params.get("relative-to").is_none());
        assert!(!mock.is_running());

        match &mock.calls()[0] {
            BridgeCall::CreateStandalone(args) => {
                assert!(args.contains(&"standalone-custom.xml".to_string()));
                assert_eq!(args.last().map(String::as_str), Some("-Dx=y"));
            }
            other => panic!("unexpected call: {other:?}"),
        }
        let executed = mock.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0]["operation"], json!(READ_CONFIG_AS_FEATURES));
        assert_eq!(executed[0]["nested"], json!(false));
        assert_eq!(executed[0]["address"], json!([]));
    }

    #[test]
    fn test_read_host_uses_host_address() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "host-primary.xml", "host");
        let mock = MockBridge::new();
        mock.respond(READ_CHILDREN_NAMES, json!(["primary"]));
        mock.respond(
            READ_CONFIG_AS_FEATURES,
            json!([{"spec": "host.interface", "id": {"host": "primary", "interface": "public"}}]),
        );
        let registry = registry();
        let mut reader = ConfigReader::new(EmbeddedSession::new(mock.clone()), &registry);

        let config = reader.read(&file).unwrap();
        assert_eq!(config.model, ConfigModel::Host);
        assert_eq!(config.features.len(), 1);
        assert!(matches!(mock.calls()[0], BridgeCall::CreateHostController(_)));
        let executed = mock.executed();
        assert_eq!(executed[0]["child-type"], json!("host"));
        assert_eq!(executed[1]["address"], json!([{"host": "primary"}]));
    }

    #[test]
    fn test_read_domain_checks_host_then_reads_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "domain.xml", "domain");
        let mock = MockBridge::new();
        mock.respond(READ_CHILDREN_NAMES, json!(["primary"]));
        mock.respond(
            READ_CONFIG_AS_FEATURES,
            json!([{"spec": "subsystem.ee", "id": {"subsystem": "ee"}}]),
        );
        let registry = registry();
        let mut reader = ConfigReader::new(EmbeddedSession::new(mock.clone()), &registry);

        let config = reader.read(&file).unwrap();
        assert_eq!(config.model, ConfigModel::Domain);
        let executed = mock.executed();
        assert_eq!(executed[0]["child-type"], json!("host"));
        assert_eq!(executed[1]["operation"], json!(READ_CONFIG_AS_FEATURES));
        assert_eq!(executed[1]["address"], json!([]));
    }

    #[test]
    fn test_host_name_failure_is_fatal_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "domain.xml", "domain");
        let mock = MockBridge::new();
        mock.fail_operation(READ_CHILDREN_NAMES, "WFLYCTL0216: Management resource not found");
        let registry = registry();
        let mut reader = ConfigReader::new(EmbeddedSession::new(mock.clone()), &registry);

        let err = reader.read(&file).unwrap_err();
        assert!(matches!(err, Error::HostName(_)));
        assert!(err.to_string().contains("WFLYCTL0216"));
        assert!(!mock.is_running());
    }

    #[test]
    fn test_no_host_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "host.xml", "host");
        let mock = MockBridge::new();
        mock.respond(READ_CHILDREN_NAMES, json!([]));
        let registry = registry();
        let mut reader = ConfigReader::new(EmbeddedSession::new(mock), &registry);
        assert!(matches!(reader.read(&file), Err(Error::HostName(_))));
    }

    #[test]
    fn test_unknown_spec_still_stops() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "standalone.xml", "server");
        let mock = MockBridge::new();
        mock.respond(READ_CONFIG_AS_FEATURES, json!([{"spec": "subsystem.unknown"}]));
        let registry = registry();
        let mut reader = ConfigReader::new(EmbeddedSession::new(mock.clone()), &registry);
        assert!(matches!(reader.read(&file), Err(Error::SpecNotFound { .. })));
        assert!(!mock.is_running());
    }

    #[test]
    fn test_non_list_response() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "standalone.xml", "server");
        let mock = MockBridge::new();
        mock.respond(READ_CONFIG_AS_FEATURES, json!({"spec": "x"}));
        let registry = registry();
        let mut reader = ConfigReader::new(EmbeddedSession::new(mock), &registry);
        assert!(matches!(reader.read(&file), Err(Error::MalformedFeature { .. })));
    }

    #[test]
    fn test_unknown_model() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "module.xml", "module");
        let mock = MockBridge::new();
        let registry = registry();
        let mut reader = ConfigReader::new(EmbeddedSession::new(mock.clone()), &registry);
        assert!(matches!(reader.read(&file), Err(Error::UnknownModel { .. })));
        assert!(mock.calls().is_empty());
    }
}
