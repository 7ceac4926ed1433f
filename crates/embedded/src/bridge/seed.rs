//! Seed configurations for empty-config boots.
//!
//! A server booted with `--internal-empty-config` (or a host controller with
//! `--empty-domain-config` / `--empty-host-config`) has no management
//! interface, so nothing could reach it over HTTP. The bridge drops those
//! flags and instead writes a seed file holding only an unsecured HTTP
//! management interface, which the generated configuration then grows from.

use crate::error::{Error, Result};
use crate::kind::{
    DEFAULT_DOMAIN_CONFIG, DEFAULT_HOST_CONFIG, DEFAULT_SERVER_CONFIG, DOMAIN_CONFIG,
    EMPTY_DOMAIN_CONFIG, EMPTY_HOST_CONFIG, HOST_CONFIG, INTERNAL_EMPTY_CONFIG, ProcessKind,
    SERVER_CONFIG, SERVER_CONFIG_SHORT, flag_value, has_flag, property,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Namespace used when the installation documents none.
pub const DEFAULT_NAMESPACE: &str = "urn:jboss:domain:20.0";
/// Name given to the host in a seeded host configuration.
pub const SEED_HOST_NAME: &str = "primary";

const EMPTY_FLAGS: [&str; 3] = [INTERNAL_EMPTY_CONFIG, EMPTY_DOMAIN_CONFIG, EMPTY_HOST_CONFIG];

/// A configuration file written before launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub path: PathBuf,
    pub contents: String,
}

impl Seed {
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(&self.path, &self.contents).map_err(|e| Error::io(&self.path, e))
    }
}

/// Newest `wildfly-config_<major>_<minor>.xsd` under `docs/schema`, as a namespace.
pub fn detect_namespace(home: &Path) -> String {
    let Ok(entries) = fs::read_dir(home.join("docs").join("schema")) else {
        return DEFAULT_NAMESPACE.to_string();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| schema_version(&entry.file_name().to_string_lossy()))
        .max()
        .map_or_else(
            || DEFAULT_NAMESPACE.to_string(),
            |(major, minor)| format!("urn:jboss:domain:{}.{}", major, minor),
        )
}

fn schema_version(file_name: &str) -> Option<(u32, u32)> {
    let version = file_name.strip_prefix("wildfly-config_")?.strip_suffix(".xsd")?;
    let (major, minor) = version.split_once('_')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Replace empty-config flags in `args` with seed files.
///
/// Returns the launch arguments and the seeds to write before launching.
pub fn plan(home: &Path, namespace: &str, kind: ProcessKind, args: &[String]) -> (Vec<String>, Vec<Seed>) {
    let mut seeds = Vec::new();
    match kind {
        ProcessKind::Standalone => {
            if has_flag(args, INTERNAL_EMPTY_CONFIG) {
                let name = flag_value(args, SERVER_CONFIG)
                    .or_else(|| flag_value(args, SERVER_CONFIG_SHORT))
                    .unwrap_or(DEFAULT_SERVER_CONFIG);
                let dir = config_dir(home, args, "jboss.server.config.dir", "standalone");
                seeds.push(Seed {
                    path: dir.join(name),
                    contents: standalone_seed(namespace),
                });
            }
        }
        ProcessKind::HostController => {
            let dir = config_dir(home, args, "jboss.domain.config.dir", "domain");
            if has_flag(args, EMPTY_DOMAIN_CONFIG) {
                let name = flag_value(args, DOMAIN_CONFIG).unwrap_or(DEFAULT_DOMAIN_CONFIG);
                seeds.push(Seed {
                    path: dir.join(name),
                    contents: format!(
                        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<domain xmlns=\"{}\"/>\n",
                        namespace
                    ),
                });
            }
            if has_flag(args, EMPTY_HOST_CONFIG) {
                let name = flag_value(args, HOST_CONFIG).unwrap_or(DEFAULT_HOST_CONFIG);
                seeds.push(Seed {
                    path: dir.join(name),
                    contents: host_seed(namespace),
                });
            }
        }
    }

    let args = args
        .iter()
        .filter(|a| !EMPTY_FLAGS.contains(&a.as_str()))
        .cloned()
        .collect();
    (args, seeds)
}

fn config_dir(home: &Path, args: &[String], dir_property: &str, base: &str) -> PathBuf {
    property(args, dir_property).map_or_else(
        || home.join(base).join("configuration"),
        |dir| home.join(dir),
    )
}

fn standalone_seed(namespace: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<server xmlns="{namespace}">
    <management>
        <management-interfaces>
            <http-interface>
                <socket-binding http="management-http"/>
            </http-interface>
        </management-interfaces>
    </management>
    <interfaces>
        <interface name="management">
            <inet-address value="${{jboss.bind.address.management:127.0.0.1}}"/>
        </interface>
    </interfaces>
    <socket-binding-group name="standard-sockets" default-interface="management">
        <socket-binding name="management-http" interface="management" port="${{jboss.management.http.port:9990}}"/>
    </socket-binding-group>
</server>
"#
    )
}

fn host_seed(namespace: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<host xmlns="{namespace}" name="{SEED_HOST_NAME}">
    <management>
        <management-interfaces>
            <http-interface>
                <socket interface="management" port="${{jboss.management.http.port:9990}}"/>
            </http-interface>
        </management-interfaces>
    </management>
    <domain-controller>
        <local/>
    </domain-controller>
    <interfaces>
        <interface name="management">
            <inet-address value="${{jboss.bind.address.management:127.0.0.1}}"/>
        </interface>
    </interfaces>
</host>
"#
    )
}
