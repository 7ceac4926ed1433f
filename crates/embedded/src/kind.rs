//! Embedded process kinds and startup-argument inspection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Startup flag naming the standalone configuration file.
pub const SERVER_CONFIG: &str = "--server-config";
/// Short form of [`SERVER_CONFIG`].
pub const SERVER_CONFIG_SHORT: &str = "-c";
/// Startup flag that boots a standalone server from an empty configuration.
pub const INTERNAL_EMPTY_CONFIG: &str = "--internal-empty-config";
/// Startup flag naming the domain configuration file.
pub const DOMAIN_CONFIG: &str = "--domain-config";
/// Startup flag naming the host configuration file.
pub const HOST_CONFIG: &str = "--host-config";
/// Startup flag that boots a host controller with an empty domain configuration.
pub const EMPTY_DOMAIN_CONFIG: &str = "--empty-domain-config";
/// Startup flag that boots a host controller with an empty host configuration.
pub const EMPTY_HOST_CONFIG: &str = "--empty-host-config";
/// Startup flag for admin-only mode.
pub const ADMIN_ONLY: &str = "--admin-only";

/// Standalone configuration used when no file is named.
pub const DEFAULT_SERVER_CONFIG: &str = "standalone.xml";
/// Domain configuration used when no file is named.
pub const DEFAULT_DOMAIN_CONFIG: &str = "domain.xml";
/// Host configuration used when no file is named.
pub const DEFAULT_HOST_CONFIG: &str = "host.xml";

/// Kind of embedded process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessKind {
    /// A standalone server.
    #[serde(rename = "standalone")]
    Standalone,
    /// A host controller (domain mode).
    #[serde(rename = "host")]
    HostController,
}

impl ProcessKind {
    /// Token used for this kind in forked-process scripts.
    #[must_use]
    pub fn script_token(&self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::HostController => "host",
        }
    }

    /// Parse a script token.
    #[must_use]
    pub fn from_script_token(token: &str) -> Option<Self> {
        match token {
            "standalone" => Some(Self::Standalone),
            "host" => Some(Self::HostController),
            _ => None,
        }
    }

    /// Attribute reporting the process state.
    #[must_use]
    pub fn state_attribute(&self) -> &'static str {
        match self {
            Self::Standalone => "server-state",
            Self::HostController => "host-state",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone => write!(f, "server"),
            Self::HostController => write!(f, "host controller"),
        }
    }
}

/// Value of a startup flag, given as `--flag value` or `--flag=value`.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            return iter.next().map(String::as_str);
        }
        if let Some(value) = arg.strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')) {
            return Some(value);
        }
    }
    None
}

/// Value of a `-Dname=value` system property argument.
pub fn property<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter().find_map(|arg| {
        arg.strip_prefix("-D")
            .and_then(|rest| rest.strip_prefix(name))
            .and_then(|rest| rest.strip_prefix('='))
    })
}

/// Whether a bare flag is present.
pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Describe what a process started with `args` is producing.
///
/// Used only to enrich failure messages: `generate <file>` when the process
/// builds a configuration from an empty one, `execute script` otherwise.
pub fn generation_context(kind: ProcessKind, args: &[String]) -> String {
    match kind {
        ProcessKind::Standalone => {
            if has_flag(args, INTERNAL_EMPTY_CONFIG) {
                let name = flag_value(args, SERVER_CONFIG)
                    .or_else(|| flag_value(args, SERVER_CONFIG_SHORT))
                    .unwrap_or(DEFAULT_SERVER_CONFIG);
                format!("generate {}", name)
            } else {
                "execute script".to_string()
            }
        }
        ProcessKind::HostController => {
            let mut generated = Vec::new();
            if has_flag(args, EMPTY_DOMAIN_CONFIG) {
                generated.push(flag_value(args, DOMAIN_CONFIG).unwrap_or(DEFAULT_DOMAIN_CONFIG));
            }
            if has_flag(args, EMPTY_HOST_CONFIG) {
                generated.push(flag_value(args, HOST_CONFIG).unwrap_or(DEFAULT_HOST_CONFIG));
            }
            if generated.is_empty() {
                "execute script".to_string()
            } else {
                format!("generate {}", generated.join(" and "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_script_tokens() {
        for kind in [ProcessKind::Standalone, ProcessKind::HostController] {
            assert_eq!(ProcessKind::from_script_token(kind.script_token()), Some(kind));
        }
        assert_eq!(ProcessKind::from_script_token("domain"), None);
    }

    #[test]
    fn test_flag_value_forms() {
        let a = args(&["--server-config", "foo.xml"]);
        assert_eq!(flag_value(&a, SERVER_CONFIG), Some("foo.xml"));
        let a = args(&["--server-config=bar.xml"]);
        assert_eq!(flag_value(&a, SERVER_CONFIG), Some("bar.xml"));
        let a = args(&["--server-config"]);
        assert_eq!(flag_value(&a, SERVER_CONFIG), None);
        let a = args(&["--server-configuration=x"]);
        assert_eq!(flag_value(&a, SERVER_CONFIG), None);
    }

    #[test]
    fn test_property() {
        let a = args(&["-Djboss.server.config.dir=/tmp/cfg", "-Djboss.server=x"]);
        assert_eq!(property(&a, "jboss.server.config.dir"), Some("/tmp/cfg"));
        assert_eq!(property(&a, "jboss.server"), Some("x"));
        assert_eq!(property(&a, "jboss.domain.config.dir"), None);
    }

    #[test]
    fn test_standalone_context() {
        let a = args(&["--server-config", "foo.xml", "--internal-empty-config"]);
        assert_eq!(generation_context(ProcessKind::Standalone, &a), "generate foo.xml");

        let a = args(&["--server-config", "foo.xml"]);
        assert_eq!(generation_context(ProcessKind::Standalone, &a), "execute script");

        let a = args(&["--internal-empty-config"]);
        assert_eq!(generation_context(ProcessKind::Standalone, &a), "generate standalone.xml");
    }

    #[test]
    fn test_host_controller_context() {
        let a = args(&[
            "--empty-domain-config",
            "--domain-config",
            "domain-ha.xml",
            "--empty-host-config",
            "--host-config=host-primary.xml",
        ]);
        assert_eq!(
            generation_context(ProcessKind::HostController, &a),
            "generate domain-ha.xml and host-primary.xml"
        );

        let a = args(&["--empty-domain-config"]);
        assert_eq!(generation_context(ProcessKind::HostController, &a), "generate domain.xml");

        let a = args(&["--empty-host-config"]);
        assert_eq!(generation_context(ProcessKind::HostController, &a), "generate host.xml");

        let a = args(&["--domain-config", "domain.xml"]);
        assert_eq!(generation_context(ProcessKind::HostController, &a), "execute script");
    }

    #[test]
    fn test_serde_names() {
        let kind: ProcessKind = serde_json::from_str("\"host\"").unwrap();
        assert_eq!(kind, ProcessKind::HostController);
        assert_eq!(serde_json::to_string(&ProcessKind::Standalone).unwrap(), "\"standalone\"");
    }
}
