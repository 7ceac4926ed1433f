//! Project configuration (`fpack.toml`) and system-properties files.

use anyhow::{Context, Result, bail};
use embedded::script::ARG_SEPARATOR;
use embedded::{Credentials, ManagementConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::ServerArgs;

/// Project config looked up in the current directory.
pub const CONFIG_FILE: &str = "fpack.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub installation: InstallationConfig,

    #[serde(default)]
    pub management: ManagementSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InstallationConfig {
    /// Server installation root; `~` is expanded
    pub home: Option<String>,

    /// Absent waits forever, 0 does not wait
    pub boot_timeout_secs: Option<u64>,

    /// Run embedded work in a forked child
    #[serde(default)]
    pub forked: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManagementSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Management user for servers that require authentication
    pub username: Option<String>,

    pub password: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9990
}

fn default_request_timeout() -> u64 {
    60
}

fn default_shutdown_timeout() -> u64 {
    10
}

impl Default for ManagementSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            username: None,
            password: None,
        }
    }
}

impl ManagementSection {
    pub fn to_bridge_config(&self) -> Result<ManagementConfig> {
        let credentials = match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            (None, None) => None,
            _ => bail!("[management] needs both username and password, or neither"),
        };
        Ok(ManagementConfig {
            host: self.host.clone(),
            port: self.port,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            credentials,
        })
    }
}

impl ProjectConfig {
    /// Load `explicit`, or `./fpack.toml` when present, or defaults.
    ///
    /// Returns the config and the file it came from.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => {
                let path = PathBuf::from(CONFIG_FILE);
                if !path.exists() {
                    return Ok((Self::default(), None));
                }
                path
            }
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded project config from {}", path.display());
        Ok((config, Some(path)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML format")
    }
}

/// Settings for one embedded-server command, after CLI overrides.
#[derive(Debug)]
pub struct ServerSettings {
    pub home: PathBuf,
    pub boot_timeout: Option<Duration>,
    pub management: ManagementConfig,
    /// `-Dkey=value` arguments from properties files
    pub properties: Vec<String>,
}

impl ServerSettings {
    pub fn resolve(config: &ProjectConfig, args: &ServerArgs) -> Result<Self> {
        let home = match (&args.home, &config.installation.home) {
            (Some(home), _) => expand_path(&home.to_string_lossy()),
            (None, Some(home)) => expand_path(home),
            (None, None) => bail!(
                "No server installation given; pass --home or set [installation] home in {}",
                CONFIG_FILE
            ),
        };

        let properties = collect_properties(&args.properties)?;

        Ok(Self {
            home,
            boot_timeout: args
                .boot_timeout
                .or(config.installation.boot_timeout_secs)
                .map(Duration::from_secs),
            management: config.management.to_bridge_config()?,
            properties,
        })
    }
}

/// Expand `~` in a configured path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Startup arguments from every properties file, in order.
pub fn collect_properties(files: &[PathBuf]) -> Result<Vec<String>> {
    let mut properties = Vec::new();
    for file in files {
        properties.extend(load_properties(file)?);
    }
    Ok(properties)
}

/// Read a properties file as `-Dkey=value` startup arguments.
pub fn load_properties(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read properties file: {}", path.display()))?;
    Ok(parse_properties(&content)
        .into_iter()
        .map(|(key, value)| format!("-D{}={}", key, value))
        .collect())
}

/// Check that properties survive the script line that carries startup
/// arguments to a forked child (and into dry-run output).
///
/// Arguments on that line are separated by `,`, so no value may contain one.
pub fn ensure_forkable(properties: &[String]) -> Result<()> {
    if let Some(arg) = properties.iter().find(|p| p.contains(ARG_SEPARATOR)) {
        let name = arg
            .strip_prefix("-D")
            .and_then(|p| p.split_once('='))
            .map_or(arg.as_str(), |(name, _)| name);
        bail!(
            "Property '{}' contains '{}', which forked and dry-run generation cannot pass to the server; \
             generate in-process or remove the '{}' from its value",
            name,
            ARG_SEPARATOR,
            ARG_SEPARATOR
        );
    }
    Ok(())
}

/// Parse `key=value` (or `key: value`) lines; `#` and `!` start comments.
pub fn parse_properties(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| match line.find(['=', ':']) {
            Some(i) => (line[..i].trim().to_string(), line[i + 1..].trim().to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}
