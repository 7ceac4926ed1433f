//! Production bridge: launch scripts plus the HTTP management endpoint.
//!
//! Processes are started from `bin/standalone.sh` or `bin/domain.sh` in
//! admin-only mode. The management client posts JSON-encoded operations to
//! `http://<host>:<port>/management`, answering Digest challenges when
//! credentials are configured. Empty-config boots are replaced by a seed
//! configuration (see [`super::seed`]) so the interface exists at all.
//!
//! The launch script runs the JVM in the background and records its pid in
//! `JBOSS_PIDFILE`; stopping kills that pid too, then waits for the
//! management port to close.

use crate::bridge::digest::{Challenge, DigestAuth};
use crate::bridge::seed::{self, Seed};
use crate::bridge::{ManagementBridge, STOPPED};
use crate::error::{Error, Result, report};
use crate::kind::{ADMIN_ONLY, ProcessKind};
use dmr::{Address, ModelNode, Operation, response};
use std::fmt;
use std::fs;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use ureq::Body;
use ureq::http::{Response, StatusCode};

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);
const PID_FILE: &str = "server.pid";

/// Path of the HTTP management endpoint.
pub const MANAGEMENT_PATH: &str = "/management";

/// A management user, as created with `add-user.sh`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Connection settings for the management endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementConfig {
    /// Bind address of the management interface.
    pub host: String,
    /// HTTP management port.
    pub port: u16,
    /// Timeout applied to every management request.
    pub request_timeout: Duration,
    /// How long to wait for a graceful shutdown before killing the process.
    pub shutdown_timeout: Duration,
    /// Answer Digest challenges with this user.
    pub credentials: Option<Credentials>,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9990,
            request_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(10),
            credentials: None,
        }
    }
}

impl ManagementConfig {
    /// URL of the management endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, MANAGEMENT_PATH)
    }
}

/// Bridge to a server installation on the local filesystem.
pub struct HttpBridge {
    home: PathBuf,
    standalone_script: PathBuf,
    domain_script: PathBuf,
    java_home: Option<PathBuf>,
    namespace: String,
    config: ManagementConfig,
    agent: ureq::Agent,
}

impl fmt::Debug for HttpBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBridge")
            .field("home", &self.home)
            .field("java_home", &self.java_home)
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A standalone or host-controller process launched by [`HttpBridge`].
#[derive(Debug)]
pub struct HttpProcess {
    kind: ProcessKind,
    command: PathBuf,
    args: Vec<String>,
    seeds: Vec<Seed>,
    child: Mutex<Option<Child>>,
    pid_dir: Option<tempfile::TempDir>,
    host_name: OnceLock<String>,
}

impl HttpProcess {
    /// Kind of this process.
    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    /// Arguments the process is (or will be) launched with.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Configuration files written in place of an empty configuration.
    pub fn seeded_configs(&self) -> impl Iterator<Item = &Path> {
        self.seeds.iter().map(|s| s.path.as_path())
    }

    fn launched(&self) -> bool {
        self.child.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    /// Whether the launched child already exited.
    fn exited(&self) -> bool {
        match self.child.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(child) => matches!(child.try_wait(), Ok(Some(_))),
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Pid of the server JVM, once the launch script has recorded it.
    fn server_pid(&self) -> Option<i32> {
        let dir = self.pid_dir.as_ref()?;
        fs::read_to_string(dir.path().join(PID_FILE))
            .ok()?
            .trim()
            .parse()
            .ok()
    }
}

/// Management client bound to one endpoint.
pub struct HttpClient {
    agent: ureq::Agent,
    url: String,
    credentials: Option<Credentials>,
    digest: Option<DigestAuth>,
    open: bool,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("url", &self.url)
            .field("credentials", &self.credentials)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    fn post(&mut self, operation: &ModelNode) -> Result<Response<Body>> {
        let mut request = self
            .agent
            .post(&self.url)
            .header("Accept", "application/json");
        if let (Some(digest), Some(credentials)) = (self.digest.as_mut(), &self.credentials) {
            let authorization = digest.authorization(
                &credentials.username,
                &credentials.password,
                "POST",
                MANAGEMENT_PATH,
            );
            request = request.header("Authorization", authorization);
        }
        request
            .send_json(operation)
            .map_err(|e| Error::bridge("execute", e))
    }

    /// Adopt the Digest challenge of a 401. False when it cannot be answered.
    fn accept_challenge(&mut self, response: &Response<Body>) -> bool {
        if self.credentials.is_none() {
            return false;
        }
        let challenge = response
            .headers()
            .get_all("www-authenticate")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(Challenge::parse);
        match challenge {
            Some(challenge) => {
                self.digest = Some(DigestAuth::new(challenge));
                true
            }
            None => false,
        }
    }
}

impl HttpBridge {
    /// Locate everything the bridge needs inside an installation.
    ///
    /// Requires both launch scripts, `jboss-modules.jar`, the `modules`
    /// directory and a Java runtime (`JAVA_HOME` or `java` on `PATH`).
    pub fn locate(home: &Path, config: ManagementConfig) -> Result<Self> {
        let mut bridge = Self::with_runtime(home, config, None)?;
        bridge.java_home = match std::env::var_os("JAVA_HOME") {
            Some(java_home) => Some(PathBuf::from(java_home)),
            None => {
                which::which("java").map_err(|e| Error::BridgeInit {
                    home: home.to_path_buf(),
                    message: format!("no Java runtime: JAVA_HOME is unset and {}", e),
                })?;
                None
            }
        };
        Ok(bridge)
    }

    /// Check the installation but take the Java runtime on trust.
    ///
    /// `java_home` is exported as `JAVA_HOME` to the launch scripts; `None`
    /// leaves the scripts to find `java` themselves.
    pub fn with_runtime(home: &Path, config: ManagementConfig, java_home: Option<PathBuf>) -> Result<Self> {
        let require = |relative: &str| -> Result<PathBuf> {
            let path = home.join(relative);
            if path.exists() {
                Ok(path)
            } else {
                Err(Error::BridgeInit {
                    home: home.to_path_buf(),
                    message: format!("missing {}", relative),
                })
            }
        };

        let standalone_script = require(&launch_script("standalone"))?;
        let domain_script = require(&launch_script("domain"))?;
        require("jboss-modules.jar")?;
        require("modules")?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.request_timeout))
            .build()
            .into();

        Ok(Self {
            home: home.to_path_buf(),
            standalone_script,
            domain_script,
            java_home,
            namespace: seed::detect_namespace(home),
            config,
            agent,
        })
    }

    /// Installation root.
    pub fn home(&self) -> &Path {
        &self.home
    }

    fn create(&self, kind: ProcessKind, command: &Path, args: &[String]) -> HttpProcess {
        let (mut args, seeds) = seed::plan(&self.home, &self.namespace, kind, args);
        if !args.iter().any(|a| a == ADMIN_ONLY) {
            args.insert(0, ADMIN_ONLY.to_string());
        }
        args.push(format!("-Djboss.bind.address.management={}", self.config.host));
        args.push(format!("-Djboss.management.http.port={}", self.config.port));
        HttpProcess {
            kind,
            command: command.to_path_buf(),
            args,
            seeds,
            child: Mutex::new(None),
            pid_dir: None,
            host_name: OnceLock::new(),
        }
    }

    fn client(&self) -> HttpClient {
        HttpClient {
            agent: self.agent.clone(),
            url: self.config.endpoint(),
            credentials: self.config.credentials.clone(),
            digest: None,
            open: true,
        }
    }

    /// Run one operation on a throwaway client and return its result payload.
    fn query(&self, operation: &Operation) -> Result<ModelNode> {
        let mut client = self.client();
        let response = self.execute(&mut client, &operation.to_model())?;
        if !response::is_success(&response) {
            return Err(Error::bridge(
                "execute",
                response::failure_description(&response),
            ));
        }
        Ok(response::result(&response).cloned().unwrap_or_default())
    }

    fn host_name(&self, process: &HttpProcess) -> Result<String> {
        if let Some(name) = process.host_name.get() {
            return Ok(name.clone());
        }
        let names = self.query(
            &Operation::new("read-children-names", Address::root()).param("child-type", "host"),
        )?;
        let name = names
            .as_array()
            .and_then(|n| n.first())
            .and_then(|n| n.as_str())
            .ok_or_else(|| Error::bridge("process_state", "host controller reports no host"))?
            .to_string();
        Ok(process.host_name.get_or_init(|| name).clone())
    }

    fn state_address(&self, process: &HttpProcess) -> Result<Address> {
        match process.kind {
            ProcessKind::Standalone => Ok(Address::root()),
            ProcessKind::HostController => {
                Ok(Address::root().child("host", self.host_name(process)?))
            }
        }
    }

    fn request_shutdown(&self, process: &HttpProcess) {
        let address = match process.kind {
            ProcessKind::Standalone => Some(Address::root()),
            ProcessKind::HostController => process
                .host_name
                .get()
                .map(|name| Address::root().child("host", name.clone())),
        };
        if let Some(address) = address
            && let Err(e) = self.query(&Operation::new("shutdown", address))
        {
            log::debug!("Graceful shutdown request failed: {}", report(&e));
        }
    }

    /// Whether something accepts connections on the management port.
    fn port_open(&self) -> bool {
        let Ok(addrs) = (self.config.host.as_str(), self.config.port).to_socket_addrs() else {
            return false;
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).is_ok())
    }

    fn await_port_closed(&self) -> Result<()> {
        let deadline = Instant::now() + self.config.shutdown_timeout;
        while self.port_open() {
            if Instant::now() >= deadline {
                return Err(Error::bridge(
                    "stop",
                    format!(
                        "management port {}:{} still accepts connections after shutdown",
                        self.config.host, self.config.port
                    ),
                ));
            }
            thread::sleep(SHUTDOWN_POLL);
        }
        Ok(())
    }

    /// Wait for a graceful exit. False when the shutdown timeout expired.
    fn wait_for_exit(&self, kind: ProcessKind, child: &mut Child) -> Result<bool> {
        let deadline = Instant::now() + self.config.shutdown_timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    log::info!("Embedded {} exited with {}", kind, status);
                    return Ok(true);
                }
                Ok(None) if Instant::now() >= deadline => return Ok(false),
                Ok(None) => thread::sleep(SHUTDOWN_POLL),
                Err(e) => return Err(Error::bridge("stop", e)),
            }
        }
    }
}

impl ManagementBridge for HttpBridge {
    type Process = HttpProcess;
    type Client = HttpClient;

    fn create_standalone(&self, args: &[String]) -> Result<HttpProcess> {
        Ok(self.create(ProcessKind::Standalone, &self.standalone_script, args))
    }

    fn create_host_controller(&self, args: &[String]) -> Result<HttpProcess> {
        Ok(self.create(ProcessKind::HostController, &self.domain_script, args))
    }

    fn start(&self, process: &mut HttpProcess) -> Result<()> {
        if process.launched() {
            return Err(Error::State(format!("embedded {} already launched", process.kind)));
        }
        if self.port_open() {
            return Err(Error::bridge(
                "start",
                format!(
                    "management port {}:{} is already in use; another server is running",
                    self.config.host, self.config.port
                ),
            ));
        }
        for seed in &process.seeds {
            seed.write()?;
            log::info!("Seeded {}", seed.path.display());
        }

        let pid_dir = tempfile::Builder::new()
            .prefix("fpack-server-")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;
        let mut command = Command::new(&process.command);
        command
            .args(&process.args)
            .current_dir(&self.home)
            .env("JBOSS_HOME", &self.home)
            .env("LAUNCH_JBOSS_IN_BACKGROUND", "true")
            .env("JBOSS_PIDFILE", pid_dir.path().join(PID_FILE))
            .stdin(Stdio::null());
        if let Some(java_home) = &self.java_home {
            command.env("JAVA_HOME", java_home);
        }
        log::info!(
            "Launching embedded {}: {} {}",
            process.kind,
            process.command.display(),
            process.args.join(" ")
        );
        let child = command.spawn().map_err(|e| Error::bridge("start", e))?;
        *process.child.get_mut().map_err(|_| poisoned("start"))? = Some(child);
        process.pid_dir = Some(pid_dir);
        Ok(())
    }

    fn stop(&self, process: &mut HttpProcess) -> Result<()> {
        let Some(mut child) = process.child.get_mut().map_err(|_| poisoned("stop"))?.take()
        else {
            return Ok(());
        };

        if matches!(child.try_wait(), Ok(None)) {
            self.request_shutdown(process);
            if !self.wait_for_exit(process.kind, &mut child)? {
                log::warn!(
                    "Embedded {} did not exit within {}s, killing it",
                    process.kind,
                    self.config.shutdown_timeout.as_secs()
                );
                if let Some(pid) = process.server_pid()
                    && let Err(e) = kill_pid(pid)
                {
                    log::warn!("Failed to kill server process {}: {}", pid, e);
                }
                child.kill().map_err(|e| Error::bridge("stop", e))?;
                child.wait().map_err(|e| Error::bridge("stop", e))?;
            }
        }
        self.await_port_closed()
    }

    fn process_state(&self, process: &HttpProcess) -> Result<String> {
        if process.exited() {
            return Ok(STOPPED.to_string());
        }
        let address = self.state_address(process)?;
        let state = self.query(
            &Operation::new("read-attribute", address)
                .param("name", process.kind.state_attribute()),
        )?;
        state
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::bridge("process_state", format!("unexpected state {}", state)))
    }

    fn management_client(&self, process: &HttpProcess) -> Result<HttpClient> {
        if !process.launched() {
            return Err(Error::bridge(
                "management_client",
                format!("embedded {} has not been launched", process.kind),
            ));
        }
        Ok(self.client())
    }

    /// Post one operation.
    ///
    /// Failed outcomes come back as responses whatever the HTTP status. A
    /// 401/403 that cannot be answered is [`Error::Unauthorized`]; a body
    /// that is not a management response is [`Error::BadResponse`]. Neither
    /// is transient.
    fn execute(&self, client: &mut HttpClient, operation: &ModelNode) -> Result<ModelNode> {
        if !client.open {
            return Err(Error::bridge("execute", "management client is closed"));
        }
        log::debug!("POST {} {}", client.url, operation);
        let mut response = client.post(operation)?;
        if response.status() == StatusCode::UNAUTHORIZED && client.accept_challenge(&response) {
            response = client.post(operation)?;
        }

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(Error::Unauthorized {
                url: client.url.clone(),
                status,
            });
        }
        let bad = |message: String| Error::BadResponse {
            url: client.url.clone(),
            status,
            message,
        };
        let body: ModelNode = response
            .body_mut()
            .read_json()
            .map_err(|e| bad(e.to_string()))?;
        if body.get(response::OUTCOME).is_none() {
            return Err(bad(format!("no outcome in {}", body)));
        }
        Ok(body)
    }

    fn close(&self, client: &mut HttpClient) -> Result<()> {
        client.open = false;
        Ok(())
    }
}

fn poisoned(call: &'static str) -> Error {
    Error::bridge(call, "process handle lock poisoned")
}

fn launch_script(name: &str) -> String {
    if cfg!(windows) {
        format!("bin/{}.bat", name)
    } else {
        format!("bin/{}.sh", name)
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_pid(pid: i32) -> io::Result<()> {
    // SAFETY: kill(2) takes two integers and touches no memory.
    if unsafe { libc::kill(pid, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn kill_pid(_pid: i32) -> io::Result<()> {
    Ok(())
}
