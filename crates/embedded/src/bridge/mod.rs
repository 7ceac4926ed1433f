//! Bridge between the orchestration code and the server's management API.
//!
//! The [`ManagementBridge`] trait is the narrow vocabulary the session state
//! machine uses: create a standalone or host-controller process, start and
//! stop it, poll its state, obtain a management client, execute operations
//! and close the client. Composing operations and reading responses needs no
//! bridging; those helpers live in the `dmr` crate.
//!
//! [`HttpBridge`] is the production implementation. It launches processes
//! from the installation's launch scripts and talks JSON to the HTTP
//! management endpoint. [`MockBridge`] records calls for tests.
//!
//! A process-wide bridge can be installed with [`initialize`]; calling it
//! again replaces the cached bridge.
//!
//! ```
//! use embedded::bridge::{ManagementBridge, MockBridge};
//! use embedded::kind::ProcessKind;
//!
//! let bridge = MockBridge::new();
//! let mut process = bridge.create_standalone(&[]).unwrap();
//! bridge.start(&mut process).unwrap();
//! assert_eq!(bridge.process_state(&process).unwrap(), "running");
//! assert_eq!(process.kind(), ProcessKind::Standalone);
//! ```

pub mod digest;
pub mod http;
pub mod mock;
pub mod seed;

pub use http::{Credentials, HttpBridge, HttpClient, HttpProcess, ManagementConfig};
pub use mock::{BridgeCall, MockBridge, MockClient, MockProcess};

use crate::error::{Error, Result};
use dmr::ModelNode;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Process state reported while booting.
pub const STARTING: &str = "starting";
/// Process state reported once boot completed.
pub const RUNNING: &str = "running";
/// Process state reported after the process exited.
pub const STOPPED: &str = "stopped";

/// Operations needed to drive an embedded server.
///
/// Handles are opaque to callers; each implementation picks its own process
/// and client types.
pub trait ManagementBridge {
    /// Handle to an embedded process.
    type Process;
    /// Handle to a management client connected to a process.
    type Client;

    /// Create (but do not start) a standalone server process.
    fn create_standalone(&self, args: &[String]) -> Result<Self::Process>;

    /// Create (but do not start) a host-controller process.
    fn create_host_controller(&self, args: &[String]) -> Result<Self::Process>;

    /// Launch the process.
    fn start(&self, process: &mut Self::Process) -> Result<()>;

    /// Stop the process and release its resources.
    fn stop(&self, process: &mut Self::Process) -> Result<()>;

    /// Current process state, e.g. [`STARTING`] or [`RUNNING`].
    fn process_state(&self, process: &Self::Process) -> Result<String>;

    /// Obtain a management client for the process.
    fn management_client(&self, process: &Self::Process) -> Result<Self::Client>;

    /// Execute one operation and return the raw response.
    ///
    /// A failed outcome is a successful call. Errors are transport problems
    /// and replies that are rejected or are not management responses.
    fn execute(&self, client: &mut Self::Client, operation: &ModelNode) -> Result<ModelNode>;

    /// Close the client.
    fn close(&self, client: &mut Self::Client) -> Result<()>;
}

impl<B: ManagementBridge> ManagementBridge for Arc<B> {
    type Process = B::Process;
    type Client = B::Client;

    fn create_standalone(&self, args: &[String]) -> Result<Self::Process> {
        self.as_ref().create_standalone(args)
    }

    fn create_host_controller(&self, args: &[String]) -> Result<Self::Process> {
        self.as_ref().create_host_controller(args)
    }

    fn start(&self, process: &mut Self::Process) -> Result<()> {
        self.as_ref().start(process)
    }

    fn stop(&self, process: &mut Self::Process) -> Result<()> {
        self.as_ref().stop(process)
    }

    fn process_state(&self, process: &Self::Process) -> Result<String> {
        self.as_ref().process_state(process)
    }

    fn management_client(&self, process: &Self::Process) -> Result<Self::Client> {
        self.as_ref().management_client(process)
    }

    fn execute(&self, client: &mut Self::Client, operation: &ModelNode) -> Result<ModelNode> {
        self.as_ref().execute(client, operation)
    }

    fn close(&self, client: &mut Self::Client) -> Result<()> {
        self.as_ref().close(client)
    }
}

static CURRENT: RwLock<Option<Arc<HttpBridge>>> = RwLock::new(None);

/// Locate the bridge for an installation and install it process-wide.
///
/// Fails with [`Error::BridgeInit`] when the installation is incomplete.
/// A later call replaces the cached bridge.
pub fn initialize(home: &Path, config: ManagementConfig) -> Result<Arc<HttpBridge>> {
    let bridge = Arc::new(HttpBridge::locate(home, config)?);
    let mut slot = CURRENT
        .write()
        .map_err(|_| Error::State("bridge registry lock poisoned".to_string()))?;
    *slot = Some(Arc::clone(&bridge));
    log::debug!("Initialized management bridge for {}", home.display());
    Ok(bridge)
}

/// The bridge installed by the last successful [`initialize`].
pub fn current() -> Option<Arc<HttpBridge>> {
    CURRENT.read().ok().and_then(|slot| slot.clone())
}
