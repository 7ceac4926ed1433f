//! Drive an embedded application server.
//!
//! - [`bridge`]: the narrow management vocabulary and its HTTP and mock
//!   implementations
//! - [`session`]: the start, batch and stop state machine
//! - [`script`]: the line protocol used to hand work to a forked process
//! - [`fork`]: launching that process
//! - [`plan`]: generation plans replayed against any executor
//!
//! # Example
//!
//! ```
//! use dmr::{Address, Operation};
//! use embedded::bridge::MockBridge;
//! use embedded::{EmbeddedExecutor, EmbeddedSession};
//!
//! let bridge = MockBridge::new();
//! let mut session = EmbeddedSession::new(bridge.clone());
//! session.start_server(vec!["--server-config".into(), "standalone.xml".into()]).unwrap();
//! session.start_batch().unwrap();
//! session.handle(&Operation::new("add", Address::root().child("subsystem", "ee"))).unwrap();
//! session.end_batch().unwrap();
//! session.stop_embedded().unwrap();
//! assert_eq!(bridge.executed().len(), 1);
//! ```

pub mod bridge;
pub mod error;
pub mod executor;
pub mod fork;
pub mod kind;
pub mod plan;
pub mod script;
pub mod session;

pub use bridge::{Credentials, HttpBridge, ManagementBridge, ManagementConfig};
pub use error::{Error, ErrorCategory, Result};
pub use executor::EmbeddedExecutor;
pub use fork::{ChildLauncher, ForkedExecutor};
pub use kind::ProcessKind;
pub use plan::{GenerationPlan, NoProgress, PlanProgress, PlannedConfig};
pub use session::{EmbeddedSession, SessionState};
