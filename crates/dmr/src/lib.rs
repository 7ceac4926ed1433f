//! # dmr
//!
//! Detyped management model for driving an application server's management
//! API without a typed schema.
//!
//! Every request is a generic tree ([`ModelNode`]) with three reserved keys:
//! `operation` (the name), `address` (an ordered list of `type=name` segments)
//! and the operation's named parameters. Responses carry an `outcome`, an
//! optional `result` and, on failure, a `failure-description`.
//!
//! ## Example
//!
//! ```
//! use dmr::{Address, Composite, Operation};
//!
//! let add = Operation::new("add", Address::root().child("subsystem", "logging"))
//!     .param("add-logging-api-dependencies", false);
//! assert_eq!(add.to_string(), "/subsystem=logging:add(add-logging-api-dependencies=false)");
//!
//! let mut batch = Composite::new();
//! batch.add_step(add);
//! assert_eq!(batch.to_operation().name(), "composite");
//!
//! let parsed = Operation::parse(r#"{"operation":"read-resource","address":[]}"#).unwrap();
//! assert!(parsed.address().is_root());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod error;
pub mod operation;
pub mod response;

pub use address::Address;
pub use error::{Error, Result};
pub use operation::{Composite, Operation};

/// Untyped management tree node.
///
/// JSON is the wire encoding used by the HTTP management endpoint, so the
/// tree is represented directly as a JSON value.
pub type ModelNode = serde_json::Value;
