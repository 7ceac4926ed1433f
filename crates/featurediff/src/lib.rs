//! Read server configurations back as declarative features.
//!
//! The [`ConfigReader`] boots a configuration file in an admin-only embedded
//! process, asks the server for the configuration as a list of feature
//! nodes and resolves every node against a [`SpecRegistry`]. The resulting
//! [`ProvisionedConfig`] is then [`classify`]-ed against a baseline as added
//! or updated.
//!
//! ```
//! use featurediff::{ConfigModel, ProvisionedConfig, ProvisionedState, classify};
//!
//! let baseline = ProvisionedState {
//!     configs: vec![ProvisionedConfig::new(ConfigModel::Standalone, "standalone.xml")],
//! };
//! let diff = classify(&baseline, [ProvisionedConfig::new(ConfigModel::Standalone, "standalone.xml")]);
//! assert_eq!(diff.updated.len(), 1);
//! assert!(diff.added.is_empty());
//! ```

pub mod classify;
pub mod error;
pub mod reader;
pub mod registry;
pub mod resolve;
pub mod sniff;
pub mod types;

pub use classify::classify;
pub use error::{Error, ErrorCategory, Result};
pub use reader::ConfigReader;
pub use registry::{FeatureSpec, LocalSpecRegistry, SpecParam, SpecRegistry};
pub use types::{
    ConfigDiff, ConfigModel, FeatureId, ProvisionedConfig, ProvisionedState, ResolvedFeature,
    SpecId,
};
