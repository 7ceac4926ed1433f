//! Error types for configuration reading and diffing.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for feature-diff operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of feature-diff errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A feature could not be matched to a known spec.
    SpecResolution,
    /// The host name of a host controller could not be read.
    HostName,
    /// The server returned something that is not a feature list.
    Malformed,
    /// The feature-spec registry could not be loaded.
    Registry,
    /// The embedded server failed.
    Embedded,
    /// Filesystem error.
    Io,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::SpecResolution => "Unknown feature spec",
            Self::HostName => "Host name unavailable",
            Self::Malformed => "Unexpected management response",
            Self::Registry => "Invalid feature-spec registry",
            Self::Embedded => "Embedded server error",
            Self::Io => "Filesystem error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::SpecResolution => "Make sure every feature pack used by the configuration is in the spec directory",
            Self::HostName => "Check that the host configuration defines a host",
            Self::Malformed => "Check that the server version supports read-config-as-features",
            Self::Registry => "Check the spec.json files in the feature-pack layout",
            Self::Embedded => "Inspect the server output above",
            Self::Io => "Check file permissions and paths",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while reading a configuration as features.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No loaded spec matches a feature, even after prefix fallbacks.
    #[error("no feature spec matches '{name}' (tried {})", tried.join(", "))]
    SpecNotFound {
        /// Spec name reported by the server.
        name: String,
        /// Candidate names tried, in order.
        tried: Vec<String>,
    },

    /// Reading the host name failed or returned no host.
    #[error("failed to read the host name: {0}")]
    HostName(String),

    /// A feature node or response does not have the expected shape.
    #[error("malformed feature{}: {message}", spec.as_deref().map(|s| format!(" '{}'", s)).unwrap_or_default())]
    MalformedFeature {
        /// Spec name, when known.
        spec: Option<String>,
        /// What is wrong.
        message: String,
    },

    /// The file's root element is not server, domain or host.
    #[error("cannot tell the configuration model of {}", path.display())]
    UnknownModel {
        /// The configuration file.
        path: PathBuf,
    },

    /// A spec file or baseline could not be decoded.
    #[error("invalid {what} {}: {source}", path.display())]
    Decode {
        /// What was being read, e.g. `feature spec`.
        what: &'static str,
        /// File being read.
        path: PathBuf,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },

    /// IO error with path context.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The embedded server failed.
    #[error(transparent)]
    Embedded(#[from] embedded::Error),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(spec: Option<&str>, message: impl Into<String>) -> Self {
        Self::MalformedFeature {
            spec: spec.map(str::to_string),
            message: message.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::SpecNotFound { .. } => ErrorCategory::SpecResolution,
            Error::HostName(_) => ErrorCategory::HostName,
            Error::MalformedFeature { .. } | Error::UnknownModel { .. } => ErrorCategory::Malformed,
            Error::Decode { .. } => ErrorCategory::Registry,
            Error::Embedded(_) => ErrorCategory::Embedded,
            Error::Io { .. } => ErrorCategory::Io,
        }
    }
}
