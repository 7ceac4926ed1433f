//! Error types for embedded-server operations.
//!
//! Every failure of the bridge, the session state machine or the script
//! protocol maps to one [`Error`] variant. Variants are grouped into
//! [`ErrorCategory`] values so callers can decide how to report them.

use crate::kind::ProcessKind;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for embedded operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by bridged call failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Categories of embedded-server errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The installation is missing something the bridge needs.
    BridgeInit,
    /// A bridged call failed.
    Bridge,
    /// The management interface refused the credentials.
    Auth,
    /// The embedded process failed to launch or boot.
    Startup,
    /// A management operation returned a failure.
    Operation,
    /// A forked-process script line is malformed.
    ScriptParse,
    /// A call arrived in a state that does not accept it.
    State,
    /// The forked child process failed.
    Forked,
    /// A generation plan could not be read.
    Plan,
    /// Filesystem error.
    Io,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::BridgeInit => "Incompatible server installation",
            Self::Bridge => "Management call failed",
            Self::Auth => "Management interface requires authentication",
            Self::Startup => "Embedded server failed to start",
            Self::Operation => "Management operation failed",
            Self::ScriptParse => "Malformed embedded script",
            Self::State => "Illegal embedded-server state",
            Self::Forked => "Forked embedded process failed",
            Self::Plan => "Invalid generation plan",
            Self::Io => "Filesystem error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::BridgeInit => "Check that the installation path points at a complete server distribution",
            Self::Bridge => "Check that the management interface is reachable",
            Self::Auth => "Set username and password in [management] for a user created with add-user.sh",
            Self::Startup => "Inspect the server output above or raise the boot timeout",
            Self::Operation => "Check the failure description and the operations being replayed",
            Self::ScriptParse => "The script is generated and consumed by the same tool; regenerate it",
            Self::State => "Check the order of start, batch and stop instructions",
            Self::Forked => "Inspect the child process output above",
            Self::Plan => "Check the plan file against the documented JSON layout",
            Self::Io => "Check file permissions and paths",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while driving an embedded server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The installation lacks a file, directory or runtime the bridge needs.
    #[error("incompatible installation at {}: {message}", home.display())]
    BridgeInit {
        /// Installation root.
        home: PathBuf,
        /// What is missing.
        message: String,
    },

    /// A bridged call failed; the original cause is kept as the source.
    #[error("bridged call '{call}' failed")]
    Bridge {
        /// Name of the bridged operation.
        call: &'static str,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },

    /// The management interface answered 401 or 403.
    #[error("management interface at {url} rejected the request (HTTP {status})")]
    Unauthorized {
        /// Endpoint URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The management interface answered with something that is not a management response.
    #[error("unexpected reply from {url} (HTTP {status}): {message}")]
    BadResponse {
        /// Endpoint URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Why the body was rejected.
        message: String,
    },

    /// The embedded process could not be created, started or connected to.
    #[error("failed to start embedded {kind}")]
    Startup {
        /// Requested process kind.
        kind: ProcessKind,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The embedded process stopped while booting.
    #[error("embedded {kind} stopped while booting")]
    StoppedDuringBoot {
        /// Requested process kind.
        kind: ProcessKind,
    },

    /// The embedded process did not leave the `starting` state in time.
    #[error("embedded {kind} did not boot within {secs} seconds")]
    BootTimeout {
        /// Requested process kind.
        kind: ProcessKind,
        /// Elapsed seconds when the wait gave up.
        secs: u64,
    },

    /// A management operation returned a non-success outcome.
    #[error("failed to {context}: {operation}: {description}")]
    OperationFailed {
        /// Which artifact was being produced, e.g. `generate standalone.xml`.
        context: String,
        /// The failing operation.
        operation: String,
        /// The server's failure description, verbatim.
        description: String,
    },

    /// A script line does not match the grammar.
    #[error("script line {line}: {message}: '{text}'")]
    ScriptParse {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        text: String,
        /// What was wrong with it.
        message: String,
    },

    /// A value cannot be represented in the script format.
    #[error("cannot encode script line: {0}")]
    Unencodable(String),

    /// A call arrived in a state that does not accept it.
    #[error("illegal state: {0}")]
    State(String),

    /// Closing the client or stopping the process failed.
    #[error("failed to stop embedded {kind}")]
    Stop {
        /// Kind of the process being stopped.
        kind: ProcessKind,
        /// First failure observed during cleanup.
        #[source]
        source: Box<Error>,
    },

    /// The forked child process exited unsuccessfully.
    #[error("forked embedded process failed ({status}):\n{output}")]
    Forked {
        /// Exit status description.
        status: String,
        /// Last lines of the child's output.
        output: String,
    },

    /// A generation plan is not valid JSON or has the wrong shape.
    #[error("invalid generation plan {}: {source}", path.display())]
    Plan {
        /// Plan file.
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

    /// Malformed management model.
    #[error(transparent)]
    Model(#[from] dmr::Error),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a failure of a bridged call.
    pub fn bridge(call: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Bridge {
            call,
            source: source.into(),
        }
    }

    /// Wrap a failure that prevented a process from starting.
    pub fn startup(kind: ProcessKind, source: Error) -> Self {
        Self::Startup {
            kind,
            source: Box::new(source),
        }
    }

    /// Whether a failed state poll may succeed if retried.
    ///
    /// Only calls that never reached the server qualify; a server that
    /// answers and refuses will keep refusing.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Bridge { .. })
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::BridgeInit { .. } => ErrorCategory::BridgeInit,
            Error::Bridge { .. } | Error::BadResponse { .. } => ErrorCategory::Bridge,
            Error::Unauthorized { .. } => ErrorCategory::Auth,
            Error::Startup { .. } | Error::StoppedDuringBoot { .. } | Error::BootTimeout { .. } => {
                ErrorCategory::Startup
            }
            Error::OperationFailed { .. } => ErrorCategory::Operation,
            Error::ScriptParse { .. } | Error::Unencodable(_) | Error::Model(_) => {
                ErrorCategory::ScriptParse
            }
            Error::State(_) => ErrorCategory::State,
            Error::Stop { source, .. } => source.category(),
            Error::Forked { .. } => ErrorCategory::Forked,
            Error::Plan { .. } => ErrorCategory::Plan,
            Error::Io { .. } => ErrorCategory::Io,
        }
    }
}

/// Render an error followed by its causes, `outer: cause: root`.
///
/// Causes whose text is already part of the message are not repeated.
pub fn report(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
