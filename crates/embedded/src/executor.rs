//! The call vocabulary shared by in-process and forked execution.

use crate::error::Result;
use crate::kind::ProcessKind;
use dmr::Operation;

/// Sequence of embedded-server calls.
///
/// [`EmbeddedSession`](crate::EmbeddedSession) executes them against a live
/// process; [`ScriptWriter`](crate::script::ScriptWriter) records them for a
/// forked child. Callers choose the strategy by picking the implementation.
pub trait EmbeddedExecutor {
    /// Start a standalone server with the given startup arguments.
    fn start_server(&mut self, args: Vec<String>) -> Result<()>;

    /// Start a host controller with the given startup arguments.
    fn start_host_controller(&mut self, args: Vec<String>) -> Result<()>;

    /// Begin buffering operations into a composite.
    fn start_batch(&mut self) -> Result<()>;

    /// Submit the buffered composite as one operation.
    fn end_batch(&mut self) -> Result<()>;

    /// Execute (or buffer) one operation.
    fn handle(&mut self, operation: &Operation) -> Result<()>;

    /// Stop the running process.
    fn stop_embedded(&mut self) -> Result<()>;

    /// Start a process of the given kind.
    fn start(&mut self, kind: ProcessKind, args: Vec<String>) -> Result<()> {
        match kind {
            ProcessKind::Standalone => self.start_server(args),
            ProcessKind::HostController => self.start_host_controller(args),
        }
    }
}
