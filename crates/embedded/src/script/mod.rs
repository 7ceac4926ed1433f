//! Line-oriented script exchanged with a forked embedded process.
//!
//! ```text
//! standalone | host         sets the process kind
//! <comma-joined args>       startup arguments, may be empty
//! batch                     begin a composite
//! run-batch                 submit the composite
//! stop                      stop the process
//! <json operation>          any other line
//! ```
//!
//! The parent records calls with [`ScriptWriter`]; the child replays them
//! with [`replay`]. Both sides are built from this crate, so the format is
//! not versioned.

mod reader;
mod writer;

pub use reader::{ParserState, ScriptParser, parse_script, replay};
pub use writer::ScriptWriter;

use crate::kind::ProcessKind;
use dmr::Operation;

/// Control token opening a batch.
pub const BATCH: &str = "batch";
/// Control token submitting the open batch.
pub const RUN_BATCH: &str = "run-batch";
/// Control token stopping the process.
pub const STOP: &str = "stop";
/// Separator between startup arguments.
pub const ARG_SEPARATOR: char = ',';

/// One decoded script instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Start a process of `kind` with `args`.
    Start {
        /// Process kind.
        kind: ProcessKind,
        /// Startup arguments.
        args: Vec<String>,
    },
    /// Open a batch.
    Batch,
    /// Submit the open batch.
    RunBatch,
    /// Stop the process.
    Stop,
    /// Execute or buffer an operation.
    Operation(Operation),
}
