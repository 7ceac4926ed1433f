use super::{ARG_SEPARATOR, BATCH, RUN_BATCH, STOP};
use crate::error::{Error, Result};
use crate::executor::EmbeddedExecutor;
use crate::kind::ProcessKind;
use dmr::Operation;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    Started { batch: bool },
}

/// Records executor calls as script lines.
///
/// Calls are checked against the same state rules the live session
/// enforces, so a script that was written successfully replays without
/// protocol errors.
#[derive(Debug)]
pub struct ScriptWriter<W: Write> {
    out: W,
    state: WriterState,
    lines: usize,
}

impl<W: Write> ScriptWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            state: WriterState::Idle,
            lines: 0,
        }
    }

    /// Number of lines written so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Whether a start has been recorded without a matching stop.
    pub fn is_started(&self) -> bool {
        matches!(self.state, WriterState::Started { .. })
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{}", line).map_err(|e| Error::io("<script>", e))?;
        self.lines += 1;
        Ok(())
    }

    fn record_start(&mut self, kind: ProcessKind, args: &[String]) -> Result<()> {
        if self.is_started() {
            return Err(Error::State(format!(
                "cannot record start of embedded {}: a process is already started",
                kind
            )));
        }
        let encoded = encode_args(args)?;
        self.write_line(kind.script_token())?;
        self.write_line(&encoded)?;
        self.state = WriterState::Started { batch: false };
        Ok(())
    }

    fn require_started(&self, action: &str) -> Result<bool> {
        match self.state {
            WriterState::Started { batch } => Ok(batch),
            WriterState::Idle => Err(Error::State(format!(
                "cannot record {}: no process is started",
                action
            ))),
        }
    }
}

fn encode_args(args: &[String]) -> Result<String> {
    for arg in args {
        if arg.is_empty() {
            return Err(Error::Unencodable("empty startup argument".to_string()));
        }
        if arg.contains(ARG_SEPARATOR) || arg.contains('\n') || arg.contains('\r') {
            return Err(Error::Unencodable(format!(
                "startup argument '{}' contains '{}' or a line break",
                arg, ARG_SEPARATOR
            )));
        }
    }
    Ok(args.join(&ARG_SEPARATOR.to_string()))
}

impl<W: Write> EmbeddedExecutor for ScriptWriter<W> {
    fn start_server(&mut self, args: Vec<String>) -> Result<()> {
        self.record_start(ProcessKind::Standalone, &args)
    }

    fn start_host_controller(&mut self, args: Vec<String>) -> Result<()> {
        self.record_start(ProcessKind::HostController, &args)
    }

    fn start_batch(&mut self) -> Result<()> {
        if self.require_started("batch")? {
            return Err(Error::State("a batch is already open; batches do not nest".to_string()));
        }
        self.write_line(BATCH)?;
        self.state = WriterState::Started { batch: true };
        Ok(())
    }

    fn end_batch(&mut self) -> Result<()> {
        if !self.require_started("run-batch")? {
            return Err(Error::State("no batch is open".to_string()));
        }
        self.write_line(RUN_BATCH)?;
        self.state = WriterState::Started { batch: false };
        Ok(())
    }

    fn handle(&mut self, operation: &Operation) -> Result<()> {
        self.require_started("operation")?;
        self.write_line(&operation.to_json_line())
    }

    fn stop_embedded(&mut self) -> Result<()> {
        if !self.is_started() {
            return Ok(());
        }
        self.write_line(STOP)?;
        self.state = WriterState::Idle;
        Ok(())
    }
}
