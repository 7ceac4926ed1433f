use super::{ARG_SEPARATOR, BATCH, Instruction, RUN_BATCH, STOP};
use crate::error::{Error, Result, report};
use crate::executor::EmbeddedExecutor;
use crate::kind::ProcessKind;
use dmr::Operation;
use log::{debug, warn};
use std::io::BufRead;

/// Position of a [`ScriptParser`] in the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Expecting `standalone` or `host`.
    LookingForControllerKind,
    /// Expecting the startup-argument line for this kind.
    LookingForArgs(ProcessKind),
    /// A process is started; expecting control tokens or operations.
    EmbeddedStarted,
}

/// Incremental script decoder.
#[derive(Debug)]
pub struct ScriptParser {
    state: ParserState,
    line: usize,
}

impl Default for ScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::LookingForControllerKind,
            line: 0,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Decode the next line. Returns `None` for lines that carry no instruction.
    pub fn next_line(&mut self, text: &str) -> Result<Option<Instruction>> {
        self.line += 1;
        let text = text.strip_suffix('\r').unwrap_or(text);

        match self.state {
            ParserState::LookingForControllerKind => {
                if text.trim().is_empty() {
                    return Ok(None);
                }
                let kind = ProcessKind::from_script_token(text)
                    .ok_or_else(|| self.error(text, "expected 'standalone' or 'host'"))?;
                self.state = ParserState::LookingForArgs(kind);
                Ok(None)
            }
            ParserState::LookingForArgs(kind) => {
                let args = if text.is_empty() {
                    Vec::new()
                } else {
                    text.split(ARG_SEPARATOR).map(str::to_string).collect()
                };
                self.state = ParserState::EmbeddedStarted;
                Ok(Some(Instruction::Start { kind, args }))
            }
            ParserState::EmbeddedStarted => match text {
                BATCH => Ok(Some(Instruction::Batch)),
                RUN_BATCH => Ok(Some(Instruction::RunBatch)),
                STOP => {
                    self.state = ParserState::LookingForControllerKind;
                    Ok(Some(Instruction::Stop))
                }
                _ => Operation::parse(text)
                    .map(|op| Some(Instruction::Operation(op)))
                    .map_err(|e| self.error(text, &format!("not an operation ({})", e))),
            },
        }
    }

    /// Check that the script did not end between a kind and its arguments.
    pub fn finish(&self) -> Result<()> {
        match self.state {
            ParserState::LookingForArgs(kind) => Err(Error::ScriptParse {
                line: self.line,
                text: kind.script_token().to_string(),
                message: "script ended before the startup arguments".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn error(&self, text: &str, message: &str) -> Error {
        Error::ScriptParse {
            line: self.line,
            text: text.to_string(),
            message: message.to_string(),
        }
    }
}

/// Decode a whole script.
pub fn parse_script(text: &str) -> Result<Vec<Instruction>> {
    let mut parser = ScriptParser::new();
    let mut instructions = Vec::new();
    for line in text.lines() {
        if let Some(instruction) = parser.next_line(line)? {
            instructions.push(instruction);
        }
    }
    parser.finish()?;
    Ok(instructions)
}

/// Replay a script against `executor`, line by line.
///
/// The first failure aborts the replay. If a process is still running at
/// that point, or when the script ends without `stop`, it is stopped; a
/// cleanup failure is logged and never replaces the original error.
pub fn replay<R, E>(input: R, executor: &mut E) -> Result<()>
where
    R: BufRead,
    E: EmbeddedExecutor + ?Sized,
{
    let mut parser = ScriptParser::new();
    let mut live = false;
    let outcome = run(input, &mut parser, executor, &mut live);

    match outcome {
        Ok(()) if live => {
            debug!("Script ended without '{}'; stopping", STOP);
            executor.stop_embedded()
        }
        Ok(()) => Ok(()),
        Err(e) => {
            if live && let Err(stop_err) = executor.stop_embedded() {
                warn!("Cleanup after script failure also failed: {}", report(&stop_err));
            }
            Err(e)
        }
    }
}

fn run<R, E>(input: R, parser: &mut ScriptParser, executor: &mut E, live: &mut bool) -> Result<()>
where
    R: BufRead,
    E: EmbeddedExecutor + ?Sized,
{
    for line in input.lines() {
        let line = line.map_err(|e| Error::io("<script>", e))?;
        match parser.next_line(&line)? {
            None => {}
            Some(Instruction::Start { kind, args }) => {
                executor.start(kind, args)?;
                *live = true;
            }
            Some(Instruction::Batch) => executor.start_batch()?,
            Some(Instruction::RunBatch) => executor.end_batch()?,
            Some(Instruction::Stop) => {
                *live = false;
                executor.stop_embedded()?;
            }
            Some(Instruction::Operation(op)) => executor.handle(&op)?,
        }
    }
    parser.finish()
}
