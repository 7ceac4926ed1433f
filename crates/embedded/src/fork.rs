//! Out-of-process execution.
//!
//! [`ForkedExecutor`] records the calls a plan makes into a script, then
//! [`ForkedExecutor::run`] writes it to a temporary file and launches a child
//! that replays it (see [`crate::script::replay`]). The child receives the
//! installation root and the script path as its last two arguments.

use crate::error::{Error, Result};
use crate::executor::EmbeddedExecutor;
use crate::script::ScriptWriter;
use dmr::Operation;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

/// Lines of child output kept for the failure message.
const OUTPUT_TAIL: usize = 20;

/// How to launch the child that replays a script.
#[derive(Debug, Clone)]
pub struct ChildLauncher {
    program: PathBuf,
    leading_args: Vec<String>,
    home: PathBuf,
    env: Vec<(String, String)>,
}

impl ChildLauncher {
    /// Run `program [leading args..] <home> <script>`.
    pub fn new(program: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            home: home.into(),
            env: Vec::new(),
        }
    }

    /// Re-invoke the running executable with its `exec-script` subcommand.
    pub fn current_exe(home: impl Into<PathBuf>) -> Result<Self> {
        let exe = std::env::current_exe().map_err(|e| Error::io("<current executable>", e))?;
        Ok(Self::new(exe, home).arg("exec-script"))
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn command(&self, script: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg(&self.home)
            .arg(script)
            .envs(self.env.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

/// Executor that defers all work to a forked child.
#[derive(Debug)]
pub struct ForkedExecutor {
    writer: ScriptWriter<Vec<u8>>,
}

impl Default for ForkedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ForkedExecutor {
    pub fn new() -> Self {
        Self {
            writer: ScriptWriter::new(Vec::new()),
        }
    }

    /// The script recorded so far.
    pub fn script(&self) -> String {
        String::from_utf8_lossy(self.writer.get_ref()).into_owned()
    }

    /// Write the script to a temporary file and replay it in a child process.
    ///
    /// Child output is forwarded to the log. A non-zero exit is an error
    /// carrying the last lines of output.
    pub fn run(self, launcher: &ChildLauncher) -> Result<()> {
        if self.writer.lines() == 0 {
            debug!("Nothing recorded; not forking");
            return Ok(());
        }
        if self.writer.is_started() {
            warn!("Script ends with a running process; the child will stop it");
        }

        let mut file = tempfile::Builder::new()
            .prefix("fpack-script-")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;
        if let Err(e) = file.write_all(self.writer.get_ref()).and_then(|()| file.flush()) {
            return Err(Error::io(file.path(), e));
        }

        let mut cmd = launcher.command(file.path());
        info!(
            "Forking embedded process for {} in {}",
            file.path().display(),
            launcher.home().display()
        );
        debug!("Child command: {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::io(&launcher.program, e))?;

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL)));
        let stderr_pump = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&tail);
            thread::spawn(move || pump(stderr, &tail))
        });
        if let Some(stdout) = child.stdout.take() {
            pump(stdout, &tail);
        }
        if let Some(handle) = stderr_pump
            && handle.join().is_err()
        {
            warn!("Child stderr reader panicked");
        }

        let status = child
            .wait()
            .map_err(|e| Error::io(&launcher.program, e))?;
        if status.success() {
            return Ok(());
        }
        let output = tail
            .lock()
            .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        Err(Error::Forked {
            status: status.to_string(),
            output,
        })
    }
}

/// Forward `stream` to the log until EOF.
///
/// Lines are read as raw bytes; the pipe must be drained to the end or the
/// child dies on a broken pipe.
fn pump(stream: impl Read, tail: &Mutex<VecDeque<String>>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Stopped reading child output: {}", e);
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']).to_string();
        info!("[forked] {}", line);
        if let Ok(mut lines) = tail.lock() {
            if lines.len() == OUTPUT_TAIL {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }
}

impl EmbeddedExecutor for ForkedExecutor {
    fn start_server(&mut self, args: Vec<String>) -> Result<()> {
        self.writer.start_server(args)
    }

    fn start_host_controller(&mut self, args: Vec<String>) -> Result<()> {
        self.writer.start_host_controller(args)
    }

    fn start_batch(&mut self) -> Result<()> {
        self.writer.start_batch()
    }

    fn end_batch(&mut self) -> Result<()> {
        self.writer.end_batch()
    }

    fn handle(&mut self, operation: &Operation) -> Result<()> {
        self.writer.handle(operation)
    }

    fn stop_embedded(&mut self) -> Result<()> {
        self.writer.stop_embedded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmr::Address;

    fn recorded() -> ForkedExecutor {
        let mut forked = ForkedExecutor::new();
        forked
            .start_server(vec!["--server-config".into(), "s.xml".into()])
            .unwrap();
        forked
            .handle(&Operation::new("add", Address::root().child("subsystem", "ee")))
            .unwrap();
        forked.stop_embedded().unwrap();
        forked
    }

    #[test]
    fn test_script_text() {
        let script = recorded().script();
        assert!(script.starts_with("standalone\n--server-config,s.xml\n"));
        assert!(script.ends_with("stop\n"));
    }

    #[test]
    fn test_empty_script_does_not_fork() {
        let launcher = ChildLauncher::new("/nonexistent/program", "/opt/server");
        ForkedExecutor::new().run(&launcher).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_child_receives_home_and_script() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("copy.txt");
        let launcher = ChildLauncher::new("/bin/sh", "/opt/server")
            .arg("-c")
            .arg(r#"test "$1" = /opt/server && cp "$2" "$COPY_TO""#)
            .arg("fpack-test")
            .env("COPY_TO", marker.to_string_lossy());

        let forked = recorded();
        let expected = forked.script();
        forked.run(&launcher).unwrap();
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_output_is_drained() {
        let launcher = ChildLauncher::new("/bin/sh", "/opt/server")
            .arg("-c")
            .arg(r"printf 'caf\351\n'; i=0; while [ $i -lt 4000 ]; do echo line $i; i=$((i+1)); done")
            .arg("fpack-test");
        recorded().run(&launcher).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_output_is_lossy_decoded() {
        let launcher = ChildLauncher::new("/bin/sh", "/opt/server")
            .arg("-c")
            .arg(r"printf 'caf\351\n' >&2; exit 1")
            .arg("fpack-test");
        match recorded().run(&launcher).unwrap_err() {
            Error::Forked { output, .. } => assert_eq!(output, "caf\u{fffd}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_child_failure_keeps_output() {
        let launcher = ChildLauncher::new("/bin/sh", "/opt/server")
            .arg("-c")
            .arg("echo first; echo 'script line 3: bad' >&2; exit 3")
            .arg("fpack-test");
        let err = recorded().run(&launcher).unwrap_err();
        match err {
            Error::Forked { status, output } => {
                assert!(status.contains('3'), "{}", status);
                assert!(output.contains("script line 3: bad"), "{}", output);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
