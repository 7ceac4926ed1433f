//! Embedded-process state machine.
//!
//! A session owns at most one embedded process. It moves from
//! [`SessionState::Initial`] to [`SessionState::EmbeddedStarted`] when a
//! process boots, optionally through [`SessionState::Batch`] while a
//! composite is being accumulated, and back to `Initial` on stop.

use crate::bridge::{ManagementBridge, STARTING, STOPPED};
use crate::error::{Error, Result, report};
use crate::executor::EmbeddedExecutor;
use crate::kind::{ProcessKind, generation_context};
use dmr::{Composite, ModelNode, Operation, response};
use log::{debug, info, warn};
use std::mem;
use std::thread;
use std::time::{Duration, Instant};

/// Interval between process-state polls while booting.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Observable phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No process.
    Initial,
    /// A process is running; operations execute immediately.
    EmbeddedStarted,
    /// A process is running and operations are buffered into a composite.
    Batch,
}

struct Running<P, C> {
    kind: ProcessKind,
    args: Vec<String>,
    process: P,
    client: Option<C>,
    batch: Option<Composite>,
}

enum Phase<P, C> {
    Initial,
    Started(Running<P, C>),
}

/// Drives one embedded process through a [`ManagementBridge`].
pub struct EmbeddedSession<B: ManagementBridge> {
    bridge: B,
    boot_timeout: Option<Duration>,
    phase: Phase<B::Process, B::Client>,
}

impl<B: ManagementBridge> EmbeddedSession<B> {
    /// Create a session that waits for boot without a time limit.
    pub fn new(bridge: B) -> Self {
        Self {
            bridge,
            boot_timeout: None,
            phase: Phase::Initial,
        }
    }

    /// Set the boot timeout.
    ///
    /// `None` waits as long as the process reports `starting`; a zero
    /// duration does not wait at all.
    #[must_use]
    pub fn with_boot_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.boot_timeout = timeout;
        self
    }

    /// The bridge this session drives.
    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Current phase.
    pub fn state(&self) -> SessionState {
        match &self.phase {
            Phase::Initial => SessionState::Initial,
            Phase::Started(running) if running.batch.is_some() => SessionState::Batch,
            Phase::Started(_) => SessionState::EmbeddedStarted,
        }
    }

    /// Kind of the running process, if any.
    pub fn running_kind(&self) -> Option<ProcessKind> {
        match &self.phase {
            Phase::Initial => None,
            Phase::Started(running) => Some(running.kind),
        }
    }

    fn launch(&mut self, kind: ProcessKind, args: Vec<String>) -> Result<()> {
        if let Phase::Started(running) = &self.phase {
            return Err(Error::State(format!(
                "cannot start embedded {}: embedded {} is already running",
                kind, running.kind
            )));
        }

        info!("Starting embedded {}", kind);
        debug!("Startup arguments: {:?}", args);
        let started_at = Instant::now();

        let mut process = match kind {
            ProcessKind::Standalone => self.bridge.create_standalone(&args),
            ProcessKind::HostController => self.bridge.create_host_controller(&args),
        }
        .map_err(|e| Error::startup(kind, e))?;

        if let Err(e) = self.bridge.start(&mut process) {
            self.force_stop(kind, &mut process);
            return Err(Error::startup(kind, e));
        }

        let mut client = match self.bridge.management_client(&process) {
            Ok(client) => client,
            Err(e) => {
                self.force_stop(kind, &mut process);
                return Err(Error::startup(kind, e));
            }
        };

        if let Err(e) = self.wait_for_boot(kind, &process, started_at) {
            if let Err(close_err) = self.bridge.close(&mut client) {
                warn!("Failed to close management client: {}", report(&close_err));
            }
            self.force_stop(kind, &mut process);
            return Err(e);
        }

        info!(
            "Embedded {} started in {}ms",
            kind,
            started_at.elapsed().as_millis()
        );
        self.phase = Phase::Started(Running {
            kind,
            args,
            process,
            client: Some(client),
            batch: None,
        });
        Ok(())
    }

    /// Block until the process leaves `starting` or the boot timeout expires.
    ///
    /// Polls that never reached the server are retried until the timeout. A
    /// server that answers with a refusal or garbage fails the start at once.
    /// The caller force-stops the process on any error.
    fn wait_for_boot(&self, kind: ProcessKind, process: &B::Process, started_at: Instant) -> Result<()> {
        let deadline = match self.boot_timeout {
            Some(timeout) if timeout.is_zero() => return Ok(()),
            Some(timeout) => Some(started_at + timeout),
            None => None,
        };

        loop {
            match self.bridge.process_state(process) {
                Ok(state) if state == STOPPED => return Err(Error::StoppedDuringBoot { kind }),
                Ok(state) if state != STARTING => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    debug!("Ignoring failed state poll of embedded {}: {}", kind, report(&e));
                }
                Err(e) => return Err(Error::startup(kind, e)),
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return Err(Error::BootTimeout {
                    kind,
                    secs: started_at.elapsed().as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn force_stop(&self, kind: ProcessKind, process: &mut B::Process) {
        if let Err(e) = self.bridge.stop(process) {
            warn!("Failed to stop embedded {} after startup failure: {}", kind, report(&e));
        }
    }

    fn running(&mut self, action: &str) -> Result<&mut Running<B::Process, B::Client>> {
        match &mut self.phase {
            Phase::Started(running) => Ok(running),
            Phase::Initial => Err(Error::State(format!(
                "cannot {}: no embedded process is running",
                action
            ))),
        }
    }

    /// Submit an operation directly, bypassing any open batch.
    ///
    /// Returns the `result` payload of a successful response.
    pub fn execute(&mut self, operation: &Operation) -> Result<ModelNode> {
        let bridge = &self.bridge;
        let running = match &mut self.phase {
            Phase::Started(running) => running,
            Phase::Initial => {
                return Err(Error::State(format!(
                    "cannot execute {}: no embedded process is running",
                    operation
                )));
            }
        };
        submit(bridge, running, operation, &operation.to_string())
    }
}

fn submit<B: ManagementBridge>(
    bridge: &B,
    running: &mut Running<B::Process, B::Client>,
    operation: &Operation,
    label: &str,
) -> Result<ModelNode> {
    let client = running
        .client
        .as_mut()
        .ok_or_else(|| Error::State("management client is closed".to_string()))?;
    debug!("Executing {}", label);
    let resp = bridge.execute(client, &operation.to_model())?;
    if response::is_success(&resp) {
        return Ok(response::result(&resp).cloned().unwrap_or_default());
    }
    Err(Error::OperationFailed {
        context: generation_context(running.kind, &running.args),
        operation: label.to_string(),
        description: response::failure_description(&resp),
    })
}

impl<B: ManagementBridge> EmbeddedExecutor for EmbeddedSession<B> {
    fn start_server(&mut self, args: Vec<String>) -> Result<()> {
        self.launch(ProcessKind::Standalone, args)
    }

    fn start_host_controller(&mut self, args: Vec<String>) -> Result<()> {
        self.launch(ProcessKind::HostController, args)
    }

    fn start_batch(&mut self) -> Result<()> {
        let running = self.running("start a batch")?;
        if running.batch.is_some() {
            return Err(Error::State("a batch is already open; batches do not nest".to_string()));
        }
        running.batch = Some(Composite::new());
        Ok(())
    }

    fn end_batch(&mut self) -> Result<()> {
        let bridge = &self.bridge;
        let running = match &mut self.phase {
            Phase::Started(running) => running,
            Phase::Initial => {
                return Err(Error::State(
                    "cannot run a batch: no embedded process is running".to_string(),
                ));
            }
        };
        let batch = running
            .batch
            .take()
            .ok_or_else(|| Error::State("no batch is open".to_string()))?;
        let label = format!("batch of {} operation(s)", batch.len());
        submit(bridge, running, &batch.to_operation(), &label).map(|_| ())
    }

    fn handle(&mut self, operation: &Operation) -> Result<()> {
        let bridge = &self.bridge;
        let running = match &mut self.phase {
            Phase::Started(running) => running,
            Phase::Initial => {
                return Err(Error::State(format!(
                    "cannot handle {}: no embedded process is running",
                    operation
                )));
            }
        };
        if let Some(batch) = running.batch.as_mut() {
            batch.add_step(operation.clone());
            return Ok(());
        }
        submit(bridge, running, operation, &operation.to_string()).map(|_| ())
    }

    /// Close the client, then stop the process.
    ///
    /// Both steps run even if the first fails; the session is back in
    /// `Initial` afterwards and the first failure is returned. Stopping an
    /// idle session does nothing.
    fn stop_embedded(&mut self) -> Result<()> {
        let mut running = match mem::replace(&mut self.phase, Phase::Initial) {
            Phase::Started(running) => running,
            Phase::Initial => {
                debug!("No embedded process to stop");
                return Ok(());
            }
        };
        if let Some(batch) = &running.batch {
            warn!("Discarding unsubmitted batch of {} operation(s)", batch.len());
        }

        info!("Stopping embedded {}", running.kind);
        let mut first_error = None;
        if let Some(mut client) = running.client.take()
            && let Err(e) = self.bridge.close(&mut client)
        {
            first_error = Some(e);
        }
        if let Err(e) = self.bridge.stop(&mut running.process) {
            match first_error {
                None => first_error = Some(e),
                Some(_) => warn!("Failed to stop embedded {}: {}", running.kind, report(&e)),
            }
        }

        match first_error {
            Some(e) => Err(Error::Stop {
                kind: running.kind,
                source: Box::new(e),
            }),
            None => Ok(()),
        }
    }
}

impl<B: ManagementBridge> Drop for EmbeddedSession<B> {
    fn drop(&mut self) {
        if matches!(self.phase, Phase::Started(_))
            && let Err(e) = self.stop_embedded()
        {
            warn!("{}", report(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeCall, MockBridge};
    use dmr::Address;
    use serde_json::json;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn add(name: &str) -> Operation {
        Operation::new("add", Address::root().child("subsystem", name))
    }

    #[test]
    fn test_start_and_stop() {
        let mock = MockBridge::new();
        let mut session = EmbeddedSession::new(mock.clone());
        session.start_server(args(&["--server-config", "a.xml"])).unwrap();
        assert_eq!(session.state(), SessionState::EmbeddedStarted);
        assert_eq!(session.running_kind(), Some(ProcessKind::Standalone));
        assert!(mock.is_running());

        session.stop_embedded().unwrap();
        assert_eq!(session.state(), SessionState::Initial);
        assert!(!mock.is_running());
        assert_eq!(
            mock.calls(),
            vec![
                BridgeCall::CreateStandalone(args(&["--server-config", "a.xml"])),
                BridgeCall::Start,
                BridgeCall::ManagementClient,
                BridgeCall::ProcessState,
                BridgeCall::Close,
                BridgeCall::Stop,
            ]
        );
    }

    #[test]
    fn test_second_start_is_rejected() {
        let mut session = EmbeddedSession::new(MockBridge::new());
        session.start_server(Vec::new()).unwrap();
        let err = session.start_host_controller(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::State(_)));
        assert_eq!(session.running_kind(), Some(ProcessKind::Standalone));
    }

    #[test]
    fn test_waits_while_starting() {
        let mock = MockBridge::with_states(["starting", "starting", "running"]);
        let mut session = EmbeddedSession::new(mock.clone());
        session.start_host_controller(Vec::new()).unwrap();
        assert_eq!(mock.polls(), 3);
    }

    #[test]
    fn test_poll_failures_are_retried() {
        let mock = MockBridge::with_states(["starting", "running"]);
        mock.push_poll_failure();
        mock.push_poll_failure();
        let mut session =
            EmbeddedSession::new(mock.clone()).with_boot_timeout(Some(Duration::from_secs(5)));
        session.start_server(Vec::new()).unwrap();
        assert_eq!(mock.polls(), 4);
    }

    #[test]
    fn test_zero_timeout_does_not_wait() {
        let mock = MockBridge::with_states(["starting"]);
        let mut session = EmbeddedSession::new(mock.clone()).with_boot_timeout(Some(Duration::ZERO));
        let begin = Instant::now();
        session.start_server(Vec::new()).unwrap();
        assert!(begin.elapsed() < POLL_INTERVAL);
        assert_eq!(mock.polls(), 0);
        assert_eq!(session.state(), SessionState::EmbeddedStarted);
    }

    #[test]
    fn test_boot_timeout_stops_process() {
        let mock = MockBridge::with_states(["starting"]);
        let timeout = Duration::from_millis(200);
        let mut session = EmbeddedSession::new(mock.clone()).with_boot_timeout(Some(timeout));
        let begin = Instant::now();
        let err = session.start_server(Vec::new()).unwrap_err();
        let elapsed = begin.elapsed();

        assert!(matches!(err, Error::BootTimeout { kind: ProcessKind::Standalone, .. }));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + POLL_INTERVAL * 4);
        assert!(!mock.is_running());
        assert_eq!(mock.calls().last(), Some(&BridgeCall::Stop));
        assert_eq!(session.state(), SessionState::Initial);
    }

    #[test]
    fn test_unreachable_server_times_out_and_stops() {
        let mock = MockBridge::unreachable();
        let timeout = Duration::from_millis(200);
        let mut session = EmbeddedSession::new(mock.clone()).with_boot_timeout(Some(timeout));
        let begin = Instant::now();
        let err = session.start_server(Vec::new()).unwrap_err();

        assert!(matches!(err, Error::BootTimeout { kind: ProcessKind::Standalone, .. }));
        assert!(begin.elapsed() >= timeout);
        assert!(mock.polls() > 1);
        assert!(!mock.is_running());
        assert_eq!(mock.calls().last(), Some(&BridgeCall::Stop));
        assert_eq!(session.state(), SessionState::Initial);
    }

    #[test]
    fn test_rejected_poll_fails_without_waiting() {
        let mock = MockBridge::with_states(["starting"]);
        mock.push_poll_rejection();
        let mut session = EmbeddedSession::new(mock.clone());
        let err = session.start_server(Vec::new()).unwrap_err();

        match err {
            Error::Startup { source, .. } => assert!(matches!(*source, Error::Unauthorized { .. })),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(mock.polls(), 1);
        assert!(!mock.is_running());
        assert_eq!(session.state(), SessionState::Initial);
    }

    #[test]
    fn test_stopped_during_boot() {
        let mock = MockBridge::with_states(["starting", "stopped"]);
        let mut session = EmbeddedSession::new(mock.clone());
        let err = session.start_server(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::StoppedDuringBoot { .. }));
        assert!(!mock.is_running());
    }

    #[test]
    fn test_start_failure_is_wrapped_and_cleaned_up() {
        let mock = MockBridge::new();
        mock.fail_start("no such file");
        let mut session = EmbeddedSession::new(mock.clone());
        let err = session.start_server(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Startup { .. }));
        assert!(mock.calls().contains(&BridgeCall::Stop));
        assert_eq!(session.state(), SessionState::Initial);
    }

    #[test]
    fn test_handle_executes_immediately() {
        let mock = MockBridge::new();
        let mut session = EmbeddedSession::new(mock.clone());
        session.start_server(Vec::new()).unwrap();
        session.handle(&add("ee")).unwrap();
        assert_eq!(
            mock.executed(),
            vec![json!({"operation": "add", "address": [{"subsystem": "ee"}]})]
        );
    }

    #[test]
    fn test_batch_is_submitted_as_one_composite() {
        let mock = MockBridge::new();
        let mut session = EmbeddedSession::new(mock.clone());
        session.start_server(Vec::new()).unwrap();
        session.start_batch().unwrap();
        assert_eq!(session.state(), SessionState::Batch);
        session.handle(&add("a")).unwrap();
        session.handle(&add("b")).unwrap();
        assert!(mock.executed().is_empty());

        session.end_batch().unwrap();
        assert_eq!(session.state(), SessionState::EmbeddedStarted);
        let executed = mock.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0]["operation"], json!("composite"));
        assert_eq!(executed[0]["steps"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_batch_succeeds() {
        let mock = MockBridge::new();
        let mut session = EmbeddedSession::new(mock.clone());
        session.start_server(Vec::new()).unwrap();
        session.start_batch().unwrap();
        session.end_batch().unwrap();
        assert_eq!(mock.executed()[0]["steps"], json!([]));
    }

    #[test]
    fn test_batches_do_not_nest() {
        let mut session = EmbeddedSession::new(MockBridge::new());
        session.start_server(Vec::new()).unwrap();
        session.start_batch().unwrap();
        assert!(matches!(session.start_batch(), Err(Error::State(_))));
        assert!(matches!(session.end_batch(), Ok(())));
        assert!(matches!(session.end_batch(), Err(Error::State(_))));
    }

    #[test]
    fn test_calls_require_running_process() {
        let mut session = EmbeddedSession::new(MockBridge::new());
        assert!(matches!(session.handle(&add("a")), Err(Error::State(_))));
        assert!(matches!(session.start_batch(), Err(Error::State(_))));
        assert!(matches!(session.end_batch(), Err(Error::State(_))));
        assert!(session.stop_embedded().is_ok());
    }

    #[test]
    fn test_failure_names_generated_config() {
        let mock = MockBridge::new();
        mock.fail_operation("add", "WFLYCTL0030: No resource definition is registered");
        let mut session = EmbeddedSession::new(mock);
        session
            .start_server(args(&["--server-config", "foo.xml", "--internal-empty-config"]))
            .unwrap();
        let err = session.handle(&add("x")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("generate foo.xml"), "{}", msg);
        assert!(msg.contains("/subsystem=x:add"), "{}", msg);
        assert!(msg.contains("WFLYCTL0030: No resource definition is registered"));
        // diagnostics only; the process keeps running
        assert_eq!(session.state(), SessionState::EmbeddedStarted);
    }

    #[test]
    fn test_failure_without_empty_config_executes_script() {
        let mock = MockBridge::new();
        mock.fail_operation("add", "boom");
        let mut session = EmbeddedSession::new(mock);
        session.start_server(args(&["--server-config", "foo.xml"])).unwrap();
        let msg = session.handle(&add("x")).unwrap_err().to_string();
        assert!(msg.contains("execute script"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_stop_attempts_both_steps() {
        let mock = MockBridge::new();
        mock.fail_close("broken pipe");
        mock.fail_stop("kill failed");
        let mut session = EmbeddedSession::new(mock.clone());
        session.start_server(Vec::new()).unwrap();

        let err = session.stop_embedded().unwrap_err();
        assert!(matches!(err, Error::Stop { .. }));
        assert_eq!(session.state(), SessionState::Initial);
        let calls = mock.calls();
        assert!(calls.contains(&BridgeCall::Close));
        assert!(calls.contains(&BridgeCall::Stop));
    }

    #[test]
    fn test_execute_returns_result() {
        let mock = MockBridge::new();
        mock.respond("read-children-names", json!(["primary"]));
        let mut session = EmbeddedSession::new(mock);
        session.start_host_controller(Vec::new()).unwrap();
        let result = session
            .execute(&Operation::new("read-children-names", Address::root()).param("child-type", "host"))
            .unwrap();
        assert_eq!(result, json!(["primary"]));
    }

    #[test]
    fn test_drop_stops_process() {
        let mock = MockBridge::new();
        {
            let mut session = EmbeddedSession::new(mock.clone());
            session.start_server(Vec::new()).unwrap();
        }
        assert!(!mock.is_running());
    }
}
