//! In-memory bridge for tests.
//!
//! [`MockBridge`] records every bridged call, serves scripted process states
//! and answers operations from configured responses. Clones share state, so a
//! test can hand one clone to a session and inspect the other.

use crate::bridge::{ManagementBridge, RUNNING};
use crate::error::{Error, Result};
use crate::kind::ProcessKind;
use dmr::operation::{OP, STEPS};
use dmr::{ModelNode, response};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// A call received by [`MockBridge`].
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCall {
    /// `create_standalone` with its arguments.
    CreateStandalone(Vec<String>),
    /// `create_host_controller` with its arguments.
    CreateHostController(Vec<String>),
    /// `start`.
    Start,
    /// `stop`.
    Stop,
    /// `process_state`.
    ProcessState,
    /// `management_client`.
    ManagementClient,
    /// `execute` with the submitted operation.
    Execute(ModelNode),
    /// `close`.
    Close,
}

/// Process handle produced by [`MockBridge`].
#[derive(Debug)]
pub struct MockProcess {
    kind: ProcessKind,
    args: Vec<String>,
}

impl MockProcess {
    /// Kind of this process.
    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    /// Arguments the process was created with.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Client handle produced by [`MockBridge`].
#[derive(Debug)]
pub struct MockClient {
    open: bool,
}

#[derive(Debug, Clone)]
enum Poll {
    State(String),
    Unreachable,
    Rejected,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<BridgeCall>,
    /// Scripted poll answers. The last entry repeats.
    states: VecDeque<Poll>,
    results: HashMap<String, ModelNode>,
    failures: HashMap<String, String>,
    fail_start: Option<String>,
    fail_stop: Option<String>,
    fail_close: Option<String>,
    running: bool,
}

/// Recording bridge for tests.
#[derive(Debug, Clone, Default)]
pub struct MockBridge {
    state: Arc<Mutex<MockState>>,
}

impl MockBridge {
    /// A bridge whose processes report `running` immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A bridge whose processes report the given states, one per poll.
    ///
    /// The last state repeats once the sequence is exhausted.
    #[must_use]
    pub fn with_states<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        mock.lock().states = states.into_iter().map(|s| Poll::State(s.into())).collect();
        mock
    }

    /// A bridge whose management interface is never reachable.
    #[must_use]
    pub fn unreachable() -> Self {
        let mock = Self::new();
        mock.lock().states.push_back(Poll::Unreachable);
        mock
    }

    /// Make the next poll fail as if the server could not be reached.
    pub fn push_poll_failure(&self) {
        self.push_poll(Poll::Unreachable);
    }

    /// Make the next poll fail as if the server refused the credentials.
    pub fn push_poll_rejection(&self) {
        self.push_poll(Poll::Rejected);
    }

    fn push_poll(&self, poll: Poll) {
        let mut state = self.lock();
        if state.states.is_empty() {
            state.states.push_back(Poll::State(RUNNING.to_string()));
        }
        state.states.push_front(poll);
    }

    /// Answer operations with this name successfully with `result`.
    pub fn respond(&self, operation: impl Into<String>, result: ModelNode) {
        self.lock().results.insert(operation.into(), result);
    }

    /// Answer operations with this name (including as a composite step) with a failure.
    pub fn fail_operation(&self, operation: impl Into<String>, description: impl Into<String>) {
        self.lock()
            .failures
            .insert(operation.into(), description.into());
    }

    /// Make `start` fail.
    pub fn fail_start(&self, message: impl Into<String>) {
        self.lock().fail_start = Some(message.into());
    }

    /// Make `stop` fail.
    pub fn fail_stop(&self, message: impl Into<String>) {
        self.lock().fail_stop = Some(message.into());
    }

    /// Make `close` fail.
    pub fn fail_close(&self, message: impl Into<String>) {
        self.lock().fail_close = Some(message.into());
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<BridgeCall> {
        self.lock().calls.clone()
    }

    /// Operations submitted through `execute`, in order.
    pub fn executed(&self) -> Vec<ModelNode> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                BridgeCall::Execute(op) => Some(op.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `process_state` polls received.
    pub fn polls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, BridgeCall::ProcessState))
            .count()
    }

    /// Whether a started process has not been stopped yet.
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn failure_for(state: &MockState, operation: &ModelNode) -> Option<String> {
        let name = operation.get(OP).and_then(|n| n.as_str()).unwrap_or_default();
        if let Some(desc) = state.failures.get(name) {
            return Some(desc.clone());
        }
        operation
            .get(STEPS)
            .and_then(|s| s.as_array())
            .into_iter()
            .flatten()
            .find_map(|step| Self::failure_for(state, step))
    }
}

impl ManagementBridge for MockBridge {
    type Process = MockProcess;
    type Client = MockClient;

    fn create_standalone(&self, args: &[String]) -> Result<MockProcess> {
        self.lock()
            .calls
            .push(BridgeCall::CreateStandalone(args.to_vec()));
        Ok(MockProcess {
            kind: ProcessKind::Standalone,
            args: args.to_vec(),
        })
    }

    fn create_host_controller(&self, args: &[String]) -> Result<MockProcess> {
        self.lock()
            .calls
            .push(BridgeCall::CreateHostController(args.to_vec()));
        Ok(MockProcess {
            kind: ProcessKind::HostController,
            args: args.to_vec(),
        })
    }

    fn start(&self, _process: &mut MockProcess) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(BridgeCall::Start);
        if let Some(message) = state.fail_start.clone() {
            return Err(Error::bridge("start", message));
        }
        state.running = true;
        Ok(())
    }

    fn stop(&self, _process: &mut MockProcess) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(BridgeCall::Stop);
        state.running = false;
        match state.fail_stop.clone() {
            Some(message) => Err(Error::bridge("stop", message)),
            None => Ok(()),
        }
    }

    fn process_state(&self, _process: &MockProcess) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(BridgeCall::ProcessState);
        let next = if state.states.len() > 1 {
            state.states.pop_front()
        } else {
            state.states.front().cloned()
        };
        match next.unwrap_or_else(|| Poll::State(RUNNING.to_string())) {
            Poll::State(s) => Ok(s),
            Poll::Unreachable => Err(Error::bridge("process_state", "connection refused")),
            Poll::Rejected => Err(Error::Unauthorized {
                url: "mock:management".to_string(),
                status: 401,
            }),
        }
    }

    fn management_client(&self, _process: &MockProcess) -> Result<MockClient> {
        self.lock().calls.push(BridgeCall::ManagementClient);
        Ok(MockClient { open: true })
    }

    fn execute(&self, client: &mut MockClient, operation: &ModelNode) -> Result<ModelNode> {
        let mut state = self.lock();
        state.calls.push(BridgeCall::Execute(operation.clone()));
        if !client.open {
            return Err(Error::bridge("execute", "management client is closed"));
        }
        if let Some(desc) = Self::failure_for(&state, operation) {
            return Ok(response::failure(desc));
        }
        let name = operation.get(OP).and_then(|n| n.as_str()).unwrap_or_default();
        let result = state.results.get(name).cloned().unwrap_or_default();
        Ok(response::success(result))
    }

    fn close(&self, client: &mut MockClient) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(BridgeCall::Close);
        client.open = false;
        match state.fail_close.clone() {
            Some(message) => Err(Error::bridge("close", message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_sequence_repeats_last() {
        let mock = MockBridge::with_states(["starting", "running"]);
        let process = mock.create_standalone(&[]).unwrap();
        assert_eq!(mock.process_state(&process).unwrap(), "starting");
        assert_eq!(mock.process_state(&process).unwrap(), "running");
        assert_eq!(mock.process_state(&process).unwrap(), "running");
        assert_eq!(mock.polls(), 3);
    }

    #[test]
    fn test_poll_failure() {
        let mock = MockBridge::new();
        mock.push_poll_failure();
        let process = mock.create_standalone(&[]).unwrap();
        assert!(mock.process_state(&process).is_err());
        assert_eq!(mock.process_state(&process).unwrap(), "running");
    }

    #[test]
    fn test_unreachable_never_answers() {
        let mock = MockBridge::unreachable();
        let process = mock.create_standalone(&[]).unwrap();
        for _ in 0..3 {
            assert!(mock.process_state(&process).unwrap_err().is_transient());
        }
    }

    #[test]
    fn test_poll_rejection() {
        let mock = MockBridge::new();
        mock.push_poll_rejection();
        let process = mock.create_standalone(&[]).unwrap();
        assert!(!mock.process_state(&process).unwrap_err().is_transient());
        assert_eq!(mock.process_state(&process).unwrap(), "running");
    }

    #[test]
    fn test_composite_step_failure() {
        let mock = MockBridge::new();
        mock.fail_operation("add", "duplicate resource");
        let process = mock.create_standalone(&[]).unwrap();
        let mut client = mock.management_client(&process).unwrap();
        let resp = mock
            .execute(
                &mut client,
                &json!({"operation": "composite", "steps": [{"operation": "add"}]}),
            )
            .unwrap();
        assert!(!response::is_success(&resp));
        assert_eq!(response::failure_description(&resp), "duplicate resource");
    }

    #[test]
    fn test_respond() {
        let mock = MockBridge::new();
        mock.respond("read-children-names", json!(["primary"]));
        let process = mock.create_host_controller(&[]).unwrap();
        let mut client = mock.management_client(&process).unwrap();
        let resp = mock
            .execute(&mut client, &json!({"operation": "read-children-names"}))
            .unwrap();
        assert_eq!(response::result(&resp), Some(&json!(["primary"])));
    }

    #[test]
    fn test_closed_client_rejects_execute() {
        let mock = MockBridge::new();
        let process = mock.create_standalone(&[]).unwrap();
        let mut client = mock.management_client(&process).unwrap();
        mock.close(&mut client).unwrap();
        assert!(mock.execute(&mut client, &json!({"operation": "x"})).is_err());
    }
}
