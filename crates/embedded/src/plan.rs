//! Generation plans: the ordered operations that build each configuration.
//!
//! A plan is JSON supplied by the build layer:
//!
//! ```json
//! { "configs": [
//!   { "kind": "standalone",
//!     "args": ["--server-config", "standalone.xml", "--internal-empty-config"],
//!     "batch": true,
//!     "operations": [ { "operation": "add", "address": [ { "subsystem": "ee" } ] } ] } ] }
//! ```
//!
//! [`apply`] replays a plan against any [`EmbeddedExecutor`], so the same
//! plan runs in-process or in a forked child.

use crate::error::{Error, Result, report};
use crate::executor::EmbeddedExecutor;
use crate::kind::{ProcessKind, generation_context};
use dmr::Operation;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Every configuration to generate, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationPlan {
    #[serde(default)]
    pub configs: Vec<PlannedConfig>,
}

/// One embedded-process pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedConfig {
    pub kind: ProcessKind,
    #[serde(default)]
    pub args: Vec<String>,
    /// Submit all operations as one composite.
    #[serde(default)]
    pub batch: bool,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl PlannedConfig {
    /// Short description, e.g. `generate standalone.xml`.
    pub fn label(&self) -> String {
        generation_context(self.kind, &self.args)
    }
}

impl GenerationPlan {
    /// Load a plan from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&content).map_err(|source| Error::Plan {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Total number of operations across all configs.
    pub fn operation_count(&self) -> usize {
        self.configs.iter().map(|c| c.operations.len()).sum()
    }
}

/// Progress notifications while a plan is applied.
pub trait PlanProgress {
    /// Called before the process for `config` is started.
    fn on_config_start(&mut self, index: usize, total: usize, config: &PlannedConfig);

    /// Called after the process for `config` was stopped.
    fn on_config_complete(&mut self, config: &PlannedConfig, success: bool);
}

/// Progress sink that ignores everything.
pub struct NoProgress;

impl PlanProgress for NoProgress {
    fn on_config_start(&mut self, _index: usize, _total: usize, _config: &PlannedConfig) {}
    fn on_config_complete(&mut self, _config: &PlannedConfig, _success: bool) {}
}

/// Apply every config of `plan`, appending `extra_args` to each startup.
///
/// Each config is a strict start, operations, stop sequence. The process is
/// stopped even when an operation fails; the operation failure wins over a
/// failure to stop.
pub fn apply(
    plan: &GenerationPlan,
    extra_args: &[String],
    executor: &mut dyn EmbeddedExecutor,
    progress: &mut dyn PlanProgress,
) -> Result<()> {
    let total = plan.configs.len();
    for (index, config) in plan.configs.iter().enumerate() {
        progress.on_config_start(index, total, config);
        let outcome = apply_config(config, extra_args, executor);
        progress.on_config_complete(config, outcome.is_ok());
        outcome?;
    }
    Ok(())
}

fn apply_config(
    config: &PlannedConfig,
    extra_args: &[String],
    executor: &mut dyn EmbeddedExecutor,
) -> Result<()> {
    let mut args = config.args.clone();
    args.extend(extra_args.iter().cloned());
    debug!(
        "{}: {} operation(s){}",
        config.label(),
        config.operations.len(),
        if config.batch { " in one batch" } else { "" }
    );

    executor.start(config.kind, args)?;
    let outcome = run_operations(config, executor);
    let stopped = executor.stop_embedded();

    match (outcome, stopped) {
        (Err(e), Err(stop_err)) => {
            warn!("Failed to stop after error: {}", report(&stop_err));
            Err(e)
        }
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn run_operations(config: &PlannedConfig, executor: &mut dyn EmbeddedExecutor) -> Result<()> {
    if config.batch {
        executor.start_batch()?;
    }
    for op in &config.operations {
        executor.handle(op)?;
    }
    if config.batch {
        executor.end_batch()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeCall, MockBridge};
    use crate::fork::ForkedExecutor;
    use crate::session::EmbeddedSession;
    use serde_json::json;

    const PLAN: &str = r#"{
        "configs": [
            { "kind": "standalone",
              "args": ["--server-config", "standalone.xml", "--internal-empty-config"],
              "batch": true,
              "operations": [
                { "operation": "add", "address": [{"subsystem": "ee"}] },
                { "operation": "add", "address": [{"subsystem": "logging"}] }
              ] },
            { "kind": "host",
              "args": ["--empty-host-config"],
              "operations": [ { "operation": "add", "address": [{"host": "primary"}] } ] }
        ]
    }"#;

    #[derive(Default)]
    struct Recording {
        events: Vec<(String, Option<bool>)>,
    }

    impl PlanProgress for Recording {
        fn on_config_start(&mut self, _index: usize, _total: usize, config: &PlannedConfig) {
            self.events.push((config.label(), None));
        }

        fn on_config_complete(&mut self, config: &PlannedConfig, success: bool) {
            self.events.push((config.label(), Some(success)));
        }
    }

    fn plan() -> GenerationPlan {
        serde_json::from_str(PLAN).unwrap()
    }

    #[test]
    fn test_load_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(&path, PLAN).unwrap();
        let plan = GenerationPlan::load(&path).unwrap();
        assert_eq!(plan.configs.len(), 2);
        assert_eq!(plan.configs[1].kind, ProcessKind::HostController);
        assert!(!plan.configs[1].batch);
        assert_eq!(plan.operation_count(), 3);
        assert_eq!(plan.configs[0].label(), "generate standalone.xml");
        assert_eq!(plan.configs[1].label(), "generate host.xml");
    }

    #[test]
    fn test_load_rejects_bad_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(&path, r#"{"configs": [{"kind": "cluster"}]}"#).unwrap();
        assert!(matches!(GenerationPlan::load(&path), Err(Error::Plan { .. })));
    }

    #[test]
    fn test_apply_in_process() {
        let mock = MockBridge::new();
        let mut session = EmbeddedSession::new(mock.clone());
        let mut progress = Recording::default();
        apply(&plan(), &["-Dfoo=bar".to_string()], &mut session, &mut progress).unwrap();

        let calls = mock.calls();
        assert_eq!(
            calls[0],
            BridgeCall::CreateStandalone(vec![
                "--server-config".into(),
                "standalone.xml".into(),
                "--internal-empty-config".into(),
                "-Dfoo=bar".into(),
            ])
        );
        let executed = mock.executed();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0]["steps"].as_array().unwrap().len(), 2);
        assert_eq!(executed[1]["address"], json!([{"host": "primary"}]));
        assert!(!mock.is_running());
        assert_eq!(progress.events.len(), 4);
        assert_eq!(progress.events[1].1, Some(true));
    }

    #[test]
    fn test_apply_stops_after_failure() {
        let mock = MockBridge::new();
        mock.fail_operation("add", "duplicate resource");
        let mut session = EmbeddedSession::new(mock.clone());
        let mut progress = Recording::default();
        let err = apply(&plan(), &[], &mut session, &mut progress).unwrap_err();

        assert!(err.to_string().contains("generate standalone.xml"));
        assert!(err.to_string().contains("duplicate resource"));
        assert!(!mock.is_running());
        // the second config is never started
        assert_eq!(progress.events.len(), 2);
        assert_eq!(progress.events[1].1, Some(false));
    }

    #[test]
    fn test_apply_records_script() {
        let mut forked = ForkedExecutor::new();
        apply(&plan(), &[], &mut forked, &mut NoProgress).unwrap();
        let script = forked.script();
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "standalone");
        assert_eq!(lines[2], "batch");
        assert_eq!(lines[5], "run-batch");
        assert_eq!(lines[6], "stop");
        assert_eq!(lines[7], "host");
        assert_eq!(lines[8], "--empty-host-config");
        assert_eq!(lines.last(), Some(&"stop"));
    }
}
