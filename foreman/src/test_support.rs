//! Test-only helpers: deterministic plan builders, a scripted controller,
//! and a throwaway git repository fixture.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};

use crate::core::types::{ControllerOutcome, ControllerTaskSpec};
use crate::io::controller::Controller;
use crate::plan::{Plan, RiskLevel, Step, StepStatus};

/// Fixed timestamp so plan fixtures serialize identically across runs.
pub const FIXED_CREATED_AT: &str = "2025-11-03T09:00:00Z";

/// Create a deterministic LOW-risk step with no dependencies.
pub fn step(id: &str) -> Step {
    Step {
        step_id: id.to_string(),
        title: format!("{id} title"),
        intent: format!("{id} intent"),
        allowed_files: vec![format!("src/{id}.rs")],
        success_criteria: format!("{id} done"),
        dependencies: Vec::new(),
        inputs: Vec::new(),
        verify: None,
        risk_level: RiskLevel::Low,
        rollback_hint: None,
        controller_task_spec: Map::new(),
        status: StepStatus::Pending,
        failure_count: 0,
        outcome: None,
        last_error: None,
        skip_reason: None,
    }
}

/// Create a step that waits on the given dependency ids.
pub fn step_with_deps(id: &str, deps: &[&str]) -> Step {
    Step {
        dependencies: deps.iter().map(|d| (*d).to_string()).collect(),
        ..step(id)
    }
}

/// Create a step at an explicit risk level, with a rollback hint filled in
/// when the level requires one.
pub fn risky_step(id: &str, risk_level: RiskLevel) -> Step {
    Step {
        risk_level,
        rollback_hint: match risk_level {
            RiskLevel::High => Some(format!("revert {id}")),
            RiskLevel::Low | RiskLevel::Med => None,
        },
        ..step(id)
    }
}

/// Create a deterministic plan wrapping the given steps.
pub fn plan(steps: Vec<Step>) -> Plan {
    Plan {
        plan_id: "plan-0feedc0ffee0".to_string(),
        goal: "test goal".to_string(),
        steps,
        version: 1,
        created_at: FIXED_CREATED_AT.to_string(),
        assumptions: Vec::new(),
        constraints: Vec::new(),
    }
}

/// Outcome reporting success for a step, with an empty result payload.
pub fn success_outcome(step_id: &str) -> ControllerOutcome {
    ControllerOutcome {
        step_id: step_id.to_string(),
        success: true,
        error_message: None,
        result: Map::new(),
        diff: None,
        files_touched: Vec::new(),
    }
}

/// Outcome reporting failure for a step.
pub fn failure_outcome(step_id: &str, message: &str) -> ControllerOutcome {
    ControllerOutcome::failure(step_id, message)
}

/// One scripted controller response. The step id is filled in from the
/// dispatched task spec, so scripts cannot drift out of dispatch order.
#[derive(Debug, Clone)]
pub struct ScriptedDispatch {
    pub success: bool,
    pub error_message: Option<String>,
    pub result: Map<String, Value>,
    pub diff: Option<String>,
    pub files_touched: Vec<String>,
}

impl ScriptedDispatch {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: None,
            result: Map::new(),
            diff: None,
            files_touched: Vec::new(),
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            success: false,
            error_message: Some(message.to_string()),
            result: Map::new(),
            diff: None,
            files_touched: Vec::new(),
        }
    }
}

/// Controller double that replays queued responses in FIFO order.
pub struct ScriptedController {
    queue: RefCell<VecDeque<ScriptedDispatch>>,
    executed: RefCell<Vec<String>>,
}

impl ScriptedController {
    pub fn new(dispatches: Vec<ScriptedDispatch>) -> Self {
        Self {
            queue: RefCell::new(dispatches.into()),
            executed: RefCell::new(Vec::new()),
        }
    }

    /// Step ids dispatched so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    pub fn assert_drained(&self) -> Result<(), String> {
        let remaining = self.queue.borrow().len();
        if remaining == 0 {
            Ok(())
        } else {
            Err(format!("{remaining} scripted dispatches left unconsumed"))
        }
    }
}

impl Controller for ScriptedController {
    fn execute(&self, spec: &ControllerTaskSpec) -> Result<ControllerOutcome> {
        self.executed.borrow_mut().push(spec.step_id.clone());
        let scripted = self
            .queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted dispatch left for step '{}'", spec.step_id))?;
        Ok(ControllerOutcome {
            step_id: spec.step_id.clone(),
            success: scripted.success,
            error_message: scripted.error_message,
            result: scripted.result,
            diff: scripted.diff,
            files_touched: scripted.files_touched,
        })
    }
}

/// Throwaway git repository seeded with a couple of committed files.
pub struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["config", "user.email", "tester@example.com"])?;
        repo.git(&["config", "user.name", "Tester"])?;
        repo.write_file("README.md", "# fixture\n")?;
        repo.write_file("src/lib.rs", "pub fn answer() -> u32 { 42 }\n")?;
        repo.commit_all("seed fixture")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create dir for {rel}"))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {rel}"))
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "--quiet", "-m", message])?;
        Ok(())
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(())
    }
}
