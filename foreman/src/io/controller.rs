//! Controller abstraction for step execution.
//!
//! The [`Controller`] trait decouples the dispatch loop from whatever backend
//! actually performs a step (an agent harness, a CI job, a human). Tests use
//! scripted controllers that return predetermined outcomes without spawning
//! anything.

use crate::core::types::{ControllerOutcome, ControllerTaskSpec};
use crate::plan::Step;

use anyhow::Result;

/// Abstraction over step execution backends.
///
/// `execute` blocks until the step is done and reports what happened. An
/// `Err` means the controller itself broke (spawn failure, crash); the caller
/// converts that into a failed outcome rather than tearing the run down.
pub trait Controller {
    fn execute(&self, spec: &ControllerTaskSpec) -> Result<ControllerOutcome>;
}

/// Build the outbound message for one step dispatch.
///
/// Carries the step's identity, its opaque `controller_task_spec` payload,
/// and just enough metadata (allowed files, verify command) for the backend
/// to act without re-reading the plan. Lifecycle fields never cross the
/// boundary.
pub fn task_spec_for(step: &Step) -> ControllerTaskSpec {
    ControllerTaskSpec {
        step_id: step.step_id.clone(),
        title: step.title.clone(),
        intent: step.intent.clone(),
        allowed_files: step.allowed_files.clone(),
        verify: step.verify.clone(),
        task: step.controller_task_spec.clone(),
    }
}
