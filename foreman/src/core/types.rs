//! Shared deterministic types for the engine core.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mutable execution state accompanying one plan run.
///
/// Created fresh per run, mutated only by the scheduler (and by run start when
/// a plan is rejected), discarded or archived via the artifact log at run end.
/// Budget and halt state belong to exactly one run; never share a state object
/// across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanState {
    /// Index of the most recently activated step, if any.
    pub current_step_idx: Option<usize>,
    /// Step ids completed so far, in completion order.
    pub completed_steps: Vec<String>,
    /// Step ids that reported failure, in failure order (repeats allowed).
    pub failed_steps: Vec<String>,
    /// Failures since the last success. Reset to 0 on any success.
    pub consecutive_failures: u32,
    pub revision_count: u32,
    pub halted: bool,
    pub halt_reason: Option<String>,
}

/// Outbound message handed to the controller for one step dispatch.
///
/// Carries enough step metadata for the controller to act without re-reading
/// the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerTaskSpec {
    pub step_id: String,
    pub title: String,
    pub intent: String,
    pub allowed_files: Vec<String>,
    pub verify: Option<String>,
    /// The step's opaque `controller_task_spec` payload, passed through
    /// uninterpreted.
    pub task: Map<String, Value>,
}

/// Inbound message reporting what the controller did with one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerOutcome {
    pub step_id: String,
    pub success: bool,
    /// Present iff `success` is false.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Free-form result payload.
    #[serde(default)]
    pub result: Map<String, Value>,
    /// Raw produced diff. Never persisted verbatim; the artifact log records a
    /// truncated content hash instead.
    #[serde(default)]
    pub diff: Option<String>,
    #[serde(default)]
    pub files_touched: Vec<String>,
}

impl ControllerOutcome {
    /// Outcome synthesized when the controller itself errs (spawn failure,
    /// crash, abandoned run). Treated like any other step failure.
    pub fn failure(step_id: &str, error_message: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            success: false,
            error_message: Some(error_message.to_string()),
            result: Map::new(),
            diff: None,
            files_touched: Vec::new(),
        }
    }
}

/// Read-only projection of a run for reporting. No side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub plan_id: String,
    pub goal: String,
    pub version: u32,
    pub total_steps: usize,
    pub completed: usize,
    pub failed: usize,
    pub revision_count: u32,
    pub halted: bool,
    pub halt_reason: Option<String>,
    pub is_complete: bool,
}
