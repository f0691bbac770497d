//! Multi-dispatch looping helper for full runs.

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::core::types::PlanState;
use crate::dispatch::{DispatchOutcome, run_dispatch};
use crate::io::artifact_log::PlanArtifactLog;
use crate::io::controller::Controller;
use crate::plan::Plan;
use crate::start::RunContext;

/// Reason why [`run_loop`] stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Every step reached a terminal status.
    Complete,
    /// The run halted (governance, budget, failure policy, or stall).
    Halted { reason: String },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub artifact_id: String,
    pub dispatches: u32,
    pub stop: LoopStop,
    /// Where the finalized artifact landed.
    pub artifact_path: Option<PathBuf>,
}

/// Dispatch repeatedly until the plan completes or halts, then finalize the
/// artifact.
///
/// The loop is bounded by the step budget: every dispatch either charges it
/// or halts the run. Stops immediately on any infrastructure error
/// (artifact I/O, internal invariant violations); the artifact stays open in
/// that case.
pub fn run_loop<C: Controller, F: FnMut(&DispatchOutcome)>(
    plan: &mut Plan,
    state: &mut PlanState,
    ctx: &mut RunContext,
    controller: &C,
    log: &mut PlanArtifactLog,
    mut on_dispatch: F,
) -> Result<LoopOutcome> {
    let mut dispatches = 0u32;
    loop {
        let outcome = run_dispatch(plan, state, ctx, controller, log)?;
        match outcome {
            DispatchOutcome::Dispatched { .. } => {
                dispatches += 1;
                on_dispatch(&outcome);
            }
            DispatchOutcome::Complete => {
                let artifact_path = log.finalize(&ctx.artifact_id, "success")?;
                info!(artifact_id = %ctx.artifact_id, dispatches, "run complete");
                return Ok(LoopOutcome {
                    artifact_id: ctx.artifact_id.clone(),
                    dispatches,
                    stop: LoopStop::Complete,
                    artifact_path,
                });
            }
            DispatchOutcome::Halted { reason } => {
                let artifact_path = log.finalize(&ctx.artifact_id, "halted")?;
                info!(artifact_id = %ctx.artifact_id, dispatches, %reason, "run halted");
                return Ok(LoopOutcome {
                    artifact_id: ctx.artifact_id.clone(),
                    dispatches,
                    stop: LoopStop::Halted { reason },
                    artifact_path,
                });
            }
        }
    }
}
