//! One dispatch/outcome exchange with the controller.
//!
//! A dispatch is the engine's unit of progress: pick a step, hand its task
//! spec to the controller, record what came back, apply it, and let the
//! revision policy react to failure. Exactly one step is in flight at a
//! time.

use std::time::Instant;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::halt::{HaltReason, check_halt};
use crate::core::scheduler::{Applied, halt_run, is_complete, next_step, revise_plan, update_state};
use crate::core::types::{ControllerOutcome, PlanState};
use crate::io::artifact_log::PlanArtifactLog;
use crate::io::controller::{Controller, task_spec_for};
use crate::plan::Plan;
use crate::start::RunContext;

/// What one call to [`run_dispatch`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A step was dispatched and its outcome applied. Halts discovered while
    /// applying it surface on the next call.
    Dispatched { step_id: String, success: bool },
    /// Every step is terminal; nothing left to do.
    Complete,
    /// The run is halted and must not dispatch again.
    Halted { reason: String },
}

/// Perform at most one dispatch/outcome exchange.
///
/// A stalled run (nothing terminal left to reach, nothing activatable) is
/// halted here, since waiting cannot unblock it.
#[instrument(skip_all, fields(plan_id = %plan.plan_id))]
pub fn run_dispatch<C: Controller>(
    plan: &mut Plan,
    state: &mut PlanState,
    ctx: &mut RunContext,
    controller: &C,
    log: &mut PlanArtifactLog,
) -> Result<DispatchOutcome> {
    if state.halted {
        return Ok(DispatchOutcome::Halted {
            reason: halt_reason_text(state),
        });
    }
    if is_complete(plan, state) {
        return Ok(DispatchOutcome::Complete);
    }

    let selected = next_step(plan, state).map_err(|err| anyhow!(err))?;
    let Some(step) = selected else {
        let blocked: Vec<&str> = plan
            .steps
            .iter()
            .filter(|step| !step.status.is_terminal())
            .map(|step| step.step_id.as_str())
            .collect();
        warn!(?blocked, "no activatable steps remain, halting");
        halt_run(
            state,
            format!(
                "stalled: no activatable steps remain ({})",
                blocked.join(", ")
            ),
        );
        return Ok(DispatchOutcome::Halted {
            reason: halt_reason_text(state),
        });
    };
    let spec = task_spec_for(step);

    info!(step_id = %spec.step_id, "dispatching step");
    let started = Instant::now();
    let outcome = match controller.execute(&spec) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(step_id = %spec.step_id, error = %err, "controller failed, recording failure");
            ControllerOutcome::failure(&spec.step_id, &format!("controller error: {err:#}"))
        }
    };
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    log.record_step(
        &ctx.artifact_id,
        &spec,
        &outcome,
        outcome.diff.as_deref(),
        elapsed_ms,
        &outcome.files_touched,
    )?;

    let applied = update_state(plan, state, &outcome, &ctx.halt).map_err(|err| anyhow!(err))?;
    if let Applied::Failed { step_id, .. } = &applied
        && !state.halted
    {
        let revision = revise_plan(plan, state, step_id).map_err(|err| anyhow!(err))?;
        debug!(step_id = %step_id, ?revision, "revised plan after failure");
    }

    let files = u32::try_from(outcome.files_touched.len()).unwrap_or(u32::MAX);
    if let Err(breach) = ctx.budget.charge_step(files, elapsed_ms) {
        let reason = HaltReason::BudgetExhausted(breach).describe();
        warn!(%reason, "budget exhausted");
        halt_run(state, reason);
    }
    if !state.halted
        && let Some(reason) = check_halt(&ctx.halt, state, &ctx.budget)
    {
        halt_run(state, reason.describe());
    }

    debug!(step_id = %spec.step_id, success = outcome.success, elapsed_ms, "dispatch finished");
    Ok(DispatchOutcome::Dispatched {
        step_id: spec.step_id,
        success: outcome.success,
    })
}

fn halt_reason_text(state: &PlanState) -> String {
    state
        .halt_reason
        .clone()
        .unwrap_or_else(|| "halted".to_string())
}
