//! Step lifecycle state machine.
//!
//! States: `pending -> active -> {done | failed}`; `failed -> pending` (retry
//! reset) or `failed -> skipped`. `done` and `skipped` are terminal. Every
//! transition outside its precondition is a programming error and surfaces as
//! an `Err` with a stable message; callers must not swallow these.

use serde_json::Value;

use crate::core::risk::risk_rule;
use crate::plan::{Plan, Step, StepStatus};

/// A step fails permanently once it has failed this many times. With a
/// ceiling of 2 a step gets exactly one automatic retry.
pub const RETRY_CEILING: u32 = 2;

/// Ok iff the step is pending and every dependency is done.
///
/// A skipped dependency does not satisfy the precondition; dependents of a
/// skipped step stall until the halt check catches them.
pub fn can_activate(step: &Step, plan: &Plan) -> Result<(), String> {
    if step.status != StepStatus::Pending {
        return Err(format!(
            "step '{}' is {}, not pending",
            step.step_id,
            step.status.as_str()
        ));
    }
    for dep_id in &step.dependencies {
        match plan.get_step(dep_id) {
            None => {
                return Err(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.step_id, dep_id
                ));
            }
            Some(dep) if dep.status != StepStatus::Done => {
                return Err(format!(
                    "step '{}' waits on '{}' which is {}",
                    step.step_id,
                    dep_id,
                    dep.status.as_str()
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Activate the step at `idx`. Requires [`can_activate`].
pub fn activate(plan: &mut Plan, idx: usize) -> Result<(), String> {
    let step = plan
        .steps
        .get(idx)
        .ok_or_else(|| format!("no step at index {idx}"))?;
    can_activate(step, plan)?;
    plan.steps[idx].status = StepStatus::Active;
    Ok(())
}

/// Complete an active step, storing the outcome payload.
pub fn complete(step: &mut Step, outcome_payload: Value) -> Result<(), String> {
    if step.status != StepStatus::Active {
        return Err(format!(
            "cannot complete step '{}' from {}",
            step.step_id,
            step.status.as_str()
        ));
    }
    step.status = StepStatus::Done;
    step.outcome = Some(outcome_payload);
    Ok(())
}

/// Fail an active step. Returns whether it may still be retried.
pub fn fail(step: &mut Step, error_message: &str) -> Result<bool, String> {
    if step.status != StepStatus::Active {
        return Err(format!(
            "cannot fail step '{}' from {}",
            step.step_id,
            step.status.as_str()
        ));
    }
    step.status = StepStatus::Failed;
    step.failure_count += 1;
    step.last_error = Some(error_message.to_string());
    Ok(step.failure_count < RETRY_CEILING)
}

/// Return a failed step to pending for another attempt.
///
/// `failure_count` is kept so the ceiling holds across the whole run.
pub fn reset_for_retry(step: &mut Step) -> Result<(), String> {
    if step.status != StepStatus::Failed {
        return Err(format!(
            "cannot reset step '{}' from {}",
            step.step_id,
            step.status.as_str()
        ));
    }
    if step.failure_count >= RETRY_CEILING {
        return Err(format!(
            "step '{}' has no retries left ({} failures)",
            step.step_id, step.failure_count
        ));
    }
    step.status = StepStatus::Pending;
    Ok(())
}

/// Whether the revision policy may skip this step instead of halting.
pub fn can_skip(step: &Step) -> bool {
    risk_rule(step.risk_level).skippable
}

/// Skip a failed step, recording the reason. Refused for high-risk steps.
pub fn skip(step: &mut Step, reason: &str) -> Result<(), String> {
    if step.status != StepStatus::Failed {
        return Err(format!(
            "cannot skip step '{}' from {}",
            step.step_id,
            step.status.as_str()
        ));
    }
    if !can_skip(step) {
        return Err(format!(
            "step '{}' is {} risk and must not be skipped",
            step.step_id,
            step.risk_level.as_str()
        ));
    }
    step.status = StepStatus::Skipped;
    step.skip_reason = Some(reason.to_string());
    Ok(())
}
