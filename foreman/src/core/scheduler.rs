//! Next-step selection, outcome application, and the revision policy.
//!
//! These operations are synchronous state transitions over a plan and its
//! run state; dispatching to the controller and waiting for its outcome
//! happen entirely on the caller's side.

use serde_json::Value;

use crate::core::halt::HaltSpec;
use crate::core::lifecycle;
use crate::core::types::{ControllerOutcome, PlanState, PlanSummary};
use crate::plan::{Plan, Step, StepStatus};

/// Fixed reason recorded when the revision policy skips a step.
pub const SKIP_REASON: &str = "skipped after retry ceiling";

/// What [`update_state`] did with an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Completed { step_id: String },
    Failed { step_id: String, can_retry: bool },
    /// The outcome referenced a step this plan does not contain. State is
    /// unchanged; usually a stale report from an already-finished run.
    UnknownStep { step_id: String },
}

/// Revision decision taken after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    Retried,
    Skipped,
    Unchanged,
}

/// Select the step to dispatch next, if any.
///
/// The currently active step, when one exists, is returned unchanged, so
/// re-entrant calls before an outcome arrives cannot double-dispatch.
/// Otherwise the first pending step (plan list order) whose dependencies are
/// all done is activated and returned. `None` means halted, stalled, or
/// finished; callers distinguish via [`is_complete`]. An `Err` is an internal
/// invariant violation, not a schedulable condition.
pub fn next_step<'a>(
    plan: &'a mut Plan,
    state: &mut PlanState,
) -> Result<Option<&'a Step>, String> {
    if state.halted {
        return Ok(None);
    }
    if let Some(idx) = plan
        .steps
        .iter()
        .position(|step| step.status == StepStatus::Active)
    {
        state.current_step_idx = Some(idx);
        return Ok(Some(&plan.steps[idx]));
    }
    let candidate = plan.steps.iter().position(|step| {
        step.status == StepStatus::Pending && lifecycle::can_activate(step, plan).is_ok()
    });
    match candidate {
        Some(idx) => {
            lifecycle::activate(plan, idx)?;
            state.current_step_idx = Some(idx);
            Ok(Some(&plan.steps[idx]))
        }
        None => Ok(None),
    }
}

/// Apply a controller outcome to the plan and run state.
///
/// Failures may halt the run: when the step has exhausted its retries and the
/// skip policy cannot rescue it, or when `consecutive_failures` reaches the
/// halt threshold (a global volatility guard that catches cascades across
/// different steps, independent of any single step's retry budget).
pub fn update_state(
    plan: &mut Plan,
    state: &mut PlanState,
    outcome: &ControllerOutcome,
    halt: &HaltSpec,
) -> Result<Applied, String> {
    let Some(idx) = plan.step_index(&outcome.step_id) else {
        return Ok(Applied::UnknownStep {
            step_id: outcome.step_id.clone(),
        });
    };

    if outcome.success {
        lifecycle::complete(&mut plan.steps[idx], Value::Object(outcome.result.clone()))?;
        state.completed_steps.push(outcome.step_id.clone());
        state.consecutive_failures = 0;
        return Ok(Applied::Completed {
            step_id: outcome.step_id.clone(),
        });
    }

    let message = outcome.error_message.as_deref().unwrap_or("unknown error");
    let can_retry = lifecycle::fail(&mut plan.steps[idx], message)?;
    state.failed_steps.push(outcome.step_id.clone());
    state.consecutive_failures += 1;

    if !can_retry && !lifecycle::can_skip(&plan.steps[idx]) {
        halt_run(
            state,
            format!(
                "step '{}' failed {} times and cannot be skipped",
                outcome.step_id, plan.steps[idx].failure_count
            ),
        );
    } else if state.consecutive_failures >= halt.max_consecutive_failures {
        halt_run(
            state,
            format!(
                "{} consecutive failures across the plan",
                state.consecutive_failures
            ),
        );
    }

    Ok(Applied::Failed {
        step_id: outcome.step_id.clone(),
        can_retry,
    })
}

/// Decide a failed step's future: retry once, then skip if safe, then give
/// up and leave the plan to halt. Strictly escalating; a step is never
/// retried more than once and later failures change nothing.
pub fn revise_plan(
    plan: &mut Plan,
    state: &mut PlanState,
    failed_step_id: &str,
) -> Result<Revision, String> {
    let Some(idx) = plan.step_index(failed_step_id) else {
        return Ok(Revision::Unchanged);
    };
    match plan.steps[idx].failure_count {
        1 => {
            lifecycle::reset_for_retry(&mut plan.steps[idx])?;
            state.revision_count += 1;
            state.consecutive_failures = 0;
            plan.version += 1;
            Ok(Revision::Retried)
        }
        2 if lifecycle::can_skip(&plan.steps[idx]) => {
            lifecycle::skip(&mut plan.steps[idx], SKIP_REASON)?;
            state.revision_count += 1;
            plan.version += 1;
            Ok(Revision::Skipped)
        }
        _ => Ok(Revision::Unchanged),
    }
}

/// True once the run can go no further: halted, or every step terminal.
pub fn is_complete(plan: &Plan, state: &PlanState) -> bool {
    state.halted || plan.steps.iter().all(|step| step.status.is_terminal())
}

/// Mark the run halted. The first reason wins; halting never un-happens.
pub fn halt_run(state: &mut PlanState, reason: String) {
    if state.halted {
        return;
    }
    state.halted = true;
    state.halt_reason = Some(reason);
}

/// Read-only counts and halt status for reporting.
pub fn plan_summary(plan: &Plan, state: &PlanState) -> PlanSummary {
    PlanSummary {
        plan_id: plan.plan_id.clone(),
        goal: plan.goal.clone(),
        version: plan.version,
        total_steps: plan.steps.len(),
        completed: state.completed_steps.len(),
        failed: state.failed_steps.len(),
        revision_count: state.revision_count,
        halted: state.halted,
        halt_reason: state.halt_reason.clone(),
        is_complete: is_complete(plan, state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::RiskLevel;
    use crate::test_support::{
        failure_outcome, plan, risky_step, step, step_with_deps, success_outcome,
    };

    /// Re-entrant `next_step` returns the same active step, never a second one.
    #[test]
    fn next_step_is_idempotent_while_a_step_is_active() {
        let mut p = plan(vec![step("a"), step("b")]);
        let mut state = PlanState::default();

        let first = next_step(&mut p, &mut state)
            .expect("select")
            .expect("step")
            .step_id
            .clone();
        let second = next_step(&mut p, &mut state)
            .expect("select")
            .expect("step")
            .step_id
            .clone();
        assert_eq!(first, "a");
        assert_eq!(second, "a");
        assert_eq!(
            p.steps
                .iter()
                .filter(|s| s.status == StepStatus::Active)
                .count(),
            1
        );
    }

    /// Ties among ready steps break by plan list order, not dependency depth.
    #[test]
    fn next_step_prefers_list_order_among_ready_steps() {
        let mut p = plan(vec![step("a"), step("b")]);
        let mut state = PlanState::default();

        let selected = next_step(&mut p, &mut state).expect("select").expect("step");
        assert_eq!(selected.step_id, "a");
        assert_eq!(state.current_step_idx, Some(0));
    }

    #[test]
    fn next_step_waits_for_dependencies() {
        let mut p = plan(vec![step_with_deps("b", &["a"]), step("a")]);
        let mut state = PlanState::default();

        // "b" is first in list order but blocked; "a" is the only candidate.
        let selected = next_step(&mut p, &mut state).expect("select").expect("step");
        assert_eq!(selected.step_id, "a");
    }

    /// Once halted, `next_step` returns none forever with that state object.
    #[test]
    fn next_step_returns_none_after_halt() {
        let mut p = plan(vec![step("a")]);
        let mut state = PlanState::default();
        halt_run(&mut state, "stop".to_string());

        assert!(next_step(&mut p, &mut state).expect("select").is_none());
        assert!(next_step(&mut p, &mut state).expect("select").is_none());
    }

    #[test]
    fn next_step_returns_none_when_stalled() {
        let mut p = plan(vec![step("a"), step_with_deps("b", &["a"])]);
        let mut state = PlanState::default();

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("a", "boom"),
            &HaltSpec::default(),
        )
        .expect("update");
        revise_plan(&mut p, &mut state, "a").expect("revise");
        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("a", "boom again"),
            &HaltSpec::default(),
        )
        .expect("update");
        revise_plan(&mut p, &mut state, "a").expect("revise");

        // "a" is skipped, so "b" can never activate: stalled, not complete.
        assert!(next_step(&mut p, &mut state).expect("select").is_none());
        assert!(!is_complete(&p, &state));
    }

    #[test]
    fn unknown_step_outcome_is_a_noop() {
        let mut p = plan(vec![step("a")]);
        let mut state = PlanState::default();

        let applied = update_state(
            &mut p,
            &mut state,
            &success_outcome("ghost"),
            &HaltSpec::default(),
        )
        .expect("update");
        assert_eq!(
            applied,
            Applied::UnknownStep {
                step_id: "ghost".to_string()
            }
        );
        assert_eq!(state, PlanState::default());
    }

    #[test]
    fn success_completes_and_resets_consecutive_failures() {
        let mut p = plan(vec![step("a"), step("b")]);
        let mut state = PlanState {
            consecutive_failures: 1,
            ..PlanState::default()
        };

        next_step(&mut p, &mut state).expect("select");
        let applied = update_state(
            &mut p,
            &mut state,
            &success_outcome("a"),
            &HaltSpec::default(),
        )
        .expect("update");
        assert_eq!(
            applied,
            Applied::Completed {
                step_id: "a".to_string()
            }
        );
        assert_eq!(p.steps[0].status, StepStatus::Done);
        assert_eq!(state.completed_steps, vec!["a".to_string()]);
        assert_eq!(state.consecutive_failures, 0);
    }

    /// An exhausted step that cannot be skipped halts the run.
    #[test]
    fn exhausted_unskippable_step_halts() {
        let mut p = plan(vec![risky_step("deploy", RiskLevel::High)]);
        let mut state = PlanState::default();

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("deploy", "boom"),
            &HaltSpec::default(),
        )
        .expect("update");
        revise_plan(&mut p, &mut state, "deploy").expect("revise");
        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("deploy", "boom again"),
            &HaltSpec::default(),
        )
        .expect("update");

        assert!(state.halted);
        assert!(
            state
                .halt_reason
                .as_deref()
                .expect("reason")
                .contains("cannot be skipped")
        );
    }

    /// An exhausted step the policy can skip does not halt the run.
    #[test]
    fn exhausted_skippable_step_leaves_run_alive() {
        let mut p = plan(vec![step("a"), step("b")]);
        let mut state = PlanState::default();

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("a", "boom"),
            &HaltSpec::default(),
        )
        .expect("update");
        revise_plan(&mut p, &mut state, "a").expect("revise");
        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("a", "boom again"),
            &HaltSpec::default(),
        )
        .expect("update");

        assert!(!state.halted);
        let revision = revise_plan(&mut p, &mut state, "a").expect("revise");
        assert_eq!(revision, Revision::Skipped);
        assert_eq!(p.steps[0].status, StepStatus::Skipped);

        // The run moves on to "b".
        let selected = next_step(&mut p, &mut state).expect("select").expect("step");
        assert_eq!(selected.step_id, "b");
    }

    /// Two single failures on different steps trip the global guard even
    /// though neither step exhausted its own retries.
    #[test]
    fn consecutive_failures_across_steps_halt_without_revision() {
        let mut p = plan(vec![step("a"), step("b")]);
        let mut state = PlanState::default();

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("a", "boom"),
            &HaltSpec::default(),
        )
        .expect("update");
        assert!(!state.halted);

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("b", "boom"),
            &HaltSpec::default(),
        )
        .expect("update");

        assert!(state.halted);
        assert_eq!(state.consecutive_failures, 2);
        assert!(
            state
                .halt_reason
                .as_deref()
                .expect("reason")
                .contains("consecutive failures")
        );
        assert_eq!(p.steps[0].failure_count, 1);
        assert_eq!(p.steps[1].failure_count, 1);
    }

    #[test]
    fn revision_escalates_retry_then_skip() {
        let mut p = plan(vec![step("a")]);
        let mut state = PlanState::default();

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("a", "first"),
            &HaltSpec::default(),
        )
        .expect("update");
        assert_eq!(
            revise_plan(&mut p, &mut state, "a").expect("revise"),
            Revision::Retried
        );
        assert_eq!(p.steps[0].status, StepStatus::Pending);
        assert_eq!(state.revision_count, 1);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(p.version, 2);

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("a", "second"),
            &HaltSpec::default(),
        )
        .expect("update");
        assert_eq!(
            revise_plan(&mut p, &mut state, "a").expect("revise"),
            Revision::Skipped
        );
        assert_eq!(p.steps[0].skip_reason.as_deref(), Some(SKIP_REASON));
        assert_eq!(state.revision_count, 2);
        assert_eq!(p.version, 3);
    }

    /// After the second failure of an unskippable step (or any later failure)
    /// revision changes nothing.
    #[test]
    fn revision_gives_up_after_the_ceiling() {
        let mut p = plan(vec![risky_step("deploy", RiskLevel::High)]);
        let mut state = PlanState::default();

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("deploy", "first"),
            &HaltSpec::default(),
        )
        .expect("update");
        revise_plan(&mut p, &mut state, "deploy").expect("revise");
        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &failure_outcome("deploy", "second"),
            &HaltSpec::default(),
        )
        .expect("update");

        let before_state = state.clone();
        let before_plan = p.clone();
        assert_eq!(
            revise_plan(&mut p, &mut state, "deploy").expect("revise"),
            Revision::Unchanged
        );
        assert_eq!(state, before_state);
        assert_eq!(p, before_plan);
    }

    #[test]
    fn revision_on_unknown_step_is_a_noop() {
        let mut p = plan(vec![step("a")]);
        let mut state = PlanState::default();
        assert_eq!(
            revise_plan(&mut p, &mut state, "ghost").expect("revise"),
            Revision::Unchanged
        );
    }

    #[test]
    fn completion_requires_all_terminal_or_halt() {
        let mut p = plan(vec![step("a"), step("b")]);
        let mut state = PlanState::default();
        assert!(!is_complete(&p, &state));

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &success_outcome("a"),
            &HaltSpec::default(),
        )
        .expect("update");
        assert!(!is_complete(&p, &state));

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &success_outcome("b"),
            &HaltSpec::default(),
        )
        .expect("update");
        assert!(is_complete(&p, &state));
    }

    #[test]
    fn summary_projects_counts_without_side_effects() {
        let mut p = plan(vec![step("a"), step("b")]);
        let mut state = PlanState::default();

        next_step(&mut p, &mut state).expect("select");
        update_state(
            &mut p,
            &mut state,
            &success_outcome("a"),
            &HaltSpec::default(),
        )
        .expect("update");

        let summary = plan_summary(&p, &state);
        assert_eq!(summary.total_steps, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 0);
        assert!(!summary.halted);
        assert!(!summary.is_complete);
        assert_eq!(summary.plan_id, p.plan_id);
    }
}
