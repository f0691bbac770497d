//! Divergence detection between a recorded run and a later one.
//!
//! Replay never re-invokes the controller. It walks two dispatch sequences
//! for the same plan, in recorded order, and reports each step whose
//! reported success or diff hash differs. Fingerprint drift is the usual
//! explanation for divergence, so callers typically check fingerprints
//! first.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use crate::core::types::ControllerOutcome;
use crate::io::artifact_log::{PlanArtifact, diff_summary_hash};

/// One step whose two runs disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDivergence {
    pub step_id: String,
    /// Which comparison failed: `success`, `diff_summary_hash`, `step_id`,
    /// or `presence` (one run dispatched more steps than the other).
    pub field: String,
    pub baseline: String,
    pub candidate: String,
}

/// Aggregated comparison outcome, divergences in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayResult {
    pub identical: bool,
    pub divergences: Vec<StepDivergence>,
}

/// Compare two finalized artifacts of the same plan.
pub fn compare_artifacts(
    baseline: &PlanArtifact,
    candidate: &PlanArtifact,
) -> Result<ReplayResult> {
    if baseline.plan_id != candidate.plan_id {
        return Err(anyhow!(
            "artifacts belong to different plans: '{}' vs '{}'",
            baseline.plan_id,
            candidate.plan_id
        ));
    }
    let baseline_dispatches = recorded_dispatches(baseline)?;
    let candidate_dispatches = recorded_dispatches(candidate)?;
    Ok(compare_dispatches(
        &baseline_dispatches,
        &candidate_dispatches,
    ))
}

/// Compare a finalized artifact against a freshly collected outcome stream
/// (outcome plus the raw diff the controller produced, if any).
pub fn compare_with_outcomes(
    baseline: &PlanArtifact,
    outcomes: &[(ControllerOutcome, Option<String>)],
) -> Result<ReplayResult> {
    let baseline_dispatches = recorded_dispatches(baseline)?;
    let candidate_dispatches: Vec<Dispatch> = outcomes
        .iter()
        .map(|(outcome, diff)| Dispatch {
            step_id: outcome.step_id.clone(),
            success: outcome.success,
            diff_hash: diff_summary_hash(diff.as_deref().unwrap_or("")),
        })
        .collect();
    Ok(compare_dispatches(
        &baseline_dispatches,
        &candidate_dispatches,
    ))
}

struct Dispatch {
    step_id: String,
    success: bool,
    diff_hash: String,
}

fn recorded_dispatches(artifact: &PlanArtifact) -> Result<Vec<Dispatch>> {
    artifact
        .step_artifacts
        .iter()
        .map(|record| {
            let outcome: ControllerOutcome = serde_json::from_str(&record.outcome_json)
                .with_context(|| {
                    format!("parse recorded outcome for step '{}'", record.step_id)
                })?;
            Ok(Dispatch {
                step_id: record.step_id.clone(),
                success: outcome.success,
                diff_hash: record.diff_summary_hash.clone(),
            })
        })
        .collect()
}

fn compare_dispatches(baseline: &[Dispatch], candidate: &[Dispatch]) -> ReplayResult {
    let mut divergences = Vec::new();
    for idx in 0..baseline.len().max(candidate.len()) {
        match (baseline.get(idx), candidate.get(idx)) {
            (Some(b), Some(c)) => {
                if b.step_id != c.step_id {
                    // The sequences took different paths; field-level diffs
                    // past this point would only be noise.
                    divergences.push(StepDivergence {
                        step_id: b.step_id.clone(),
                        field: "step_id".to_string(),
                        baseline: b.step_id.clone(),
                        candidate: c.step_id.clone(),
                    });
                    continue;
                }
                if b.success != c.success {
                    divergences.push(StepDivergence {
                        step_id: b.step_id.clone(),
                        field: "success".to_string(),
                        baseline: outcome_text(b.success).to_string(),
                        candidate: outcome_text(c.success).to_string(),
                    });
                }
                if b.diff_hash != c.diff_hash {
                    divergences.push(StepDivergence {
                        step_id: b.step_id.clone(),
                        field: "diff_summary_hash".to_string(),
                        baseline: b.diff_hash.clone(),
                        candidate: c.diff_hash.clone(),
                    });
                }
            }
            (Some(b), None) => divergences.push(StepDivergence {
                step_id: b.step_id.clone(),
                field: "presence".to_string(),
                baseline: "dispatched".to_string(),
                candidate: "absent".to_string(),
            }),
            (None, Some(c)) => divergences.push(StepDivergence {
                step_id: c.step_id.clone(),
                field: "presence".to_string(),
                baseline: "absent".to_string(),
                candidate: "dispatched".to_string(),
            }),
            (None, None) => unreachable!("index bounded by max of both lengths"),
        }
    }
    ReplayResult {
        identical: divergences.is_empty(),
        divergences,
    }
}

fn outcome_text(success: bool) -> &'static str {
    if success { "success" } else { "failure" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::artifact_log::StepArtifact;
    use crate::io::fingerprint::RepoFingerprint;
    use crate::test_support::{failure_outcome, success_outcome};
    use serde_json::Map;

    fn record(step_id: &str, success: bool, diff_hash: &str) -> StepArtifact {
        let outcome = if success {
            success_outcome(step_id)
        } else {
            failure_outcome(step_id, "boom")
        };
        StepArtifact {
            step_id: step_id.to_string(),
            task_spec_json: "{}".to_string(),
            outcome_json: serde_json::to_string(&outcome).expect("outcome json"),
            diff_summary_hash: diff_hash.to_string(),
            wall_clock_ms: 10,
            timestamp: "2025-11-03T09:00:00+00:00".to_string(),
            files_touched: Vec::new(),
        }
    }

    fn artifact(plan_id: &str, records: Vec<StepArtifact>) -> PlanArtifact {
        PlanArtifact {
            plan_id: plan_id.to_string(),
            plan_json: "{}".to_string(),
            repo_fingerprint: RepoFingerprint {
                hash: "0".repeat(64),
                file_count: 0,
                total_bytes: 0,
            },
            step_artifacts: records,
            start_time: "2025-11-03T09:00:00+00:00".to_string(),
            end_time: Some("2025-11-03T09:01:00+00:00".to_string()),
            final_status: Some("success".to_string()),
            metadata: Map::new(),
        }
    }

    #[test]
    fn identical_runs_report_no_divergence() {
        let baseline = artifact(
            "plan-a",
            vec![record("a", true, "hash-a"), record("b", true, "hash-b")],
        );
        let candidate = artifact(
            "plan-a",
            vec![record("a", true, "hash-a"), record("b", true, "hash-b")],
        );

        let result = compare_artifacts(&baseline, &candidate).expect("compare");
        assert!(result.identical);
        assert!(result.divergences.is_empty());
    }

    #[test]
    fn success_flip_and_diff_change_are_reported_per_step() {
        let baseline = artifact(
            "plan-a",
            vec![record("a", true, "hash-a"), record("b", true, "hash-b")],
        );
        let candidate = artifact(
            "plan-a",
            vec![record("a", false, "hash-a"), record("b", true, "hash-x")],
        );

        let result = compare_artifacts(&baseline, &candidate).expect("compare");
        assert!(!result.identical);
        assert_eq!(result.divergences.len(), 2);
        assert_eq!(result.divergences[0].step_id, "a");
        assert_eq!(result.divergences[0].field, "success");
        assert_eq!(result.divergences[0].baseline, "success");
        assert_eq!(result.divergences[0].candidate, "failure");
        assert_eq!(result.divergences[1].step_id, "b");
        assert_eq!(result.divergences[1].field, "diff_summary_hash");
    }

    #[test]
    fn extra_dispatches_show_up_as_presence_divergence() {
        let baseline = artifact("plan-a", vec![record("a", true, "hash-a")]);
        let candidate = artifact(
            "plan-a",
            vec![record("a", true, "hash-a"), record("a", true, "hash-a2")],
        );

        let result = compare_artifacts(&baseline, &candidate).expect("compare");
        assert_eq!(result.divergences.len(), 1);
        assert_eq!(result.divergences[0].field, "presence");
        assert_eq!(result.divergences[0].baseline, "absent");
        assert_eq!(result.divergences[0].candidate, "dispatched");
    }

    #[test]
    fn different_plans_refuse_to_compare() {
        let baseline = artifact("plan-a", Vec::new());
        let candidate = artifact("plan-b", Vec::new());
        let err = compare_artifacts(&baseline, &candidate).expect_err("mismatch");
        assert!(err.to_string().contains("different plans"));
    }

    #[test]
    fn fresh_outcome_stream_matches_when_diffs_hash_equal() {
        let diff = "--- a/src/a.rs\n+++ b/src/a.rs\n";
        let baseline = artifact(
            "plan-a",
            vec![record("a", true, &diff_summary_hash(diff))],
        );

        let matching = vec![(success_outcome("a"), Some(diff.to_string()))];
        let result = compare_with_outcomes(&baseline, &matching).expect("compare");
        assert!(result.identical);

        let diverging = vec![(success_outcome("a"), None)];
        let result = compare_with_outcomes(&baseline, &diverging).expect("compare");
        assert!(!result.identical);
        assert_eq!(result.divergences[0].field, "diff_summary_hash");
    }
}
