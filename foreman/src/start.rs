//! Orchestration for starting a plan run.
//!
//! Starting a run: validate the plan against governance rules, fingerprint
//! the repository, and open an artifact record. Nothing is dispatched here;
//! a freshly started run hands a [`RunContext`] to the dispatch loop.

use std::path::Path;

use anyhow::{Result, anyhow};
use serde_json::{Map, json};
use tracing::{debug, info, warn};

use crate::core::budget::PlanBudget;
use crate::core::halt::{HaltReason, HaltSpec};
use crate::core::scheduler::halt_run;
use crate::core::types::PlanState;
use crate::core::validator::validate_plan;
use crate::io::artifact_log::PlanArtifactLog;
use crate::io::config::RunConfig;
use crate::io::fingerprint::{RepoFingerprint, compute_fingerprint};
use crate::io::git::Git;
use crate::plan::Plan;

/// Everything one run accumulates outside the plan and state: the open
/// artifact, the budget counters, and the start-time fingerprint.
#[derive(Debug)]
pub struct RunContext {
    pub artifact_id: String,
    pub budget: PlanBudget,
    pub halt: HaltSpec,
    pub fingerprint: RepoFingerprint,
}

/// Validate, fingerprint, and open the artifact for a run over `root`.
///
/// A plan that fails governance marks the state halted (so the scheduler
/// refuses to dispatch it later) and returns an error carrying every
/// violation at once.
pub fn start_run(
    root: &Path,
    plan: &Plan,
    state: &mut PlanState,
    config: &RunConfig,
    log: &mut PlanArtifactLog,
) -> Result<RunContext> {
    debug!(root = %root.display(), plan_id = %plan.plan_id, "starting run");

    let violations = validate_plan(plan, &config.validator);
    if !violations.is_empty() {
        warn!(count = violations.len(), "plan rejected by validator");
        halt_run(
            state,
            HaltReason::ValidationRejected {
                violations: violations.len(),
            }
            .describe(),
        );
        return Err(anyhow!("plan rejected: {}", violations.join("; ")));
    }

    let fingerprint = compute_fingerprint(root)?;

    let mut metadata = Map::new();
    metadata.insert("head".to_string(), json!(Git::new(root).head_short_sha(12)?));
    let artifact_id = log.record_plan_start(plan, &fingerprint, metadata)?;

    info!(plan_id = %plan.plan_id, artifact_id = %artifact_id, "run started");
    Ok(RunContext {
        artifact_id,
        budget: PlanBudget::new(config.budget),
        halt: config.halt,
        fingerprint,
    })
}
