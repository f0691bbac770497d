//! Plan-shape validation run before any step is dispatched.
//!
//! Violations are collected into a list of stable messages rather than
//! returned one at a time, so a caller can report every problem at once. A
//! plan with any violation is rejected whole; there is no partial acceptance.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::risk::risk_rule;
use crate::plan::Plan;

/// Paths no step may ever be allowed to touch: engine state, credential
/// material, VCS internals, dependency caches. Matched by substring against
/// each allowed-file pattern.
pub const DEFAULT_FORBIDDEN_PATHS: &[&str] = &[
    ".foreman/",
    ".env",
    ".envrc",
    "secrets/",
    "credentials/",
    ".ssh/",
    ".git/",
    "node_modules/",
    "__pycache__/",
    "target/",
];

/// Limits the validator applies on top of the structural checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidatorConfig {
    pub min_steps: usize,
    pub max_steps: usize,
    /// Substring-matched forbidden paths. A config entry replaces
    /// [`DEFAULT_FORBIDDEN_PATHS`] wholesale.
    pub forbidden_paths: Vec<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_steps: 1,
            max_steps: 20,
            forbidden_paths: DEFAULT_FORBIDDEN_PATHS
                .iter()
                .map(|path| (*path).to_string())
                .collect(),
        }
    }
}

/// Config-free structural checks: unique ids, resolving dependencies, an
/// acyclic graph, and the per-risk-level rules. Applied on every plan load.
pub fn validate_structure(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for step in &plan.steps {
        if !seen.insert(step.step_id.as_str()) {
            errors.push(format!("duplicate step_id '{}'", step.step_id));
        }
    }

    for step in &plan.steps {
        for dep_id in &step.dependencies {
            if plan.get_step(dep_id).is_none() {
                errors.push(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.step_id, dep_id
                ));
            }
        }
    }

    if let Some(cycle) = find_cycle(plan) {
        errors.push(format!("dependency cycle involving: {}", cycle.join(", ")));
    }

    for step in &plan.steps {
        let rule = risk_rule(step.risk_level);
        if rule.requires_rollback_hint
            && step
                .rollback_hint
                .as_deref()
                .is_none_or(|hint| hint.trim().is_empty())
        {
            errors.push(format!(
                "step '{}': {} risk requires a rollback_hint",
                step.step_id,
                step.risk_level.as_str()
            ));
        }
        if let Some(max_files) = rule.max_allowed_files
            && step.allowed_files.len() > max_files
        {
            errors.push(format!(
                "step '{}': {} allowed files exceeds the {} limit for {} risk",
                step.step_id,
                step.allowed_files.len(),
                max_files,
                step.risk_level.as_str()
            ));
        }
    }

    errors
}

/// Full pre-dispatch validation: structural checks plus the configured
/// step-count range and forbidden-path set.
pub fn validate_plan(plan: &Plan, config: &ValidatorConfig) -> Vec<String> {
    let mut errors = validate_structure(plan);

    let count = plan.steps.len();
    if count < config.min_steps || count > config.max_steps {
        errors.push(format!(
            "plan has {} steps, outside allowed range [{}, {}]",
            count, config.min_steps, config.max_steps
        ));
    }

    for step in &plan.steps {
        for pattern in &step.allowed_files {
            for forbidden in &config.forbidden_paths {
                if pattern.contains(forbidden.as_str()) {
                    errors.push(format!(
                        "step '{}': allowed file '{}' matches forbidden path '{}'",
                        step.step_id, pattern, forbidden
                    ));
                }
            }
        }
    }

    errors
}

/// Kahn's algorithm over the dependency graph. Returns the ids left with
/// unresolved in-degree (the cycle members and their downstream steps), or
/// `None` when the graph is acyclic. Dangling dependencies are ignored here;
/// they are reported separately.
fn find_cycle(plan: &Plan) -> Option<Vec<String>> {
    let index: HashMap<&str, usize> = plan
        .steps
        .iter()
        .enumerate()
        .map(|(idx, step)| (step.step_id.as_str(), idx))
        .collect();

    let mut indegree = vec![0usize; plan.steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); plan.steps.len()];
    for (idx, step) in plan.steps.iter().enumerate() {
        for dep_id in &step.dependencies {
            if let Some(&dep_idx) = index.get(dep_id.as_str()) {
                indegree[idx] += 1;
                dependents[dep_idx].push(idx);
            }
        }
    }

    let mut queue: VecDeque<usize> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(idx, _)| idx)
        .collect();
    let mut processed = 0;
    while let Some(idx) = queue.pop_front() {
        processed += 1;
        for &dependent in &dependents[idx] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if processed == plan.steps.len() {
        return None;
    }
    Some(
        plan.steps
            .iter()
            .enumerate()
            .filter(|(idx, _)| indegree[*idx] > 0)
            .map(|(_, step)| step.step_id.clone())
            .collect(),
    )
}
