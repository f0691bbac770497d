//! Halt-condition evaluation for a running plan.
//!
//! Halting is monotonic: once a state object carries `halted = true`, nothing
//! in the engine clears it. A halted run is a valid terminal state, never an
//! error to recover from.

use serde::{Deserialize, Serialize};

use crate::core::budget::{BudgetBreach, PlanBudget};
use crate::core::types::PlanState;

/// Thresholds consulted on every loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaltSpec {
    /// Halt once this many failures occur with no success in between,
    /// regardless of which steps failed.
    pub max_consecutive_failures: u32,
}

impl Default for HaltSpec {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 2,
        }
    }
}

/// Why a run must stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    ConsecutiveFailures { count: u32, threshold: u32 },
    BudgetExhausted(BudgetBreach),
    ValidationRejected { violations: usize },
}

impl HaltReason {
    pub fn describe(&self) -> String {
        match self {
            HaltReason::ConsecutiveFailures { count, threshold } => {
                format!("{count} consecutive failures (threshold {threshold})")
            }
            HaltReason::BudgetExhausted(breach) => breach.describe(),
            HaltReason::ValidationRejected { violations } => {
                format!("plan rejected by validator ({violations} violations)")
            }
        }
    }
}

/// Decide whether execution must stop given the current state and budget.
///
/// Budget dimensions count as exhausted once *reached*, not only once
/// crossed, so the loop stops before attempting a charge that cannot fit.
pub fn check_halt(spec: &HaltSpec, state: &PlanState, budget: &PlanBudget) -> Option<HaltReason> {
    if state.consecutive_failures >= spec.max_consecutive_failures {
        return Some(HaltReason::ConsecutiveFailures {
            count: state.consecutive_failures,
            threshold: spec.max_consecutive_failures,
        });
    }
    if budget.steps_executed >= budget.limits.max_steps_executed {
        return Some(HaltReason::BudgetExhausted(BudgetBreach::StepsExecuted {
            used: budget.steps_executed,
            limit: budget.limits.max_steps_executed,
        }));
    }
    if budget.files_touched >= budget.limits.max_files_touched {
        return Some(HaltReason::BudgetExhausted(BudgetBreach::FilesTouched {
            used: budget.files_touched,
            limit: budget.limits.max_files_touched,
        }));
    }
    if budget.wall_clock_ms >= budget.limits.max_wall_clock_ms {
        return Some(HaltReason::BudgetExhausted(BudgetBreach::WallClock {
            used_ms: budget.wall_clock_ms,
            limit_ms: budget.limits.max_wall_clock_ms,
        }));
    }
    None
}
