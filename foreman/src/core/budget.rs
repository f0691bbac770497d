//! Cumulative resource budget for one plan run.

use serde::{Deserialize, Serialize};

/// Resource ceilings for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetLimits {
    pub max_steps_executed: u32,
    pub max_files_touched: u32,
    pub max_wall_clock_ms: u64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_steps_executed: 50,
            max_files_touched: 200,
            max_wall_clock_ms: 3_600_000,
        }
    }
}

/// Dimension on which a charge would cross its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetBreach {
    StepsExecuted { used: u32, limit: u32 },
    FilesTouched { used: u32, limit: u32 },
    WallClock { used_ms: u64, limit_ms: u64 },
}

impl BudgetBreach {
    pub fn describe(&self) -> String {
        match self {
            BudgetBreach::StepsExecuted { used, limit } => {
                format!("step budget exhausted ({used}/{limit})")
            }
            BudgetBreach::FilesTouched { used, limit } => {
                format!("file budget exhausted ({used}/{limit})")
            }
            BudgetBreach::WallClock { used_ms, limit_ms } => {
                format!("wall-clock budget exhausted ({used_ms}ms/{limit_ms}ms)")
            }
        }
    }
}

/// Tracks consumption against [`BudgetLimits`]. Belongs to exactly one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanBudget {
    pub limits: BudgetLimits,
    pub steps_executed: u32,
    pub files_touched: u32,
    pub wall_clock_ms: u64,
}

impl PlanBudget {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            steps_executed: 0,
            files_touched: 0,
            wall_clock_ms: 0,
        }
    }

    /// Charge one executed step.
    ///
    /// Refuses the whole charge, leaving all counters unchanged, if any
    /// dimension would cross its ceiling.
    pub fn charge_step(&mut self, files_touched: u32, elapsed_ms: u64) -> Result<(), BudgetBreach> {
        let steps = self.steps_executed + 1;
        let files = self.files_touched + files_touched;
        let wall = self.wall_clock_ms + elapsed_ms;
        if steps > self.limits.max_steps_executed {
            return Err(BudgetBreach::StepsExecuted {
                used: steps,
                limit: self.limits.max_steps_executed,
            });
        }
        if files > self.limits.max_files_touched {
            return Err(BudgetBreach::FilesTouched {
                used: files,
                limit: self.limits.max_files_touched,
            });
        }
        if wall > self.limits.max_wall_clock_ms {
            return Err(BudgetBreach::WallClock {
                used_ms: wall,
                limit_ms: self.limits.max_wall_clock_ms,
            });
        }
        self.steps_executed = steps;
        self.files_touched = files;
        self.wall_clock_ms = wall;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_limits() -> BudgetLimits {
        BudgetLimits {
            max_steps_executed: 2,
            max_files_touched: 3,
            max_wall_clock_ms: 1_000,
        }
    }

    #[test]
    fn charges_accumulate_within_limits() {
        let mut budget = PlanBudget::new(tight_limits());
        budget.charge_step(1, 400).expect("first charge");
        budget.charge_step(2, 500).expect("second charge");
        assert_eq!(budget.steps_executed, 2);
        assert_eq!(budget.files_touched, 3);
        assert_eq!(budget.wall_clock_ms, 900);
    }

    #[test]
    fn refused_charge_leaves_counters_unchanged() {
        let mut budget = PlanBudget::new(tight_limits());
        budget.charge_step(1, 100).expect("charge");
        let breach = budget.charge_step(3, 100).expect_err("file ceiling");
        assert_eq!(breach, BudgetBreach::FilesTouched { used: 4, limit: 3 });
        assert_eq!(budget.steps_executed, 1);
        assert_eq!(budget.files_touched, 1);
        assert_eq!(budget.wall_clock_ms, 100);
    }

    #[test]
    fn step_ceiling_trips_first() {
        let mut budget = PlanBudget::new(tight_limits());
        budget.charge_step(0, 0).expect("one");
        budget.charge_step(0, 0).expect("two");
        let breach = budget.charge_step(0, 0).expect_err("three");
        assert!(matches!(breach, BudgetBreach::StepsExecuted { used: 3, limit: 2 }));
    }

    #[test]
    fn wall_clock_ceiling_is_enforced() {
        let mut budget = PlanBudget::new(tight_limits());
        let breach = budget.charge_step(0, 1_500).expect_err("too slow");
        assert!(matches!(breach, BudgetBreach::WallClock { .. }));
        assert!(breach.describe().contains("wall-clock"));
    }
}
