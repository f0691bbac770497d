//! Declarative per-risk-level constraint rules.

use crate::plan::RiskLevel;

/// Constraint rule set for one risk level.
///
/// Consulted by the plan validator (rollback hint, file-scope ceiling) and by
/// the lifecycle's skip eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskRule {
    /// Whether the validator demands a non-empty rollback hint.
    pub requires_rollback_hint: bool,
    /// Ceiling on the number of allowed-file patterns, if any.
    pub max_allowed_files: Option<usize>,
    /// Whether the revision policy may skip the step after retries run out.
    pub skippable: bool,
}

/// LOW: wide latitude. MED: bounded file scope. HIGH: rollback hint required,
/// narrow file scope, never skippable.
pub const fn risk_rule(level: RiskLevel) -> RiskRule {
    match level {
        RiskLevel::Low => RiskRule {
            requires_rollback_hint: false,
            max_allowed_files: None,
            skippable: true,
        },
        RiskLevel::Med => RiskRule {
            requires_rollback_hint: false,
            max_allowed_files: Some(20),
            skippable: true,
        },
        RiskLevel::High => RiskRule {
            requires_rollback_hint: true,
            max_allowed_files: Some(5),
            skippable: false,
        },
    }
}
