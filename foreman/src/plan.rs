use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Med,
    High,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Active,
    Done,
    Failed,
    Skipped,
}

impl StepStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Skipped)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Active => "active",
            StepStatus::Done => "done",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl RiskLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Med => "MED",
            RiskLevel::High => "HIGH",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub step_id: String,
    pub title: String,
    pub intent: String,
    pub allowed_files: Vec<String>,
    pub success_criteria: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub verify: Option<String>,
    pub risk_level: RiskLevel,
    /// Required non-empty when `risk_level` is HIGH.
    #[serde(default)]
    pub rollback_hint: Option<String>,
    /// Opaque payload forwarded verbatim to the controller.
    #[serde(default)]
    pub controller_task_spec: Map<String, Value>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub outcome: Option<Value>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub skip_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub plan_id: String,
    pub goal: String,
    /// List order doubles as the scheduling tie-break order.
    pub steps: Vec<Step>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl Plan {
    pub fn get_step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.step_id == step_id)
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.step_id == step_id)
    }
}

/// Derive the deterministic plan identifier for a goal/seed pair.
///
/// Identical inputs always reproduce the same id, so decomposition
/// collaborators can regenerate a plan without forking its identity.
pub fn derive_plan_id(goal: &str, seed: u64) -> String {
    let digest = Sha256::digest(format!("{goal}:{seed}").as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("plan-{}", &hex[..12])
}
