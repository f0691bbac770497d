//! Plan load/save helpers with schema + structural validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::core::validator::validate_structure;
use crate::plan::Plan;

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan/v1.schema.json");

/// Load and validate a plan from disk (schema + structure).
pub fn load_plan(path: &Path) -> Result<Plan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&contents).with_context(|| format!("parse plan {}", path.display()))?;
    validate_schema(&value)?;
    let plan: Plan = serde_json::from_value(value)
        .with_context(|| format!("deserialize plan {}", path.display()))?;
    validate_plan_structure(&plan)?;
    Ok(plan)
}

/// Write a plan to disk with stable pretty formatting.
pub fn write_plan(path: &Path, plan: &Plan) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(plan)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write plan {}", path.display()))
}

fn validate_schema(plan: &Value) -> Result<()> {
    let schema_value: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid plan schema: {}", err))?;
    if !compiled.is_valid(plan) {
        let messages = compiled
            .iter_errors(plan)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "plan schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

fn validate_plan_structure(plan: &Plan) -> Result<()> {
    let errors = validate_structure(plan);
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("plan structure invalid: {}", errors.join("; ")))
}
