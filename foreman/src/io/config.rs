//! Engine configuration stored under `.foreman/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::BudgetLimits;
use crate::core::halt::HaltSpec;
use crate::core::validator::ValidatorConfig;

/// Engine configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    pub validator: ValidatorConfig,
    pub budget: BudgetLimits,
    pub halt: HaltSpec,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.validator.min_steps == 0 {
            return Err(anyhow!("validator.min_steps must be > 0"));
        }
        if self.validator.max_steps < self.validator.min_steps {
            return Err(anyhow!("validator.max_steps must be >= validator.min_steps"));
        }
        if self.budget.max_steps_executed == 0 {
            return Err(anyhow!("budget.max_steps_executed must be > 0"));
        }
        if self.budget.max_wall_clock_ms == 0 {
            return Err(anyhow!("budget.max_wall_clock_ms must be > 0"));
        }
        if self.halt.max_consecutive_failures == 0 {
            return Err(anyhow!("halt.max_consecutive_failures must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        let cfg = RunConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
