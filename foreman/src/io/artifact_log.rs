//! Append-only, run-scoped artifact recorder.
//!
//! One artifact document captures everything needed to replay a run: the
//! serialized plan, the repo fingerprint at start, and one record per step
//! dispatch. Records accumulate in memory and hit disk exactly once, at
//! [`PlanArtifactLog::finalize`]. A run that is never finalized keeps its
//! record in memory for the life of the log. Diffs are never persisted
//! verbatim; only a truncated content hash of the sanitized diff is kept.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::core::sanitizer::{sanitize, sanitize_value};
use crate::core::types::{ControllerOutcome, ControllerTaskSpec};
use crate::io::fingerprint::RepoFingerprint;
use crate::plan::Plan;

/// One step dispatch as recorded in an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepArtifact {
    pub step_id: String,
    pub task_spec_json: String,
    pub outcome_json: String,
    /// First 16 hex chars of the SHA-256 of the sanitized diff ("" when the
    /// step produced none).
    pub diff_summary_hash: String,
    pub wall_clock_ms: u64,
    pub timestamp: String,
    pub files_touched: Vec<String>,
}

/// Immutable record of one finalized run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanArtifact {
    pub plan_id: String,
    pub plan_json: String,
    pub repo_fingerprint: RepoFingerprint,
    pub step_artifacts: Vec<StepArtifact>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub final_status: Option<String>,
    pub metadata: Map<String, Value>,
}

/// Recorder for in-flight runs, writing one JSON document per finalized run.
#[derive(Debug)]
pub struct PlanArtifactLog {
    output_dir: PathBuf,
    active: HashMap<String, PlanArtifact>,
}

impl PlanArtifactLog {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            active: HashMap::new(),
        }
    }

    /// Open an in-memory record for a starting run and return its artifact id
    /// (`{plan_id}_{UTC start stamp}`).
    #[instrument(skip_all, fields(plan_id = %plan.plan_id))]
    pub fn record_plan_start(
        &mut self,
        plan: &Plan,
        fingerprint: &RepoFingerprint,
        metadata: Map<String, Value>,
    ) -> Result<String> {
        let artifact_id = format!("{}_{}", plan.plan_id, Utc::now().format("%Y%m%d_%H%M%S"));
        let mut plan_value = serde_json::to_value(plan).context("serialize plan")?;
        sanitize_value(&mut plan_value);
        let artifact = PlanArtifact {
            plan_id: plan.plan_id.clone(),
            plan_json: serde_json::to_string(&plan_value).context("render plan json")?,
            repo_fingerprint: fingerprint.clone(),
            step_artifacts: Vec::new(),
            start_time: Utc::now().to_rfc3339(),
            end_time: None,
            final_status: None,
            metadata,
        };
        debug!(artifact_id = %artifact_id, "opened artifact");
        self.active.insert(artifact_id.clone(), artifact);
        Ok(artifact_id)
    }

    /// Append one step record to an open artifact.
    ///
    /// Unknown ids are ignored: the run may have already finished or never
    /// started, and a late outcome report must not fail the caller.
    pub fn record_step(
        &mut self,
        artifact_id: &str,
        spec: &ControllerTaskSpec,
        outcome: &ControllerOutcome,
        diff: Option<&str>,
        elapsed_ms: u64,
        files_touched: &[String],
    ) -> Result<()> {
        let Some(artifact) = self.active.get_mut(artifact_id) else {
            warn!(artifact_id, "record_step for unknown artifact, ignoring");
            return Ok(());
        };

        let mut spec_value = serde_json::to_value(spec).context("serialize task spec")?;
        sanitize_value(&mut spec_value);

        // Strip the raw diff before serializing; it survives only as a hash.
        let mut recorded = outcome.clone();
        recorded.diff = None;
        let mut outcome_value = serde_json::to_value(&recorded).context("serialize outcome")?;
        sanitize_value(&mut outcome_value);

        artifact.step_artifacts.push(StepArtifact {
            step_id: spec.step_id.clone(),
            task_spec_json: serde_json::to_string(&spec_value).context("render task spec json")?,
            outcome_json: serde_json::to_string(&outcome_value).context("render outcome json")?,
            diff_summary_hash: diff_summary_hash(diff.unwrap_or("")),
            wall_clock_ms: elapsed_ms,
            timestamp: Utc::now().to_rfc3339(),
            files_touched: files_touched.to_vec(),
        });
        Ok(())
    }

    /// Close an open artifact, write it to disk, and return its location.
    /// `None` when the id was unknown.
    #[instrument(skip_all, fields(artifact_id))]
    pub fn finalize(&mut self, artifact_id: &str, final_status: &str) -> Result<Option<PathBuf>> {
        let Some(mut artifact) = self.active.remove(artifact_id) else {
            warn!(artifact_id, "finalize for unknown artifact, ignoring");
            return Ok(None);
        };
        artifact.end_time = Some(Utc::now().to_rfc3339());
        artifact.final_status = Some(final_status.to_string());

        let path = self.artifact_path(artifact_id);
        let mut buf = serde_json::to_string_pretty(&artifact).context("serialize artifact")?;
        buf.push('\n');
        write_atomic(&path, &buf)?;
        debug!(path = %path.display(), steps = artifact.step_artifacts.len(), "finalized artifact");
        Ok(Some(path))
    }

    /// Read a finalized artifact back.
    pub fn load(&self, artifact_id: &str) -> Result<PlanArtifact> {
        let path = self.artifact_path(artifact_id);
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read artifact {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse artifact {}", path.display()))
    }

    /// Finalized artifact ids, most recent first, optionally restricted to
    /// one plan.
    pub fn list_artifacts(&self, plan_id: Option<&str>) -> Result<Vec<String>> {
        if !self.output_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.output_dir)
            .with_context(|| format!("read artifact dir {}", self.output_dir.display()))?;
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.context("read artifact dir entry")?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(plan_id) = plan_id
                && !stem.starts_with(&format!("{plan_id}_"))
            {
                continue;
            }
            ids.push(stem.to_string());
        }
        // Start stamps sort lexicographically, so reverse order is newest-first.
        ids.sort_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    fn artifact_path(&self, artifact_id: &str) -> PathBuf {
        self.output_dir.join(format!("{artifact_id}.json"))
    }
}

/// Truncated content hash standing in for a diff in artifacts.
pub fn diff_summary_hash(diff: &str) -> String {
    let sanitized = sanitize(diff);
    let digest = Sha256::digest(sanitized.text.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("artifact path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp artifact {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace artifact {}", path.display()))?;
    Ok(())
}
