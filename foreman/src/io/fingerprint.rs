//! Repository fingerprinting for drift detection.
//!
//! A fingerprint summarizes the tracked file set and contents at plan-start
//! time. Replay compares fingerprints to tell "same repo state" from "the
//! world moved"; nothing in the engine branches on the hash itself.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::io::git::Git;

/// Fed to the hash in place of content when a tracked file is absent from
/// the worktree (deleted but not yet committed).
const MISSING_CONTENT: &[u8] = b"__missing__";

/// Content hash plus structured metadata for one repository state.
///
/// Two fingerprints are equal iff the tracked state they summarize is
/// identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFingerprint {
    /// Hex SHA-256 over the sorted `path, content-digest` sequence.
    pub hash: String,
    pub file_count: usize,
    pub total_bytes: u64,
}

/// Hash the tracked files of the repository at `repo_root`.
///
/// Deterministic: identical tracked state always produces an identical
/// fingerprint, and any tracked content or path change produces a different
/// one. Untracked and ignored files never contribute.
#[instrument(skip_all)]
pub fn compute_fingerprint(repo_root: &Path) -> Result<RepoFingerprint> {
    let mut files = Git::new(repo_root).ls_files()?;
    files.sort();

    let mut outer = Sha256::new();
    let mut total_bytes = 0u64;
    for file in &files {
        let digest = match fs::read(repo_root.join(file)) {
            Ok(bytes) => {
                total_bytes += bytes.len() as u64;
                Sha256::digest(&bytes)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Sha256::digest(MISSING_CONTENT),
            Err(err) => {
                return Err(err).with_context(|| format!("read tracked file {file}"));
            }
        };
        outer.update(file.as_bytes());
        outer.update([0u8]);
        outer.update(digest);
    }

    let hash: String = outer
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    debug!(file_count = files.len(), total_bytes, "computed fingerprint");
    Ok(RepoFingerprint {
        hash,
        file_count: files.len(),
        total_bytes,
    })
}
