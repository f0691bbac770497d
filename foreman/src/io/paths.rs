//! Filesystem layout of engine state inside a target repository.
//!
//! Everything the engine persists lives under `.foreman/` at the repository
//! root, so a single prefix covers gitignore rules and cleanup.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ForemanPaths {
    root: PathBuf,
}

impl ForemanPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(".foreman")
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join("config.toml")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.state_dir().join("artifacts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_hangs_off_one_state_dir() {
        let paths = ForemanPaths::new("/repo");
        assert_eq!(paths.state_dir(), PathBuf::from("/repo/.foreman"));
        assert_eq!(
            paths.config_path(),
            PathBuf::from("/repo/.foreman/config.toml")
        );
        assert_eq!(
            paths.artifacts_dir(),
            PathBuf::from("/repo/.foreman/artifacts")
        );
    }
}
