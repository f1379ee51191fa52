//! Project handle: the file view of the repository a push landed on.
//!
//! The engine never clones or caches projects itself; it only awaits
//! lookups through [`Project`]. [`LocalProject`] serves a checkout that
//! already exists on disk.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{GoalError, GoalResult};

/// File lookups a push test may perform against the pushed project.
#[async_trait]
pub trait Project: Send + Sync {
    /// Whether a file exists at `path` (relative to the project root).
    async fn has_file(&self, path: &str) -> GoalResult<bool>;

    /// Read the content of `path`, or `None` if there is no such file.
    async fn read_file(&self, path: &str) -> GoalResult<Option<String>>;

    /// Paths changed between `sha` and the pushed head.
    async fn changed_files_since(&self, sha: &str) -> GoalResult<Vec<String>>;
}

/// A project backed by a local checkout.
#[derive(Debug, Clone)]
pub struct LocalProject {
    root: PathBuf,
}

impl LocalProject {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a project-relative path, refusing anything that escapes the root.
    fn resolve(&self, path: &str) -> GoalResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(GoalError::Project(format!(
                "path '{path}' is not relative to the project root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Project for LocalProject {
    async fn has_file(&self, path: &str) -> GoalResult<bool> {
        let full = self.resolve(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_file(&self, path: &str) -> GoalResult<Option<String>> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn changed_files_since(&self, sha: &str) -> GoalResult<Vec<String>> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(["diff", "--name-only", sha, "HEAD"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GoalError::Project(format!(
                "git diff against {sha} failed: {}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}
