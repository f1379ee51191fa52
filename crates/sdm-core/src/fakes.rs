//! In-memory fakes for push context collaborators (testing only)
//!
//! Provides `InMemoryProject` and `RecordingChannels`, which satisfy the
//! [`Project`] and [`AddressChannels`] contracts without touching disk or
//! any chat system.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GoalResult;
use crate::project::Project;
use crate::push::AddressChannels;

// ---------------------------------------------------------------------------
// InMemoryProject
// ---------------------------------------------------------------------------

/// Project backed by a `HashMap<path, content>` and a fixed changed-file list.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProject {
    files: HashMap<String, String>,
    changed: Vec<String>,
}

impl InMemoryProject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Files reported by `changed_files_since`, whatever sha is asked for.
    pub fn with_changed_files<S: Into<String>>(mut self, paths: Vec<S>) -> Self {
        self.changed = paths.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Project for InMemoryProject {
    async fn has_file(&self, path: &str) -> GoalResult<bool> {
        Ok(self.files.contains_key(path))
    }

    async fn read_file(&self, path: &str) -> GoalResult<Option<String>> {
        Ok(self.files.get(path).cloned())
    }

    async fn changed_files_since(&self, _sha: &str) -> GoalResult<Vec<String>> {
        Ok(self.changed.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingChannels
// ---------------------------------------------------------------------------

/// Channel addressing that records every message.
#[derive(Debug, Default)]
pub struct RecordingChannels {
    messages: Mutex<Vec<String>>,
}

impl RecordingChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl AddressChannels for RecordingChannels {
    async fn address(&self, message: &str) -> GoalResult<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
