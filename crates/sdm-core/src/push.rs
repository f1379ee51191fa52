//! The push context every goal decision is evaluated against.
//!
//! A [`PushContext`] is created per push event by whoever dispatches events
//! and is read-only to the engine. Every field is optional: reading a field
//! that was not supplied returns [`GoalError::InsufficientData`], which lets
//! the goal predictor run the same rules against a partially-known push.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GoalError, GoalResult};
use crate::project::Project;

/// Repository the push landed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    #[serde(default = "default_branch_name")]
    pub default_branch: String,
}

fn default_branch_name() -> String {
    "main".to_string()
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            default_branch: default_branch_name(),
        }
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// `owner/name`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// One commit carried by a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
}

impl Commit {
    pub fn new(sha: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sha: sha.into(),
            message: message.into(),
        }
    }
}

/// A set of commits landing on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Push {
    pub repo: RepoRef,
    pub branch: String,
    /// Oldest first; the last commit is the pushed head.
    #[serde(default)]
    pub commits: Vec<Commit>,
    /// Head of the branch before the push, if the branch already existed.
    #[serde(default)]
    pub before_sha: Option<String>,
}

impl Push {
    pub fn new(repo: RepoRef, branch: impl Into<String>) -> Self {
        Self {
            repo,
            branch: branch.into(),
            commits: Vec::new(),
            before_sha: None,
        }
    }

    pub fn with_commit(mut self, commit: Commit) -> Self {
        self.commits.push(commit);
        self
    }

    pub fn with_before(mut self, sha: impl Into<String>) -> Self {
        self.before_sha = Some(sha.into());
        self
    }

    /// The pushed head commit.
    pub fn head(&self) -> Option<&Commit> {
        self.commits.last()
    }

    pub fn is_default_branch(&self) -> bool {
        self.branch == self.repo.default_branch
    }
}

/// A push whose fields may be missing, as known before the event is
/// complete. Absent fields raise insufficient data when read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialPush {
    #[serde(default)]
    pub repo: Option<RepoRef>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commits: Option<Vec<Commit>>,
    #[serde(default)]
    pub before_sha: Option<String>,
}

impl PartialPush {
    pub fn is_empty(&self) -> bool {
        self.repo.is_none() && self.branch.is_none() && self.commits.is_none()
    }

    /// The full push, when repo, branch and commits are all known.
    pub fn complete(&self) -> Option<Push> {
        Some(Push {
            repo: self.repo.clone()?,
            branch: self.branch.clone()?,
            commits: self.commits.clone()?,
            before_sha: self.before_sha.clone(),
        })
    }
}

impl From<Push> for PartialPush {
    fn from(push: Push) -> Self {
        Self {
            repo: Some(push.repo),
            branch: Some(push.branch),
            commits: Some(push.commits),
            before_sha: push.before_sha,
        }
    }
}

/// Stable identity of a push, used to key per-push memoization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushId {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub sha: String,
}

impl PushId {
    pub fn for_push(push: &Push) -> Self {
        Self {
            owner: push.repo.owner.clone(),
            repo: push.repo.name.clone(),
            branch: push.branch.clone(),
            sha: push.head().map(|c| c.sha.clone()).unwrap_or_default(),
        }
    }
}

impl fmt::Display for PushId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}@{}", self.owner, self.repo, self.branch, self.sha)
    }
}

/// Token used by collaborators that talk to the source-control host.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Where messages about this push can be sent (chat channels etc.).
#[async_trait]
pub trait AddressChannels: Send + Sync {
    async fn address(&self, message: &str) -> GoalResult<()>;
}

/// Everything a push test can know about a push.
#[derive(Default, Clone)]
pub struct PushContext {
    id: Option<PushId>,
    push: Option<Push>,
    fields: PartialPush,
    project: Option<Arc<dyn Project>>,
    credentials: Option<Credentials>,
    channels: Option<Arc<dyn AddressChannels>>,
}

impl PushContext {
    /// Context for a known push; the id is derived from the push.
    pub fn new(push: Push) -> Self {
        Self::default().with_push(push)
    }

    /// Context for a push known field by field. The push id is only known
    /// once every field is.
    pub fn from_partial(fields: PartialPush) -> Self {
        let push = fields.complete();
        Self {
            id: push.as_ref().map(PushId::for_push),
            push,
            fields,
            ..Self::default()
        }
    }

    /// A context where nothing is known. Every accessor fails with
    /// insufficient data.
    pub fn partial() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: PushId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_push(mut self, push: Push) -> Self {
        self.id = Some(PushId::for_push(&push));
        self.fields = push.clone().into();
        self.push = Some(push);
        self
    }

    pub fn with_project(mut self, project: Arc<dyn Project>) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_channels(mut self, channels: Arc<dyn AddressChannels>) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn id(&self) -> GoalResult<&PushId> {
        self.id.as_ref().ok_or_else(|| GoalError::insufficient("id"))
    }

    pub fn push(&self) -> GoalResult<&Push> {
        self.push.as_ref().ok_or_else(|| GoalError::insufficient("push"))
    }

    pub fn repo(&self) -> GoalResult<&RepoRef> {
        self.fields
            .repo
            .as_ref()
            .ok_or_else(|| GoalError::insufficient("repo"))
    }

    pub fn branch(&self) -> GoalResult<&str> {
        self.fields
            .branch
            .as_deref()
            .ok_or_else(|| GoalError::insufficient("branch"))
    }

    pub fn commits(&self) -> GoalResult<&[Commit]> {
        self.fields
            .commits
            .as_deref()
            .ok_or_else(|| GoalError::insufficient("commits"))
    }

    /// Whether the push is to the repository's default branch.
    pub fn is_default_branch(&self) -> GoalResult<bool> {
        let branch = self.branch()?;
        Ok(branch == self.repo()?.default_branch)
    }

    pub fn project(&self) -> GoalResult<&dyn Project> {
        self.project
            .as_deref()
            .ok_or_else(|| GoalError::insufficient("project"))
    }

    pub fn credentials(&self) -> GoalResult<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| GoalError::insufficient("credentials"))
    }

    pub fn channels(&self) -> GoalResult<&dyn AddressChannels> {
        self.channels
            .as_deref()
            .ok_or_else(|| GoalError::insufficient("address_channels"))
    }

    /// The push id when known, without failing. Used for memoization keys
    /// and log fields.
    pub fn known_id(&self) -> Option<&PushId> {
        self.id.as_ref()
    }
}

impl fmt::Debug for PushContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushContext")
            .field("id", &self.id)
            .field("push", &self.fields)
            .field("project", &self.project.is_some())
            .field("credentials", &self.credentials)
            .field("channels", &self.channels.is_some())
            .finish()
    }
}
