//! Goals: named units of delivery work and the sets a push resolves to.
//!
//! A [`Goal`] is identified by its `unique_name`. Preconditions
//! (`depends_on`) form a DAG; this layer records edges as declared and
//! leaves cycle detection and ordering to whatever executes the goals.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Standard ordering buckets for goals.
pub mod environment {
    /// Goals that do not depend on a deployment environment (build, test, ...).
    pub const CODE: &str = "0-code";
    pub const STAGING: &str = "1-staging";
    pub const PRODUCTION: &str = "2-prod";
    /// Goals that tear a project down.
    pub const DISPOSAL: &str = "8-doom";
}

/// Lifecycle states with a human-facing description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    Working,
    Completed,
    Failed,
    WaitingForApproval,
}

/// Optional per-state descriptions; defaults are derived from the goal name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalDescriptions {
    #[serde(default)]
    pub working: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
    #[serde(default)]
    pub failed: Option<String>,
    #[serde(default)]
    pub waiting_for_approval: Option<String>,
}

/// A named unit of delivery work.
///
/// Equality and hashing use `unique_name` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub unique_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Sort key for graph layout and status ordering.
    #[serde(default)]
    pub ordered_name: String,
    #[serde(default)]
    pub descriptions: GoalDescriptions,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub pre_approval_required: bool,
    #[serde(default)]
    pub retry_feasible: bool,
    /// Goals that must complete before this one may start.
    #[serde(default)]
    pub depends_on: Vec<Goal>,
}

fn default_environment() -> String {
    environment::CODE.to_string()
}

impl Goal {
    pub fn new(unique_name: impl Into<String>) -> Self {
        let unique_name = unique_name.into();
        Self {
            ordered_name: unique_name.clone(),
            unique_name,
            display_name: None,
            environment: default_environment(),
            descriptions: GoalDescriptions::default(),
            approval_required: false,
            pre_approval_required: false,
            retry_feasible: false,
            depends_on: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn in_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_ordered_name(mut self, ordered_name: impl Into<String>) -> Self {
        self.ordered_name = ordered_name.into();
        self
    }

    pub fn with_description(mut self, state: GoalState, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match state {
            GoalState::Working => self.descriptions.working = text,
            GoalState::Completed => self.descriptions.completed = text,
            GoalState::Failed => self.descriptions.failed = text,
            GoalState::WaitingForApproval => self.descriptions.waiting_for_approval = text,
        }
        self
    }

    pub fn requiring_approval(mut self) -> Self {
        self.approval_required = true;
        self
    }

    pub fn requiring_pre_approval(mut self) -> Self {
        self.pre_approval_required = true;
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retry_feasible = true;
        self
    }

    /// Add preconditions, keeping declaration order.
    pub fn with_preconditions(mut self, goals: impl IntoIterator<Item = Goal>) -> Self {
        self.depends_on.extend(goals);
        self
    }

    /// Display name, falling back to the unique name.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.unique_name)
    }

    pub fn has_preconditions(&self) -> bool {
        !self.depends_on.is_empty()
    }

    pub fn describe(&self, state: GoalState) -> String {
        let custom = match state {
            GoalState::Working => &self.descriptions.working,
            GoalState::Completed => &self.descriptions.completed,
            GoalState::Failed => &self.descriptions.failed,
            GoalState::WaitingForApproval => &self.descriptions.waiting_for_approval,
        };
        if let Some(text) = custom {
            return text.clone();
        }
        let label = self.label();
        match state {
            GoalState::Working => format!("Working: {label}"),
            GoalState::Completed => format!("Complete: {label}"),
            GoalState::Failed => format!("Failed: {label}"),
            GoalState::WaitingForApproval => format!("Approval required: {label}"),
        }
    }
}

impl PartialEq for Goal {
    fn eq(&self, other: &Self) -> bool {
        self.unique_name == other.unique_name
    }
}

impl Eq for Goal {}

impl Hash for Goal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique_name.hash(state);
    }
}

/// Remove duplicate goals by `unique_name`, keeping first occurrences.
pub fn dedupe_goals(goals: impl IntoIterator<Item = Goal>) -> Vec<Goal> {
    let mut seen = HashSet::new();
    goals
        .into_iter()
        .filter(|g| seen.insert(g.unique_name.clone()))
        .collect()
}

/// The goals resolved for one push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goals {
    pub name: String,
    /// Render order only; execution order comes from `depends_on`.
    pub goals: Vec<Goal>,
    #[serde(default)]
    locked: bool,
}

impl Goals {
    pub fn new(name: impl Into<String>, goals: impl IntoIterator<Item = Goal>) -> Self {
        Self {
            name: name.into(),
            goals: goals.into_iter().collect(),
            locked: false,
        }
    }

    /// Seal this set: additive composition will not merge anything into it.
    pub fn and_lock(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn goal_named(&self, unique_name: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.unique_name == unique_name)
    }

    pub fn unique_names(&self) -> Vec<&str> {
        self.goals.iter().map(|g| g.unique_name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}

/// What a goal setter may produce: one goal, a list, or a named set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalComponent {
    Goal(Goal),
    List(Vec<Goal>),
    Goals(Goals),
}

impl GoalComponent {
    /// Name carried by the component, if it is a named set.
    pub fn name(&self) -> Option<&str> {
        match self {
            GoalComponent::Goals(goals) => Some(&goals.name),
            GoalComponent::Goal(_) | GoalComponent::List(_) => None,
        }
    }

    /// Flatten into a plain goal list.
    pub fn into_goal_list(self) -> Vec<Goal> {
        match self {
            GoalComponent::Goal(goal) => vec![goal],
            GoalComponent::List(goals) => goals,
            GoalComponent::Goals(goals) => goals.goals,
        }
    }

    /// Convert into a named set, naming bare goals with `fallback_name`.
    /// A named set keeps its own name and lock.
    pub fn into_goals(self, fallback_name: &str) -> Goals {
        match self {
            GoalComponent::Goals(goals) => goals,
            other => Goals::new(fallback_name, other.into_goal_list()),
        }
    }
}

impl From<Goal> for GoalComponent {
    fn from(goal: Goal) -> Self {
        GoalComponent::Goal(goal)
    }
}

impl From<Vec<Goal>> for GoalComponent {
    fn from(goals: Vec<Goal>) -> Self {
        GoalComponent::List(goals)
    }
}

impl From<Goals> for GoalComponent {
    fn from(goals: Goals) -> Self {
        GoalComponent::Goals(goals)
    }
}
