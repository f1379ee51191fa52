//! Declarative rules files.
//!
//! ```toml
//! composition = "first-match"
//!
//! [[goal]]
//! name = "build"
//!
//! [[goal]]
//! name = "publish"
//! environment = "2-prod"
//! depends_on = ["build"]
//! approval_required = true
//!
//! [[rule]]
//! name = "skip requested"
//! when = [{ test = "has_commit_message_matching", pattern = "\\[skip ci\\]" }]
//! halt = true
//!
//! [[rule]]
//! name = "release"
//! when = [
//!     { test = "to_default_branch" },
//!     { test = "has_file", path = "Cargo.toml" },
//! ]
//! goals = ["build", "publish"]
//! lock = true
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;

use sdm_core::goal::environment;
use sdm_core::predicate::{any_satisfied, not};
use sdm_core::{
    all_matches, first_match, push_tests, when_push_satisfies, EngineConfig, Goal, GoalDecider,
    GoalSetter, Goals, TestInput,
};

/// How rules combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Composition {
    /// The first matching rule sets the goals.
    #[default]
    FirstMatch,
    /// Every matching rule contributes goals.
    Additive,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoalSpec {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub pre_approval_required: bool,
    #[serde(default)]
    pub retry_feasible: bool,
}

/// A push test as written in a rules file, tagged by `test`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum PredicateSpec {
    OnAnyPush,
    ToDefaultBranch,
    ToBranch { branch: String },
    ToBranchMatching { pattern: String },
    IsRepo { owner: String, name: String },
    HasFile { path: String },
    HasFileContaining { path: String, pattern: String },
    HasCommitMessageMatching { pattern: String },
    IsMaterialChange { extensions: Vec<String> },
    Not { of: Box<PredicateSpec> },
    Any { of: Vec<PredicateSpec> },
}

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("invalid pattern '{pattern}'"))
}

impl PredicateSpec {
    pub fn build(&self) -> Result<TestInput> {
        let input: TestInput = match self {
            PredicateSpec::OnAnyPush => push_tests::on_any_push().into(),
            PredicateSpec::ToDefaultBranch => push_tests::to_default_branch().into(),
            PredicateSpec::ToBranch { branch } => push_tests::to_branch(branch.clone()).into(),
            PredicateSpec::ToBranchMatching { pattern } => {
                push_tests::to_branch_matching(regex(pattern)?).into()
            }
            PredicateSpec::IsRepo { owner, name } => {
                push_tests::is_repo(owner.clone(), name.clone()).into()
            }
            PredicateSpec::HasFile { path } => push_tests::has_file(path.clone()).into(),
            PredicateSpec::HasFileContaining { path, pattern } => {
                push_tests::has_file_containing(path.clone(), regex(pattern)?).into()
            }
            PredicateSpec::HasCommitMessageMatching { pattern } => {
                push_tests::has_commit_message_matching(regex(pattern)?).into()
            }
            PredicateSpec::IsMaterialChange { extensions } => {
                push_tests::is_material_change(extensions.clone()).into()
            }
            PredicateSpec::Not { of } => not(of.build()?).into(),
            PredicateSpec::Any { of } => {
                let tests = of.iter().map(PredicateSpec::build).collect::<Result<Vec<_>>>()?;
                any_satisfied(tests).into()
            }
        };
        Ok(input)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub when: Vec<PredicateSpec>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub lock: bool,
    /// Stop the rule set without goals when this rule matches.
    #[serde(default)]
    pub halt: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesFile {
    #[serde(default)]
    pub composition: Composition,
    #[serde(default, rename = "goal")]
    pub goals: Vec<GoalSpec>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleSpec>,
}

impl RulesFile {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid rules file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rules file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Goal definitions by name. Preconditions must be declared earlier in
    /// the file, which also rules out cycles.
    pub fn goal_definitions(&self) -> Result<HashMap<String, Goal>> {
        let mut defined: HashMap<String, Goal> = HashMap::new();
        for spec in &self.goals {
            if defined.contains_key(&spec.name) {
                bail!("goal '{}' is defined twice", spec.name);
            }
            let mut goal = Goal::new(spec.name.clone())
                .in_environment(spec.environment.as_deref().unwrap_or(environment::CODE));
            if let Some(display_name) = &spec.display_name {
                goal = goal.with_display_name(display_name.clone());
            }
            if spec.approval_required {
                goal = goal.requiring_approval();
            }
            if spec.pre_approval_required {
                goal = goal.requiring_pre_approval();
            }
            if spec.retry_feasible {
                goal = goal.retryable();
            }
            let mut preconditions = Vec::with_capacity(spec.depends_on.len());
            for dependency in &spec.depends_on {
                let Some(found) = defined.get(dependency) else {
                    bail!(
                        "goal '{}' depends on '{}', which is not defined before it",
                        spec.name,
                        dependency
                    );
                };
                preconditions.push(found.clone());
            }
            defined.insert(spec.name.clone(), goal.with_preconditions(preconditions));
        }
        Ok(defined)
    }

    fn build_rule(&self, rule: &RuleSpec, goals: &HashMap<String, Goal>) -> Result<Arc<GoalSetter>> {
        let tests = rule
            .when
            .iter()
            .map(PredicateSpec::build)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("in rule '{}'", rule.name))?;
        let builder = when_push_satisfies(tests).it_means(rule.name.clone());

        if rule.halt {
            if !rule.goals.is_empty() || rule.lock {
                bail!("rule '{}' halts, so it cannot set or lock goals", rule.name);
            }
            return Ok(builder.do_not_set_goals().into_setter());
        }

        let mut resolved = Vec::with_capacity(rule.goals.len());
        for name in &rule.goals {
            let goal = goals
                .get(name)
                .with_context(|| format!("rule '{}' uses undefined goal '{}'", rule.name, name))?;
            resolved.push(goal.clone());
        }
        let mut set = Goals::new(rule.name.clone(), resolved);
        if rule.lock {
            set = set.and_lock();
        }
        Ok(builder.set_goals(set).into_setter())
    }

    /// The composed rule set.
    pub fn build_chain(&self) -> Result<Arc<GoalSetter>> {
        let goals = self.goal_definitions()?;
        let rules = self
            .rules
            .iter()
            .map(|rule| self.build_rule(rule, &goals))
            .collect::<Result<Vec<_>>>()?;
        Ok(match self.composition {
            Composition::FirstMatch => first_match("rules", rules),
            Composition::Additive => all_matches("rules", rules),
        })
    }

    pub fn into_decider(self, config: EngineConfig) -> Result<GoalDecider> {
        Ok(GoalDecider::new(config).with_chain(self.build_chain()?))
    }
}
