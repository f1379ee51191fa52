//! Per-evaluation scratch state.
//!
//! One [`EvaluationScope`] is created for every decision pass. Decision-tree
//! `init`/`compute` hooks and push tests share values through it instead of
//! through captured variables, so two pushes decided concurrently against the
//! same rule graph never see each other's state.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a rule set does when one of its rules fails to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// The first rule error aborts the whole decision pass.
    #[default]
    FailFast,
    /// A failing rule is logged, recorded, and treated as not matching.
    IsolateAndReport,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-fast" => Ok(FailurePolicy::FailFast),
            "isolate-and-report" => Ok(FailurePolicy::IsolateAndReport),
            other => Err(format!(
                "unknown failure policy '{other}' (expected fail-fast or isolate-and-report)"
            )),
        }
    }
}

/// A rule that failed under [`FailurePolicy::IsolateAndReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub rule: String,
    pub reason: String,
}

/// Key/value scratch space for one decision pass.
#[derive(Debug, Default)]
pub struct EvaluationScope {
    policy: FailurePolicy,
    values: Mutex<HashMap<String, Value>>,
    failures: Mutex<Vec<RuleFailure>>,
}

impl EvaluationScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: FailurePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.lock().unwrap().insert(key.into(), value);
    }

    /// Add one to an integer value (missing or non-integer counts as 0) and
    /// return the new value.
    pub fn increment(&self, key: &str) -> i64 {
        let mut values = self.values.lock().unwrap();
        let next = values.get(key).and_then(Value::as_i64).unwrap_or(0) + 1;
        values.insert(key.to_string(), Value::from(next));
        next
    }

    pub fn record_failure(&self, rule: impl Into<String>, reason: impl Into<String>) {
        self.failures.lock().unwrap().push(RuleFailure {
            rule: rule.into(),
            reason: reason.into(),
        });
    }

    pub fn failures(&self) -> Vec<RuleFailure> {
        self.failures.lock().unwrap().clone()
    }
}
