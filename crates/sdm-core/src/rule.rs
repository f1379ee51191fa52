//! Guarded rules: a guard built from push tests gating a value.
//!
//! [`PushRule`] resolves to a fixed value. [`GoalSetterMapping`] is the goal
//! flavour, which can also compute its goals from the push or halt the
//! enclosing rule set.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::GoalResult;
use crate::goal::{GoalComponent, Goals};
use crate::mapping::{Guarded, GuardedBody, Mapping, MappingOutcome, PredicateMapping};
use crate::predicate::{all_satisfied, TestInput};
use crate::push::PushContext;
use crate::push_tests;
use crate::scope::EvaluationScope;

/// A mapping that resolves to goals.
pub type GoalSetter = dyn Mapping<Goals>;

pub(crate) async fn guard_passes(
    guard: &PredicateMapping,
    ctx: &PushContext,
    scope: &EvaluationScope,
) -> GoalResult<bool> {
    Ok(matches!(
        guard.map(ctx, scope).await?,
        MappingOutcome::Matched(true)
    ))
}

/// Resolves to `value` when every guard test passes.
pub struct PushRule<V> {
    guard: Arc<PredicateMapping>,
    value: V,
    reason: Option<String>,
}

impl<V> PushRule<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// The guard is the conjunction of `guards`.
    pub fn new(guards: Vec<TestInput>, value: V) -> Self {
        Self {
            guard: all_satisfied(guards),
            value,
            reason: None,
        }
    }

    /// Override the name used for logging and graphing.
    pub fn it_means(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn guard(&self) -> &Arc<PredicateMapping> {
        &self.guard
    }

    pub fn value(&self) -> &V {
        &self.value
    }
}

#[async_trait]
impl<V> Mapping<V> for PushRule<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> String {
        self.reason.clone().unwrap_or_else(|| self.guard.name())
    }

    async fn map(&self, ctx: &PushContext, scope: &EvaluationScope) -> GoalResult<MappingOutcome<V>> {
        if guard_passes(self.guard.as_ref(), ctx, scope).await? {
            Ok(MappingOutcome::Matched(self.value.clone()))
        } else {
            Ok(MappingOutcome::NoMatch)
        }
    }

    fn guarded(&self) -> Option<Guarded<'_, V>> {
        Some(Guarded {
            guard: self.guard.as_ref(),
            prepare: None,
            body: GuardedBody::Value(&self.value),
        })
    }
}

type ComputeGoalsFn = dyn for<'a> Fn(&'a PushContext, &'a EvaluationScope) -> BoxFuture<'a, GoalResult<GoalComponent>>
    + Send
    + Sync;

enum SetterValue {
    Goals(Goals),
    Computed(Arc<ComputeGoalsFn>),
    Halt,
}

/// A guarded rule resolving to goals.
pub struct GoalSetterMapping {
    guard: Arc<PredicateMapping>,
    value: SetterValue,
    reason: Option<String>,
    /// Name of the last computed goal set, for dynamic setters.
    computed_name: RwLock<Option<String>>,
}

impl GoalSetterMapping {
    fn with_value(guard: Arc<PredicateMapping>, reason: Option<String>, value: SetterValue) -> Self {
        Self {
            guard,
            value,
            reason,
            computed_name: RwLock::new(None),
        }
    }

    pub fn guard(&self) -> &Arc<PredicateMapping> {
        &self.guard
    }

    /// The static goals, if this setter has them.
    pub fn goals(&self) -> Option<&Goals> {
        match &self.value {
            SetterValue::Goals(goals) => Some(goals),
            SetterValue::Computed(_) | SetterValue::Halt => None,
        }
    }

    pub fn into_setter(self) -> Arc<GoalSetter> {
        Arc::new(self)
    }
}

#[async_trait]
impl Mapping<Goals> for GoalSetterMapping {
    fn name(&self) -> String {
        if let Some(name) = self.computed_name.read().unwrap().clone() {
            return name;
        }
        self.reason.clone().unwrap_or_else(|| self.guard.name())
    }

    async fn map(
        &self,
        ctx: &PushContext,
        scope: &EvaluationScope,
    ) -> GoalResult<MappingOutcome<Goals>> {
        if !guard_passes(self.guard.as_ref(), ctx, scope).await? {
            return Ok(MappingOutcome::NoMatch);
        }
        match &self.value {
            SetterValue::Goals(goals) => Ok(MappingOutcome::Matched(goals.clone())),
            SetterValue::Halt => Ok(MappingOutcome::Halt),
            SetterValue::Computed(compute) => {
                let component = compute(ctx, scope).await?;
                if let Some(name) = component.name() {
                    *self.computed_name.write().unwrap() = Some(name.to_string());
                }
                let fallback = self.reason.clone().unwrap_or_else(|| self.guard.name());
                Ok(MappingOutcome::Matched(component.into_goals(&fallback)))
            }
        }
    }

    fn guarded(&self) -> Option<Guarded<'_, Goals>> {
        let body = match &self.value {
            SetterValue::Goals(goals) => GuardedBody::Value(goals),
            SetterValue::Halt => GuardedBody::Halt,
            SetterValue::Computed(_) => return None,
        };
        Some(Guarded {
            guard: self.guard.as_ref(),
            prepare: None,
            body,
        })
    }
}

/// Start a goal setter guarded by the conjunction of `tests`.
pub fn when_push_satisfies(tests: Vec<TestInput>) -> GoalSetterBuilder {
    GoalSetterBuilder {
        guard: all_satisfied(tests),
        reason: None,
    }
}

/// Start a goal setter that applies to every push.
pub fn on_any_push() -> GoalSetterBuilder {
    GoalSetterBuilder {
        guard: push_tests::on_any_push().into_mapping(),
        reason: None,
    }
}

/// Guard awaiting its goals.
pub struct GoalSetterBuilder {
    guard: Arc<PredicateMapping>,
    reason: Option<String>,
}

impl GoalSetterBuilder {
    pub fn it_means(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Resolve to fixed goals. Bare goals are named after the rule.
    pub fn set_goals(self, goals: impl Into<GoalComponent>) -> GoalSetterMapping {
        let name = self.reason.clone().unwrap_or_else(|| self.guard.name());
        let goals = goals.into().into_goals(&name);
        GoalSetterMapping::with_value(self.guard, self.reason, SetterValue::Goals(goals))
    }

    /// Compute goals from the push once the guard has passed.
    pub fn set_goals_when<F>(self, compute: F) -> GoalSetterMapping
    where
        F: for<'a> Fn(&'a PushContext, &'a EvaluationScope) -> BoxFuture<'a, GoalResult<GoalComponent>>
            + Send
            + Sync
            + 'static,
    {
        GoalSetterMapping::with_value(
            self.guard,
            self.reason,
            SetterValue::Computed(Arc::new(compute)),
        )
    }

    /// Stop the enclosing rule set with no goals.
    pub fn do_not_set_goals(self) -> GoalSetterMapping {
        GoalSetterMapping::with_value(self.guard, self.reason, SetterValue::Halt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GoalError;
    use crate::goal::Goal;
    use crate::mapping::PredicateCost;
    use crate::predicate::PushTest;
    use crate::push::{Push, RepoRef};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn constant(name: &str, value: bool) -> TestInput {
        PushTest::sync(name, PredicateCost::Cheap, move |_, _| Ok(value)).into()
    }

    fn ctx() -> PushContext {
        PushContext::new(Push::new(RepoRef::new("o", "r"), "main"))
    }

    #[tokio::test]
    async fn test_push_rule_resolves_value_when_guard_passes() {
        let rule = PushRule::new(vec![constant("yes", true)], 42u32);
        let scope = EvaluationScope::new();
        assert_eq!(
            rule.map(&ctx(), &scope).await.unwrap(),
            MappingOutcome::Matched(42)
        );
        assert_eq!(rule.name(), "yes");
        assert_eq!(*rule.value(), 42);
    }

    #[tokio::test]
    async fn test_push_rule_guard_is_conjunction() {
        let rule = PushRule::new(vec![constant("yes", true), constant("no", false)], 1u32)
            .it_means("both");
        let scope = EvaluationScope::new();
        assert_eq!(
            rule.map(&ctx(), &scope).await.unwrap(),
            MappingOutcome::NoMatch
        );
        assert_eq!(rule.name(), "both");
        assert_eq!(rule.guard().name(), "yes && no");
    }

    #[tokio::test]
    async fn test_set_goals_names_bare_goals_after_rule() {
        let setter = when_push_satisfies(vec![constant("yes", true)])
            .it_means("build it")
            .set_goals(Goal::new("build"));
        let scope = EvaluationScope::new();
        let goals = setter.map(&ctx(), &scope).await.unwrap().into_matched().unwrap();
        assert_eq!(goals.name, "build it");
        assert_eq!(goals.unique_names(), vec!["build"]);
        assert!(setter.goals().is_some());
    }

    #[tokio::test]
    async fn test_set_goals_when_skips_compute_when_guard_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let setter = when_push_satisfies(vec![constant("no", false)]).set_goals_when(
            move |_, _| {
                counted.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok::<_, GoalError>(GoalComponent::from(Goal::new("build"))) })
            },
        );
        let scope = EvaluationScope::new();
        assert_eq!(
            setter.map(&ctx(), &scope).await.unwrap(),
            MappingOutcome::NoMatch
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(setter.guarded().is_none());
    }

    #[tokio::test]
    async fn test_set_goals_when_takes_computed_name() {
        let setter = when_push_satisfies(vec![constant("yes", true)]).set_goals_when(|ctx, _| {
            Box::pin(async move {
                let branch = ctx.push()?.branch.clone();
                Ok::<GoalComponent, GoalError>(
                    Goals::new(format!("goals for {branch}"), vec![Goal::new("build")]).into(),
                )
            })
        });
        assert_eq!(setter.name(), "yes");

        let scope = EvaluationScope::new();
        let goals = setter.map(&ctx(), &scope).await.unwrap().into_matched().unwrap();
        assert_eq!(goals.name, "goals for main");
        assert_eq!(setter.name(), "goals for main");
    }

    #[tokio::test]
    async fn test_do_not_set_goals_halts() {
        let setter = when_push_satisfies(vec![constant("yes", true)]).do_not_set_goals();
        let scope = EvaluationScope::new();
        assert_eq!(
            setter.map(&ctx(), &scope).await.unwrap(),
            MappingOutcome::Halt
        );
    }

    #[tokio::test]
    async fn test_on_any_push_needs_no_push_data() {
        let setter = on_any_push().set_goals(Goal::new("build"));
        let scope = EvaluationScope::new();
        let outcome = setter.map(&PushContext::partial(), &scope).await.unwrap();
        assert!(outcome.is_matched());
    }
}
