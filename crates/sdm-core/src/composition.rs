//! Goal-set composition.
//!
//! [`FirstMatch`] runs rules in declaration order and takes the first match.
//! [`AllMatches`] runs every contributor concurrently and unions the goals.
//! [`enrich_goal_setters`] layers one setter's goals onto another's.
//!
//! Rule errors go through the scope's [`FailurePolicy`]: fail-fast
//! propagates them, isolate-and-report records them and moves on as if the
//! rule had not matched.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future;

use crate::error::GoalResult;
use crate::goal::{dedupe_goals, Goals};
use crate::mapping::{CompositionStyle, Mapping, MappingOutcome, Structure};
use crate::metrics::METRICS;
use crate::obs;
use crate::push::PushContext;
use crate::rule::GoalSetter;
use crate::scope::{EvaluationScope, FailurePolicy};

/// Evaluate one rule, applying the scope's failure policy to its error.
pub async fn evaluate_rule<V>(
    rule: &dyn Mapping<V>,
    ctx: &PushContext,
    scope: &EvaluationScope,
) -> GoalResult<MappingOutcome<V>> {
    match rule.map(ctx, scope).await {
        Ok(outcome) => {
            if outcome.is_matched() {
                obs::emit_rule_matched(&rule.name());
            }
            Ok(outcome)
        }
        Err(err) if scope.policy() == FailurePolicy::IsolateAndReport => {
            let name = rule.name();
            obs::emit_rule_failed(&name, &err);
            scope.record_failure(name, err.to_string());
            METRICS.inc_rule_failures();
            Ok(MappingOutcome::NoMatch)
        }
        Err(err) => Err(err),
    }
}

/// Run `rules` in order; the first match wins.
///
/// A `Halt` stops the sequence and the overall result is `NoMatch`.
pub async fn first_matching<V>(
    rules: &[Arc<dyn Mapping<V>>],
    ctx: &PushContext,
    scope: &EvaluationScope,
) -> GoalResult<MappingOutcome<V>> {
    for rule in rules {
        match evaluate_rule(rule.as_ref(), ctx, scope).await? {
            MappingOutcome::Matched(value) => return Ok(MappingOutcome::Matched(value)),
            MappingOutcome::NoMatch => continue,
            MappingOutcome::Halt => {
                tracing::debug!(rule = %rule.name(), "rule halted the sequence");
                return Ok(MappingOutcome::NoMatch);
            }
        }
    }
    Ok(MappingOutcome::NoMatch)
}

/// Ordered, winner-takes-all rule set.
pub struct FirstMatch<V> {
    name: String,
    structure: Structure<V>,
}

impl<V> FirstMatch<V>
where
    V: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, rules: Vec<Arc<dyn Mapping<V>>>) -> Self {
        Self {
            name: name.into(),
            structure: Structure::new(CompositionStyle::FirstMatch, rules),
        }
    }

    pub fn rules(&self) -> &[Arc<dyn Mapping<V>>] {
        &self.structure.components
    }

    pub fn into_mapping(self) -> Arc<dyn Mapping<V>> {
        Arc::new(self)
    }
}

#[async_trait]
impl<V> Mapping<V> for FirstMatch<V>
where
    V: Send + Sync + 'static,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn map(&self, ctx: &PushContext, scope: &EvaluationScope) -> GoalResult<MappingOutcome<V>> {
        first_matching(self.rules(), ctx, scope).await
    }

    fn structure(&self) -> Option<&Structure<V>> {
        Some(&self.structure)
    }
}

/// A first-match goal setter over `rules`.
pub fn first_match(name: impl Into<String>, rules: Vec<Arc<GoalSetter>>) -> Arc<GoalSetter> {
    FirstMatch::new(name, rules).into_mapping()
}

/// Additive goal setter: every contributor runs and their goals are merged.
pub struct AllMatches {
    name: String,
    structure: Structure<Goals>,
}

impl AllMatches {
    pub fn new(name: impl Into<String>, contributors: Vec<Arc<GoalSetter>>) -> Self {
        Self {
            name: name.into(),
            structure: Structure::new(CompositionStyle::AllMatches, contributors),
        }
    }

    pub fn contributors(&self) -> &[Arc<GoalSetter>] {
        &self.structure.components
    }
}

/// Merge contributions in declaration order.
///
/// A locked contribution is merged and then ends the merge; the result
/// carries the lock. `None` when nothing contributed.
pub(crate) fn merge_contributions(contributions: impl IntoIterator<Item = Goals>) -> Option<Goals> {
    let mut names = Vec::new();
    let mut goals = Vec::new();
    let mut locked = false;
    for contribution in contributions {
        names.push(contribution.name.clone());
        goals.extend(contribution.goals.iter().cloned());
        if contribution.is_locked() {
            locked = true;
            break;
        }
    }
    let goals = dedupe_goals(goals);
    if goals.is_empty() && !locked {
        return None;
    }
    let merged = Goals::new(names.join(", "), goals);
    Some(if locked { merged.and_lock() } else { merged })
}

#[async_trait]
impl Mapping<Goals> for AllMatches {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn map(
        &self,
        ctx: &PushContext,
        scope: &EvaluationScope,
    ) -> GoalResult<MappingOutcome<Goals>> {
        let outcomes = future::join_all(
            self.contributors()
                .iter()
                .map(|contributor| evaluate_rule(contributor.as_ref(), ctx, scope)),
        )
        .await;

        let mut contributions = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            // Halt only stops first-match sequences; here it contributes nothing.
            if let Some(goals) = outcome?.into_matched() {
                contributions.push(goals);
            }
        }
        Ok(merge_contributions(contributions).into())
    }

    fn structure(&self) -> Option<&Structure<Goals>> {
        Some(&self.structure)
    }
}

/// An additive goal setter over `contributors`.
pub fn all_matches(name: impl Into<String>, contributors: Vec<Arc<GoalSetter>>) -> Arc<GoalSetter> {
    Arc::new(AllMatches::new(name, contributors))
}

struct Enriched {
    name: String,
    structure: Structure<Goals>,
}

#[async_trait]
impl Mapping<Goals> for Enriched {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn map(
        &self,
        ctx: &PushContext,
        scope: &EvaluationScope,
    ) -> GoalResult<MappingOutcome<Goals>> {
        let [old, new] = [&self.structure.components[0], &self.structure.components[1]];

        let old_goals = evaluate_rule(old.as_ref(), ctx, scope).await?.into_matched();
        if let Some(goals) = &old_goals {
            if goals.is_locked() {
                return Ok(MappingOutcome::Matched(goals.clone()));
            }
        }

        let new_goals = evaluate_rule(new.as_ref(), ctx, scope).await?.into_matched();
        let merged = match (old_goals, new_goals) {
            (Some(old), Some(new)) => merge_contributions([old, new]),
            (Some(only), None) | (None, Some(only)) => Some(only),
            (None, None) => None,
        };
        Ok(merged.into())
    }

    fn structure(&self) -> Option<&Structure<Goals>> {
        Some(&self.structure)
    }
}

/// Add `new`'s goals to whatever `old` resolves to.
///
/// A locked result from `old` is returned untouched and `new` is not run.
pub fn enrich_goal_setters(old: Arc<GoalSetter>, new: Arc<GoalSetter>) -> Arc<GoalSetter> {
    Arc::new(Enriched {
        name: format!("{}, {}", old.name(), new.name()),
        structure: Structure::new(CompositionStyle::Enrich, vec![old, new]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GoalError;
    use crate::goal::Goal;
    use crate::mapping::PredicateCost;
    use crate::predicate::PushTest;
    use crate::rule::{on_any_push, when_push_satisfies};
    use crate::push::{Push, RepoRef};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn constant(name: &str, value: bool) -> PushTest {
        PushTest::sync(name, PredicateCost::Cheap, move |_, _| Ok(value))
    }

    fn ctx() -> PushContext {
        PushContext::new(Push::new(RepoRef::new("o", "r"), "main"))
    }

    fn setter(guard: bool, name: &str, goals: &[&str]) -> Arc<GoalSetter> {
        when_push_satisfies(vec![constant("guard", guard).into()])
            .it_means(name)
            .set_goals(goals.iter().map(|g| Goal::new(*g)).collect::<Vec<_>>())
            .into_setter()
    }

    fn failing(name: &str) -> Arc<GoalSetter> {
        let test = PushTest::sync("explodes", PredicateCost::Cheap, |_, _| {
            Err(GoalError::Predicate {
                name: "explodes".to_string(),
                reason: "boom".to_string(),
            })
        });
        when_push_satisfies(vec![test.into()])
            .it_means(name)
            .set_goals(Goal::new("never"))
            .into_setter()
    }

    #[tokio::test]
    async fn test_empty_first_match_is_no_match() {
        let chain = first_match("empty", vec![]);
        let scope = EvaluationScope::new();
        assert_eq!(
            chain.map(&ctx(), &scope).await.unwrap(),
            MappingOutcome::NoMatch
        );
    }

    #[tokio::test]
    async fn test_first_match_skips_non_matching_rules() {
        let chain = first_match(
            "chain",
            vec![setter(false, "x", &["x"]), setter(true, "g", &["g"])],
        );
        let scope = EvaluationScope::new();
        let goals = chain.map(&ctx(), &scope).await.unwrap().into_matched().unwrap();
        assert_eq!(goals.unique_names(), vec!["g"]);
        assert_eq!(chain.structure().unwrap().style, CompositionStyle::FirstMatch);
    }

    #[tokio::test]
    async fn test_halt_stops_first_match() {
        let halt = on_any_push().do_not_set_goals().into_setter();
        let chain = first_match("chain", vec![halt, setter(true, "g", &["g"])]);
        let scope = EvaluationScope::new();
        assert_eq!(
            chain.map(&ctx(), &scope).await.unwrap(),
            MappingOutcome::NoMatch
        );
    }

    #[tokio::test]
    async fn test_first_match_stops_at_first_match() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let later = PushTest::sync("counted", PredicateCost::Cheap, move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });
        let chain = first_match(
            "chain",
            vec![
                setter(true, "first", &["a"]),
                when_push_satisfies(vec![later.into()])
                    .set_goals(Goal::new("b"))
                    .into_setter(),
            ],
        );
        let scope = EvaluationScope::new();
        chain.map(&ctx(), &scope).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fail_fast_propagates() {
        let chain = first_match("chain", vec![failing("bad"), setter(true, "g", &["g"])]);
        let scope = EvaluationScope::new();
        let err = chain.map(&ctx(), &scope).await.unwrap_err();
        assert!(matches!(err, GoalError::Predicate { .. }));
    }

    #[tokio::test]
    async fn test_isolate_and_report_skips_failing_rule() {
        let chain = first_match("chain", vec![failing("bad"), setter(true, "g", &["g"])]);
        let scope = EvaluationScope::with_policy(FailurePolicy::IsolateAndReport);
        let goals = chain.map(&ctx(), &scope).await.unwrap().into_matched().unwrap();
        assert_eq!(goals.unique_names(), vec!["g"]);

        let failures = scope.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].rule, "bad");
        assert!(failures[0].reason.contains("boom"));
    }

    #[tokio::test]
    async fn test_all_matches_unions_with_dedup() {
        let additive = all_matches(
            "additive",
            vec![
                setter(true, "A", &["g1"]),
                setter(true, "B", &["g1", "g2"]),
                setter(false, "C", &["g3"]),
            ],
        );
        let scope = EvaluationScope::new();
        let goals = additive.map(&ctx(), &scope).await.unwrap().into_matched().unwrap();
        assert_eq!(goals.unique_names(), vec!["g1", "g2"]);
        assert_eq!(goals.name, "A, B");
        assert!(!goals.is_locked());
    }

    #[tokio::test]
    async fn test_all_matches_nothing_contributed() {
        let additive = all_matches("additive", vec![setter(false, "A", &["g1"])]);
        let scope = EvaluationScope::new();
        assert_eq!(
            additive.map(&ctx(), &scope).await.unwrap(),
            MappingOutcome::NoMatch
        );
    }

    #[tokio::test]
    async fn test_all_matches_locked_contribution_is_terminal() {
        let locked = on_any_push()
            .set_goals(Goals::new("release", vec![Goal::new("g2")]).and_lock())
            .into_setter();
        let additive = all_matches(
            "additive",
            vec![setter(true, "A", &["g1"]), locked, setter(true, "C", &["g3"])],
        );
        let scope = EvaluationScope::new();
        let goals = additive.map(&ctx(), &scope).await.unwrap().into_matched().unwrap();
        assert_eq!(goals.unique_names(), vec!["g1", "g2"]);
        assert!(goals.is_locked());
    }

    #[tokio::test]
    async fn test_enrich_leaves_locked_goals_alone() {
        let locked = on_any_push()
            .set_goals(Goals::new("release", vec![Goal::new("build")]).and_lock())
            .into_setter();
        let enriched = enrich_goal_setters(locked, setter(true, "H", &["lint"]));
        let scope = EvaluationScope::new();
        let goals = enriched.map(&ctx(), &scope).await.unwrap().into_matched().unwrap();
        assert_eq!(goals.name, "release");
        assert_eq!(goals.unique_names(), vec!["build"]);
        assert!(goals.is_locked());
    }

    #[tokio::test]
    async fn test_enrich_merges_and_falls_back() {
        let scope = EvaluationScope::new();

        let enriched = enrich_goal_setters(setter(true, "G", &["build"]), setter(true, "H", &["build", "lint"]));
        let goals = enriched.map(&ctx(), &scope).await.unwrap().into_matched().unwrap();
        assert_eq!(goals.unique_names(), vec!["build", "lint"]);
        assert_eq!(goals.name, "G, H");

        let fallback = enrich_goal_setters(setter(false, "G", &["build"]), setter(true, "H", &["lint"]));
        let goals = fallback.map(&ctx(), &scope).await.unwrap().into_matched().unwrap();
        assert_eq!(goals.name, "H");
        assert_eq!(goals.unique_names(), vec!["lint"]);
    }
}
