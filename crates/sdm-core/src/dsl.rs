//! Decision trees.
//!
//! ```ignore
//! let tree = given(vec![push_tests::has_file("Cargo.toml").into()])
//!     .it_means("rust project")
//!     .then(vec![
//!         given(vec![push_tests::to_default_branch().into()])
//!             .it_means("release")
//!             .set(release_goals),
//!         given(vec![]).it_means("branch build").set(build_goals),
//!     ]);
//! ```
//!
//! A node's children are a first-match set and only run when the node's
//! guard passes. Per-pass state set up by `init` and `compute` lives in the
//! [`EvaluationScope`], never in the tree.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::composition::FirstMatch;
use crate::error::GoalResult;
use crate::mapping::{
    Guarded, GuardedBody, Mapping, MappingOutcome, PredicateCost, PredicateMapping, ScopeHook,
    Structure,
};
use crate::predicate::{all_satisfied, TestInput};
use crate::push::PushContext;
use crate::rule::guard_passes;
use crate::scope::EvaluationScope;

type InitFn = dyn Fn(&EvaluationScope) + Send + Sync;


/// Start a decision node guarded by the conjunction of `tests`.
pub fn given(tests: Vec<TestInput>) -> Given {
    Given {
        tests,
        init: Vec::new(),
    }
}

/// A node whose guard is still being assembled.
pub struct Given {
    tests: Vec<TestInput>,
    init: Vec<Arc<InitFn>>,
}

impl Given {
    /// Prepare scope values before the guard is evaluated. Runs on every
    /// evaluation of this node.
    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(&EvaluationScope) + Send + Sync + 'static,
    {
        self.init.push(Arc::new(f));
        self
    }

    /// Freeze the guard and label the node.
    pub fn it_means(self, name: impl Into<String>) -> Named {
        let tests = all_satisfied(self.tests);
        let guard: Arc<PredicateMapping> = if self.init.is_empty() {
            tests
        } else {
            Arc::new(ScopedGuard {
                init: self.init,
                tests,
            })
        };
        Named {
            name: name.into(),
            guard,
            compute: None,
        }
    }
}

/// Guard that runs `init` hooks against the scope before testing.
struct ScopedGuard {
    init: Vec<Arc<InitFn>>,
    tests: Arc<PredicateMapping>,
}

#[async_trait]
impl Mapping<bool> for ScopedGuard {
    fn name(&self) -> String {
        self.tests.name()
    }

    async fn map(
        &self,
        ctx: &PushContext,
        scope: &EvaluationScope,
    ) -> GoalResult<MappingOutcome<bool>> {
        for init in &self.init {
            init(scope);
        }
        self.tests.map(ctx, scope).await
    }

    fn structure(&self) -> Option<&Structure<bool>> {
        self.tests.structure()
    }

    fn cost(&self) -> PredicateCost {
        self.tests.cost()
    }
}

/// A labelled node awaiting its body.
pub struct Named {
    name: String,
    guard: Arc<PredicateMapping>,
    compute: Option<Arc<ScopeHook>>,
}

impl Named {
    /// Update scope values after the guard passed, before the body runs.
    pub fn compute<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a PushContext, &'a EvaluationScope) -> BoxFuture<'a, GoalResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.compute = Some(Arc::new(f));
        self
    }

    /// Branch into `children`, tried in order once the guard passes.
    pub fn then<V>(self, children: Vec<Arc<dyn Mapping<V>>>) -> Arc<dyn Mapping<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let rules = FirstMatch::new(self.name.clone(), children);
        self.finish(NodeBody::Rules(rules))
    }

    /// Leaf resolving to `value` once the guard passes.
    pub fn set<V>(self, value: V) -> Arc<dyn Mapping<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        self.finish(NodeBody::Value(value))
    }

    fn finish<V>(self, body: NodeBody<V>) -> Arc<dyn Mapping<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        Arc::new(DecisionNode {
            name: self.name,
            guard: self.guard,
            compute: self.compute,
            body,
        })
    }
}

enum NodeBody<V> {
    Value(V),
    Rules(FirstMatch<V>),
}

struct DecisionNode<V> {
    name: String,
    guard: Arc<PredicateMapping>,
    compute: Option<Arc<ScopeHook>>,
    body: NodeBody<V>,
}

#[async_trait]
impl<V> Mapping<V> for DecisionNode<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn map(&self, ctx: &PushContext, scope: &EvaluationScope) -> GoalResult<MappingOutcome<V>> {
        if !guard_passes(self.guard.as_ref(), ctx, scope).await? {
            return Ok(MappingOutcome::NoMatch);
        }
        if let Some(compute) = &self.compute {
            compute(ctx, scope).await?;
        }
        match &self.body {
            NodeBody::Value(value) => Ok(MappingOutcome::Matched(value.clone())),
            NodeBody::Rules(rules) => rules.map(ctx, scope).await,
        }
    }

    fn guarded(&self) -> Option<Guarded<'_, V>> {
        let body = match &self.body {
            NodeBody::Value(value) => GuardedBody::Value(value),
            NodeBody::Rules(rules) => GuardedBody::Rules(rules),
        };
        Some(Guarded {
            guard: self.guard.as_ref(),
            prepare: self.compute.as_deref(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GoalError;
    use crate::goal::{Goal, Goals};
    use crate::predicate::PushTest;
    use crate::push::{Push, RepoRef};
    use serde_json::json;

    fn constant(name: &str, value: bool) -> TestInput {
        PushTest::sync(name, PredicateCost::Cheap, move |_, _| Ok(value)).into()
    }

    fn ctx(branch: &str) -> PushContext {
        PushContext::new(Push::new(RepoRef::new("o", "r"), branch))
    }

    fn goals(name: &str) -> Goals {
        Goals::new(name, vec![Goal::new(name)])
    }

    fn lang_is(lang: &'static str) -> TestInput {
        PushTest::sync(format!("lang is {lang}"), PredicateCost::Cheap, move |_, scope| {
            Ok(scope.get("lang") == Some(json!(lang)))
        })
        .into()
    }

    #[tokio::test]
    async fn test_leaf_sets_value_when_guard_passes() {
        let leaf = given(vec![constant("yes", true)]).it_means("leaf").set(goals("build"));
        let scope = EvaluationScope::new();
        let result = leaf.map(&ctx("main"), &scope).await.unwrap();
        assert_eq!(result.into_matched().unwrap().name, "build");
        assert_eq!(leaf.name(), "leaf");

        let blocked = given(vec![constant("no", false)]).it_means("leaf").set(goals("build"));
        assert_eq!(
            blocked.map(&ctx("main"), &scope).await.unwrap(),
            MappingOutcome::NoMatch
        );
    }

    #[tokio::test]
    async fn test_children_are_first_match() {
        let tree = given(vec![constant("yes", true)]).it_means("root").then(vec![
            given(vec![constant("no", false)]).it_means("a").set(goals("a")),
            given(vec![constant("yes", true)]).it_means("b").set(goals("b")),
            given(vec![constant("yes", true)]).it_means("c").set(goals("c")),
        ]);
        let scope = EvaluationScope::new();
        let result = tree.map(&ctx("main"), &scope).await.unwrap();
        assert_eq!(result.into_matched().unwrap().name, "b");

        match tree.guarded().unwrap().body {
            GuardedBody::Rules(rules) => assert_eq!(rules.structure().unwrap().components.len(), 3),
            _ => panic!("expected a rules body"),
        }
    }

    #[tokio::test]
    async fn test_children_skipped_when_guard_fails() {
        let tree = given(vec![constant("no", false)]).it_means("root").then(vec![
            given(vec![constant("yes", true)]).it_means("a").set(goals("a")),
        ]);
        let scope = EvaluationScope::new();
        assert_eq!(
            tree.map(&ctx("main"), &scope).await.unwrap(),
            MappingOutcome::NoMatch
        );
    }

    #[tokio::test]
    async fn test_compute_feeds_nested_guards() {
        let tree = given(vec![constant("yes", true)])
            .init(|scope| scope.set("lang", json!(null)))
            .it_means("detect language")
            .compute(|ctx, scope| {
                Box::pin(async move {
                    let lang = if ctx.push()?.branch.starts_with("java/") { "java" } else { "rust" };
                    scope.set("lang", json!(lang));
                    Ok::<_, GoalError>(())
                })
            })
            .then(vec![
                given(vec![lang_is("java")]).it_means("maven").set(goals("maven")),
                given(vec![lang_is("rust")]).it_means("cargo").set(goals("cargo")),
            ]);

        let scope = EvaluationScope::new();
        let result = tree.map(&ctx("main"), &scope).await.unwrap();
        assert_eq!(result.into_matched().unwrap().name, "cargo");

        let scope = EvaluationScope::new();
        let result = tree.map(&ctx("java/feature"), &scope).await.unwrap();
        assert_eq!(result.into_matched().unwrap().name, "maven");

        assert!(tree.guarded().unwrap().prepare.is_some());
    }

    #[tokio::test]
    async fn test_init_runs_every_evaluation_against_its_scope() {
        let tree = given(vec![constant("yes", true)])
            .init(|scope| {
                scope.increment("visits");
            })
            .it_means("counted")
            .set(goals("build"));

        let first = EvaluationScope::new();
        let second = EvaluationScope::new();
        let c = ctx("main");
        let (a, b) = tokio::join!(tree.map(&c, &first), tree.map(&c, &second));
        assert!(a.unwrap().is_matched());
        assert!(b.unwrap().is_matched());
        assert_eq!(first.get("visits"), Some(json!(1)));
        assert_eq!(second.get("visits"), Some(json!(1)));

        tree.map(&c, &first).await.unwrap();
        assert_eq!(first.get("visits"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_compute_errors_propagate() {
        let tree = given(vec![constant("yes", true)])
            .it_means("needs push")
            .compute(|ctx, _| {
                Box::pin(async move {
                    ctx.push()?;
                    Ok::<_, GoalError>(())
                })
            })
            .set(goals("build"));
        let scope = EvaluationScope::new();
        let err = tree.map(&PushContext::partial(), &scope).await.unwrap_err();
        assert!(err.is_insufficient_data());
    }
}
