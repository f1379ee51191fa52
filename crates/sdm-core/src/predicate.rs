//! Push tests and their boolean combinators.
//!
//! A [`PushTest`] is a named async predicate over a push. A
//! [`ProjectPredicate`] only needs the project handle. Both can be fed to
//! [`all_satisfied`] and [`any_satisfied`] through the [`TestInput`] union.
//!
//! Combinators evaluate every component concurrently; there is no
//! short-circuiting inside one guard.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, BoxFuture};

use crate::cache::PushTestCache;
use crate::error::GoalResult;
use crate::mapping::{
    CompositionStyle, Mapping, MappingOutcome, PredicateCost, PredicateMapping, Structure,
};
use crate::project::Project;
use crate::push::PushContext;
use crate::scope::EvaluationScope;

/// Future returned by a push test body.
pub type TestFuture<'a> = BoxFuture<'a, GoalResult<bool>>;

type PushTestFn =
    dyn for<'a> Fn(&'a PushContext, &'a EvaluationScope) -> TestFuture<'a> + Send + Sync;

type ProjectTestFn = dyn for<'a> Fn(&'a dyn Project) -> TestFuture<'a> + Send + Sync;

/// A named predicate over the push context.
#[derive(Clone)]
pub struct PushTest {
    name: String,
    cost: PredicateCost,
    test: Arc<PushTestFn>,
}

impl PushTest {
    /// An async push test.
    ///
    /// ```ignore
    /// let has_docs = PushTest::new("hasDocs", PredicateCost::Expensive, |ctx, _scope| {
    ///     Box::pin(async move { ctx.project()?.has_file("docs/index.md").await })
    /// });
    /// ```
    pub fn new<F>(name: impl Into<String>, cost: PredicateCost, test: F) -> Self
    where
        F: for<'a> Fn(&'a PushContext, &'a EvaluationScope) -> TestFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            cost,
            test: Arc::new(test),
        }
    }

    /// A push test that needs no I/O.
    pub fn sync<F>(name: impl Into<String>, cost: PredicateCost, test: F) -> Self
    where
        F: Fn(&PushContext, &EvaluationScope) -> GoalResult<bool> + Send + Sync + 'static,
    {
        Self::new(name, cost, move |ctx, scope| {
            let result = test(ctx, scope);
            Box::pin(future::ready(result))
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn into_mapping(self) -> Arc<PredicateMapping> {
        Arc::new(self)
    }
}

#[async_trait]
impl Mapping<bool> for PushTest {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn map(
        &self,
        ctx: &PushContext,
        scope: &EvaluationScope,
    ) -> GoalResult<MappingOutcome<bool>> {
        Ok(MappingOutcome::Matched((self.test)(ctx, scope).await?))
    }

    fn cost(&self) -> PredicateCost {
        self.cost
    }
}

/// A predicate that only looks at the project.
#[derive(Clone)]
pub struct ProjectPredicate {
    name: String,
    cost: PredicateCost,
    test: Arc<ProjectTestFn>,
}

impl ProjectPredicate {
    /// Project predicates default to [`PredicateCost::Expensive`] since they
    /// read project content.
    pub fn new<F>(name: impl Into<String>, test: F) -> Self
    where
        F: for<'a> Fn(&'a dyn Project) -> TestFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            cost: PredicateCost::Expensive,
            test: Arc::new(test),
        }
    }

    pub fn with_cost(mut self, cost: PredicateCost) -> Self {
        self.cost = cost;
        self
    }

    /// Lift into a push test that reads the project from the push context.
    pub fn into_push_test(self) -> PushTest {
        let test = self.test;
        PushTest::new(self.name, self.cost, move |ctx, _scope| {
            let pending = ctx.project().map(|project| test(project));
            Box::pin(async move { pending?.await })
        })
    }
}

/// Anything accepted where a guard test is expected.
pub enum TestInput {
    Push(Arc<PredicateMapping>),
    Project(ProjectPredicate),
}

impl TestInput {
    pub fn into_mapping(self) -> Arc<PredicateMapping> {
        match self {
            TestInput::Push(mapping) => mapping,
            TestInput::Project(predicate) => predicate.into_push_test().into_mapping(),
        }
    }
}

impl From<PushTest> for TestInput {
    fn from(test: PushTest) -> Self {
        TestInput::Push(Arc::new(test))
    }
}

impl From<ProjectPredicate> for TestInput {
    fn from(predicate: ProjectPredicate) -> Self {
        TestInput::Project(predicate)
    }
}

impl From<Arc<PredicateMapping>> for TestInput {
    fn from(mapping: Arc<PredicateMapping>) -> Self {
        TestInput::Push(mapping)
    }
}

fn truth(outcome: MappingOutcome<bool>) -> bool {
    matches!(outcome, MappingOutcome::Matched(true))
}

/// Boolean composite of push tests.
struct Composite {
    name: String,
    structure: Structure<bool>,
}

#[async_trait]
impl Mapping<bool> for Composite {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn map(
        &self,
        ctx: &PushContext,
        scope: &EvaluationScope,
    ) -> GoalResult<MappingOutcome<bool>> {
        let results = future::join_all(
            self.structure
                .components
                .iter()
                .map(|test| test.map(ctx, scope)),
        )
        .await;

        let mut values = Vec::with_capacity(results.len());
        for result in results {
            values.push(truth(result?));
        }

        let value = match self.structure.style {
            CompositionStyle::And => values.iter().all(|v| *v),
            CompositionStyle::Or => values.iter().any(|v| *v),
            CompositionStyle::Not => !values.first().copied().unwrap_or(false),
            CompositionStyle::FirstMatch
            | CompositionStyle::AllMatches
            | CompositionStyle::Enrich => {
                unreachable!("push test composites are built with And, Or or Not only")
            }
        };
        Ok(MappingOutcome::Matched(value))
    }

    fn structure(&self) -> Option<&Structure<bool>> {
        Some(&self.structure)
    }

    fn cost(&self) -> PredicateCost {
        self.structure
            .components
            .iter()
            .map(|c| c.cost())
            .max()
            .unwrap_or(PredicateCost::Cheap)
    }
}

/// Logical negation. Named `not (<name>)`.
pub fn not(test: impl Into<TestInput>) -> Arc<PredicateMapping> {
    let inner = test.into().into_mapping();
    Arc::new(Composite {
        name: format!("not ({})", inner.name()),
        structure: Structure::new(CompositionStyle::Not, vec![inner]),
    })
}

/// True when every test passes; vacuously true for no tests.
pub fn all_satisfied(tests: Vec<TestInput>) -> Arc<PredicateMapping> {
    combine(tests, CompositionStyle::And, " && ")
}

/// True when any test passes; vacuously false for no tests.
pub fn any_satisfied(tests: Vec<TestInput>) -> Arc<PredicateMapping> {
    combine(tests, CompositionStyle::Or, " || ")
}

fn combine(tests: Vec<TestInput>, style: CompositionStyle, separator: &str) -> Arc<PredicateMapping> {
    let components: Vec<Arc<PredicateMapping>> = tests
        .into_iter()
        .map(|t| memoize(t.into_mapping()))
        .collect();
    let name = components
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(separator);
    Arc::new(Composite {
        name,
        structure: Structure::new(style, components),
    })
}

/// Cache an expensive test's result per push in the global cache.
///
/// Tests not declared [`PredicateCost::Expensive`] are returned unchanged:
/// they are cheap to re-run and may legitimately depend on scope state.
pub fn memoize(test: Arc<PredicateMapping>) -> Arc<PredicateMapping> {
    memoize_in(test, PushTestCache::global())
}

/// Like [`memoize`], with an explicit cache.
pub fn memoize_in(test: Arc<PredicateMapping>, cache: Arc<PushTestCache>) -> Arc<PredicateMapping> {
    if test.cost() != PredicateCost::Expensive {
        return test;
    }
    Arc::new(Memoized { inner: test, cache })
}

struct Memoized {
    inner: Arc<PredicateMapping>,
    cache: Arc<PushTestCache>,
}

#[async_trait]
impl Mapping<bool> for Memoized {
    fn name(&self) -> String {
        self.inner.name()
    }

    async fn map(
        &self,
        ctx: &PushContext,
        scope: &EvaluationScope,
    ) -> GoalResult<MappingOutcome<bool>> {
        // Without a push identity there is no safe key.
        let Some(id) = ctx.known_id() else {
            return self.inner.map(ctx, scope).await;
        };
        let name = self.inner.name();
        if let Some(hit) = self.cache.get(id, &name) {
            return Ok(MappingOutcome::Matched(hit));
        }
        let outcome = self.inner.map(ctx, scope).await?;
        if let MappingOutcome::Matched(value) = outcome {
            self.cache.insert(id, &name, value);
        }
        Ok(outcome)
    }

    fn structure(&self) -> Option<&Structure<bool>> {
        self.inner.structure()
    }

    fn cost(&self) -> PredicateCost {
        self.inner.cost()
    }
}
