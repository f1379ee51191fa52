//! The mapping abstraction everything else is built from.
//!
//! A [`Mapping`] turns a push into a value, reports that it does not apply,
//! or halts its enclosing rule set. Composites expose their parts through
//! [`Mapping::structure`] and guarded rules through [`Mapping::guarded`], so
//! diagnostics and the goal predictor can walk a rule graph without
//! re-running it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::GoalResult;
use crate::push::PushContext;
use crate::scope::EvaluationScope;

/// Result of evaluating a mapping against one push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingOutcome<V> {
    /// The mapping applies and produced a value.
    Matched(V),
    /// The mapping does not apply; siblings may still match.
    NoMatch,
    /// Nothing in the enclosing rule set may match.
    Halt,
}

impl<V> MappingOutcome<V> {
    pub fn is_matched(&self) -> bool {
        matches!(self, MappingOutcome::Matched(_))
    }

    /// The matched value; `NoMatch` and `Halt` both give `None`.
    pub fn into_matched(self) -> Option<V> {
        match self {
            MappingOutcome::Matched(v) => Some(v),
            MappingOutcome::NoMatch | MappingOutcome::Halt => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> MappingOutcome<U> {
        match self {
            MappingOutcome::Matched(v) => MappingOutcome::Matched(f(v)),
            MappingOutcome::NoMatch => MappingOutcome::NoMatch,
            MappingOutcome::Halt => MappingOutcome::Halt,
        }
    }
}

impl<V> From<Option<V>> for MappingOutcome<V> {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(v) => MappingOutcome::Matched(v),
            None => MappingOutcome::NoMatch,
        }
    }
}

/// How a composite mapping combines its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionStyle {
    And,
    Or,
    Not,
    /// Ordered rules; the first match wins.
    FirstMatch,
    /// Every contributor is evaluated and the results are merged.
    AllMatches,
    /// A base setter whose goals are extended by a second one unless the
    /// base result is locked.
    Enrich,
}

/// Author-declared evaluation cost of a push test.
///
/// Ordered so that the most costly component of a composite is its `max`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PredicateCost {
    /// Only looks at push metadata.
    Cheap,
    #[default]
    Unknown,
    /// Reads project content.
    Expensive,
}

/// Introspectable composition of a mapping.
pub struct Structure<V> {
    pub style: CompositionStyle,
    pub components: Vec<Arc<dyn Mapping<V>>>,
}

impl<V> Structure<V> {
    pub fn new(style: CompositionStyle, components: Vec<Arc<dyn Mapping<V>>>) -> Self {
        Self { style, components }
    }
}

impl<V> Clone for Structure<V> {
    fn clone(&self) -> Self {
        Self {
            style: self.style,
            components: self.components.clone(),
        }
    }
}

/// What a guarded rule resolves to once its guard passes.
pub enum GuardedBody<'a, V> {
    /// A fixed value.
    Value(&'a V),
    /// Further rules, evaluated only when the guard passes.
    Rules(&'a dyn Mapping<V>),
    /// Halt the enclosing rule set.
    Halt,
}

/// Async hook that prepares scope values for a rule body.
pub type ScopeHook =
    dyn for<'a> Fn(&'a PushContext, &'a EvaluationScope) -> BoxFuture<'a, GoalResult<()>>
        + Send
        + Sync;

/// A rule shaped as "guard, then body".
pub struct Guarded<'a, V> {
    pub guard: &'a dyn Mapping<bool>,
    /// Runs after the guard passes and before the body.
    pub prepare: Option<&'a ScopeHook>,
    pub body: GuardedBody<'a, V>,
}

/// An async, named function from a push to `V`.
///
/// Implementations must not keep mutable state keyed by call order: each
/// call is independent, and per-pass state belongs in the
/// [`EvaluationScope`].
#[async_trait]
pub trait Mapping<V>: Send + Sync {
    /// Human-readable name; not required to be unique.
    fn name(&self) -> String;

    async fn map(&self, ctx: &PushContext, scope: &EvaluationScope)
        -> GoalResult<MappingOutcome<V>>;

    fn structure(&self) -> Option<&Structure<V>> {
        None
    }

    fn guarded(&self) -> Option<Guarded<'_, V>> {
        None
    }

    fn cost(&self) -> PredicateCost {
        PredicateCost::Unknown
    }
}

/// A push test: a mapping to `bool`.
pub type PredicateMapping = dyn Mapping<bool>;

/// Transform the value a mapping produces, keeping its name.
pub fn map_mapping<A, B, F>(inner: Arc<dyn Mapping<A>>, f: F) -> Arc<dyn Mapping<B>>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> B + Send + Sync + 'static,
{
    Arc::new(MappedMapping { inner, f })
}

struct MappedMapping<A, F> {
    inner: Arc<dyn Mapping<A>>,
    f: F,
}

#[async_trait]
impl<A, B, F> Mapping<B> for MappedMapping<A, F>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A) -> B + Send + Sync + 'static,
{
    fn name(&self) -> String {
        self.inner.name()
    }

    async fn map(
        &self,
        ctx: &PushContext,
        scope: &EvaluationScope,
    ) -> GoalResult<MappingOutcome<B>> {
        Ok(self.inner.map(ctx, scope).await?.map(&self.f))
    }

    fn cost(&self) -> PredicateCost {
        self.inner.cost()
    }
}
