//! Speculative goal prediction.
//!
//! Predicts which goals a rule graph would set for a push whose context is
//! only partly known (for example before the project has been cloned).
//! Every field the push context cannot provide raises
//! [`GoalError::InsufficientData`]; the predictor catches that error, walks
//! the rule graph through [`Mapping::structure`] and [`Mapping::guarded`],
//! and sorts what it finds into three buckets:
//!
//! - **definite**: goals that will be set whatever the missing data says
//! - **possible**: goals that may be set, depending on the missing data
//! - **unknown roads**: parts of the graph that could not be classified
//!
//! Errors other than insufficient data are never swallowed; they become
//! unknown roads.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::error::GoalError;
use crate::goal::{dedupe_goals, Goal, Goals};
use crate::mapping::{CompositionStyle, Guarded, GuardedBody, Mapping, MappingOutcome};
use crate::metrics::METRICS;
use crate::obs;
use crate::push::PushContext;
use crate::rule::GoalSetter;
use crate::scope::EvaluationScope;

/// A part of the rule graph the predictor could not see past.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownRoad {
    pub name: String,
    pub reason: String,
}

/// Classified goals for a partly known push.
///
/// A goal appears at most once across both lists; a goal that is definite
/// is not repeated as possible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalPrediction {
    pub definite_goals: Vec<Goal>,
    pub possible_goals: Vec<Goal>,
    pub unknown_roads: Vec<UnknownRoad>,
}

impl GoalPrediction {
    /// Nothing definite, nothing possible and nothing unknown.
    pub fn is_empty(&self) -> bool {
        self.definite_goals.is_empty()
            && self.possible_goals.is_empty()
            && self.unknown_roads.is_empty()
    }

    pub fn definite_names(&self) -> Vec<&str> {
        self.definite_goals.iter().map(|g| g.unique_name.as_str()).collect()
    }

    pub fn possible_names(&self) -> Vec<&str> {
        self.possible_goals.iter().map(|g| g.unique_name.as_str()).collect()
    }
}

/// Classification over whole goal sets, so locks stay visible until the
/// result is flattened.
#[derive(Debug, Default)]
struct Forecast {
    definite: Vec<Goals>,
    possible: Vec<Goals>,
    unknown: Vec<UnknownRoad>,
}

fn push_unique(into: &mut Vec<Goals>, sets: impl IntoIterator<Item = Goals>) {
    for set in sets {
        if !into.contains(&set) {
            into.push(set);
        }
    }
}

impl Forecast {
    fn definite(goals: Goals) -> Self {
        Self {
            definite: vec![goals],
            ..Self::default()
        }
    }

    fn possible(goals: Goals) -> Self {
        Self {
            possible: vec![goals],
            ..Self::default()
        }
    }

    fn unknown(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::default().with_unknown(name, reason)
    }

    fn with_unknown(mut self, name: impl Into<String>, reason: impl Into<String>) -> Self {
        self.unknown.push(UnknownRoad {
            name: name.into(),
            reason: reason.into(),
        });
        self
    }

    fn is_empty(&self) -> bool {
        self.definite.is_empty() && self.possible.is_empty() && self.unknown.is_empty()
    }

    /// A locked set will certainly be produced.
    fn locks(&self) -> bool {
        self.definite.iter().any(Goals::is_locked)
    }

    /// A locked set may be produced, or part of the graph is unseen.
    fn may_lock(&self) -> bool {
        !self.unknown.is_empty()
            || self
                .definite
                .iter()
                .chain(&self.possible)
                .any(Goals::is_locked)
    }

    fn merge(mut self, other: Forecast) -> Self {
        push_unique(&mut self.definite, other.definite);
        push_unique(&mut self.possible, other.possible);
        self.unknown.extend(other.unknown);
        self
    }

    /// Everything that was definite becomes merely possible.
    fn demote(mut self) -> Self {
        let mut possible = std::mem::take(&mut self.definite);
        push_unique(&mut possible, self.possible);
        self.possible = possible;
        self
    }

    fn into_prediction(self) -> GoalPrediction {
        let definite_goals = dedupe_goals(self.definite.into_iter().flat_map(|set| set.goals));
        let possible_goals = dedupe_goals(self.possible.into_iter().flat_map(|set| set.goals))
            .into_iter()
            .filter(|goal| !definite_goals.contains(goal))
            .collect();
        GoalPrediction {
            definite_goals,
            possible_goals,
            unknown_roads: self.unknown,
        }
    }
}

fn finish(forecast: Forecast) -> GoalPrediction {
    let prediction = forecast.into_prediction();
    METRICS.inc_predictions();
    obs::emit_prediction_finished(
        prediction.definite_goals.len(),
        prediction.possible_goals.len(),
        prediction.unknown_roads.len(),
    );
    prediction
}

/// Predict the goals `mapping` would set for `ctx`.
pub async fn predict_goals(mapping: &GoalSetter, ctx: &PushContext) -> GoalPrediction {
    let scope = EvaluationScope::new();
    finish(classify(mapping, ctx, &scope).await)
}

/// Predict across top-level chains that are merged additively, as
/// [`GoalDecider`](crate::GoalDecider) merges them.
pub async fn predict_chains(chains: &[Arc<GoalSetter>], ctx: &PushContext) -> GoalPrediction {
    let scope = EvaluationScope::new();
    finish(additive(chains, ctx, &scope).await)
}

/// Optimistic evaluation first; structural recursion only on missing data.
fn classify<'a>(
    mapping: &'a (dyn Mapping<Goals> + 'a),
    ctx: &'a PushContext,
    scope: &'a EvaluationScope,
) -> BoxFuture<'a, Forecast> {
    async move {
        match mapping.map(ctx, scope).await {
            Ok(MappingOutcome::Matched(goals)) => Forecast::definite(goals),
            Ok(MappingOutcome::NoMatch | MappingOutcome::Halt) => Forecast::default(),
            Err(err) => classify_failed(mapping, err, ctx, scope).await,
        }
    }
    .boxed()
}

/// `mapping` failed when evaluated as a whole.
fn classify_failed<'a>(
    mapping: &'a (dyn Mapping<Goals> + 'a),
    err: GoalError,
    ctx: &'a PushContext,
    scope: &'a EvaluationScope,
) -> BoxFuture<'a, Forecast> {
    async move {
        if !err.is_insufficient_data() {
            return Forecast::unknown(mapping.name(), err.to_string());
        }

        if let Some(structure) = mapping.structure() {
            match structure.style {
                CompositionStyle::FirstMatch => {
                    return first_match(&structure.components, ctx, scope).await;
                }
                // Both merge in declaration order and stop at a lock.
                CompositionStyle::AllMatches | CompositionStyle::Enrich => {
                    return additive(&structure.components, ctx, scope).await;
                }
                CompositionStyle::And | CompositionStyle::Or | CompositionStyle::Not => {}
            }
        }

        if let Some(guarded) = mapping.guarded() {
            return guarded_rule(mapping.name(), guarded, ctx, scope).await;
        }

        Forecast::unknown(mapping.name(), err.to_string())
    }
    .boxed()
}

/// Evaluate the guard alone and classify the body from its answer.
fn guarded_rule<'a>(
    name: String,
    guarded: Guarded<'a, Goals>,
    ctx: &'a PushContext,
    scope: &'a EvaluationScope,
) -> BoxFuture<'a, Forecast> {
    async move {
        tracing::debug!(
            rule = %name,
            guard = %guarded.guard.name(),
            cost = ?guarded.guard.cost(),
            "evaluating guard alone"
        );
        let halts = matches!(guarded.body, GuardedBody::Halt);
        match guarded.guard.map(ctx, scope).await {
            Ok(MappingOutcome::Matched(true)) if halts => Forecast::default(),
            Ok(MappingOutcome::Matched(true)) => guarded_body(&name, &guarded, ctx, scope).await,
            Ok(_) => Forecast::default(),
            Err(err) if err.is_insufficient_data() && halts => {
                Forecast::unknown(name, format!("may halt: {err}"))
            }
            Err(err) if err.is_insufficient_data() => {
                guarded_body(&name, &guarded, ctx, scope).await.demote()
            }
            Err(err) => Forecast::unknown(name, err.to_string()),
        }
    }
    .boxed()
}

/// Classify the body of a guarded rule, running its scope preparation
/// first. Without that preparation nested guards would read an empty scope,
/// so a preparation that lacks data leaves the body undecided.
async fn guarded_body<'a>(
    name: &str,
    guarded: &Guarded<'a, Goals>,
    ctx: &'a PushContext,
    scope: &'a EvaluationScope,
) -> Forecast {
    let prepared = match guarded.prepare {
        Some(prepare) => prepare(ctx, scope).await,
        None => Ok(()),
    };
    if let Err(err) = &prepared {
        if !err.is_insufficient_data() {
            return Forecast::unknown(name, err.to_string());
        }
    }

    let forecast = match &guarded.body {
        GuardedBody::Value(goals) => Forecast::definite(Goals::clone(goals)),
        GuardedBody::Rules(rules) => classify(*rules, ctx, scope).await,
        GuardedBody::Halt => Forecast::default(),
    };

    match prepared {
        Ok(()) => forecast,
        Err(err) => forecast.demote().with_unknown(name, err.to_string()),
    }
}

/// Predict an ordered first-match set.
fn first_match<'a>(
    rules: &'a [Arc<GoalSetter>],
    ctx: &'a PushContext,
    scope: &'a EvaluationScope,
) -> BoxFuture<'a, Forecast> {
    async move {
        let Some((first, rest)) = rules.split_first() else {
            return Forecast::default();
        };
        match first.map(ctx, scope).await {
            Ok(MappingOutcome::Halt) => Forecast::default(),
            Ok(MappingOutcome::NoMatch) => first_match(rest, ctx, scope).await,
            Ok(MappingOutcome::Matched(goals)) => Forecast::definite(goals),
            Err(err) => {
                let head = classify_failed(first.as_ref(), err, ctx, scope).await;
                let tail = first_match(rest, ctx, scope).await;
                if head.is_empty() {
                    return tail;
                }
                let mut possible = Vec::new();
                push_unique(&mut possible, head.definite);
                push_unique(&mut possible, head.possible);
                push_unique(&mut possible, tail.definite);
                push_unique(&mut possible, tail.possible);
                let mut unknown = head.unknown;
                unknown.extend(tail.unknown);
                Forecast {
                    definite: Vec::new(),
                    possible,
                    unknown,
                }
            }
        }
    }
    .boxed()
}

/// Predict contributions merged in declaration order. A certain lock ends
/// the merge; after a possible lock the later contributions are only
/// possible.
fn additive<'a>(
    contributors: &'a [Arc<GoalSetter>],
    ctx: &'a PushContext,
    scope: &'a EvaluationScope,
) -> BoxFuture<'a, Forecast> {
    async move {
        let mut forecast = Forecast::default();
        let mut lock_possible = false;
        for contributor in contributors {
            let mut next = classify(contributor.as_ref(), ctx, scope).await;
            if lock_possible {
                next = next.demote();
            }
            let locks = next.locks();
            lock_possible |= next.may_lock();
            forecast = forecast.merge(next);
            if locks {
                break;
            }
        }
        forecast
    }
    .boxed()
}
