//! SDM Core Library
//!
//! Decides which delivery goals apply to a repository push. Rules are
//! built from push tests, composed first-match or additively, and can be
//! evaluated for real or speculatively against a partly known push.

pub mod cache;
pub mod composition;
pub mod config;
pub mod decider;
pub mod diagnostics;
pub mod dot;
pub mod dsl;
pub mod error;
pub mod fakes;
pub mod goal;
pub mod mapping;
pub mod metrics;
pub mod obs;
pub mod predicate;
pub mod predictor;
pub mod project;
pub mod push;
pub mod rule;
pub mod scope;
pub mod telemetry;

pub use cache::{PushTestCache, DEFAULT_CACHE_CAPACITY};
pub use composition::{
    all_matches, enrich_goal_setters, evaluate_rule, first_match, first_matching, AllMatches,
    FirstMatch,
};
pub use config::EngineConfig;
pub use decider::{Decision, GoalDecider};
pub use diagnostics::{describe_mapping, MappingDescription};
pub use dot::goals_to_dot;
pub use dsl::{given, Given, Named};
pub use error::{GoalError, GoalResult};
pub use goal::{dedupe_goals, environment, Goal, GoalComponent, GoalState, Goals};
pub use mapping::{
    map_mapping, CompositionStyle, Guarded, GuardedBody, Mapping, MappingOutcome, PredicateCost,
    PredicateMapping, Structure,
};
pub use predicate::{
    all_satisfied, any_satisfied, memoize, not, ProjectPredicate, PushTest, TestInput,
};
pub use predictor::{predict_chains, predict_goals, GoalPrediction, UnknownRoad};
pub use project::{LocalProject, Project};
pub use push::{
    AddressChannels, Commit, Credentials, PartialPush, Push, PushContext, PushId, RepoRef,
};
pub use rule::{on_any_push, when_push_satisfies, GoalSetter, GoalSetterMapping, PushRule};
pub use scope::{EvaluationScope, FailurePolicy, RuleFailure};

pub use metrics::METRICS;
pub use obs::{
    emit_decision_finished, emit_decision_started, emit_prediction_finished, emit_rule_failed,
    emit_rule_matched, DecisionSpan,
};
pub use telemetry::init_tracing;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
