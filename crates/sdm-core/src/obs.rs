//! Structured observability hooks for decision passes.
//!
//! - [`DecisionSpan`] scopes an `sdm.decision` span to one pass
//! - `emit_*` functions log the lifecycle of a pass with stable `event` names
//!
//! Verbosity is controlled by `SDM_LOG` (falling back to `RUST_LOG`); see
//! [`crate::telemetry::init_tracing`].

use std::future::Future;

use tracing::{debug, info, warn, Instrument};

/// Decision-scoped span tagged with the push being decided.
///
/// ```ignore
/// let span = DecisionSpan::new("org/repo#main@abc123");
/// let goals = span.run(chain.map(&ctx, &scope)).await;
/// // every event logged inside carries push = "org/repo#main@abc123"
/// ```
pub struct DecisionSpan {
    span: tracing::Span,
}

impl DecisionSpan {
    pub fn new(push: &str) -> Self {
        Self {
            span: tracing::info_span!("sdm.decision", push = %push),
        }
    }

    /// Enter the span on the current thread until the guard drops.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Drive `fut` inside the span.
    pub async fn run<F: Future>(self, fut: F) -> F::Output {
        fut.instrument(self.span).await
    }
}

pub fn emit_decision_started(push: &str, chains: usize) {
    info!(event = "decision.started", push = %push, chains = chains);
}

/// A rule produced a value.
pub fn emit_rule_matched(rule: &str) {
    debug!(event = "rule.matched", rule = %rule);
}

/// A rule failed and was isolated instead of aborting the pass.
pub fn emit_rule_failed(rule: &str, error: &dyn std::fmt::Display) {
    warn!(event = "rule.failed", rule = %rule, error = %error);
}

pub fn emit_decision_finished(push: &str, goals: Option<&str>, goal_count: usize, failures: usize) {
    info!(
        event = "decision.finished",
        push = %push,
        goals = goals.unwrap_or("<none>"),
        goal_count = goal_count,
        failures = failures,
    );
}

pub fn emit_prediction_finished(definite: usize, possible: usize, unknown: usize) {
    info!(
        event = "prediction.finished",
        definite = definite,
        possible = possible,
        unknown = unknown,
    );
}
