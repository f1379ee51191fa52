//! Goal decision façade.
//!
//! [`GoalDecider`] holds the top-level chains of an SDM and decides goals for
//! one push at a time. Chains are additive: each runs for every push and
//! their goals are merged in registration order, with a locked result
//! ending the merge.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future;
use serde::Serialize;
use uuid::Uuid;

use crate::composition::{evaluate_rule, merge_contributions};
use crate::config::EngineConfig;
use crate::diagnostics::{describe_mapping, MappingDescription};
use crate::error::{GoalError, GoalResult};
use crate::goal::Goals;
use crate::metrics::METRICS;
use crate::obs::{self, DecisionSpan};
use crate::predictor::{predict_chains, GoalPrediction};
use crate::push::PushContext;
use crate::rule::GoalSetter;
use crate::scope::{EvaluationScope, RuleFailure};

/// Outcome of one decision pass.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub id: Uuid,
    /// Push identity, when the context carried one.
    pub push: Option<String>,
    /// `None` when no chain set goals.
    pub goals: Option<Goals>,
    /// Rules isolated under the isolate-and-report policy.
    pub failures: Vec<RuleFailure>,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn goal_count(&self) -> usize {
        self.goals.as_ref().map_or(0, Goals::len)
    }
}

pub struct GoalDecider {
    chains: Vec<Arc<GoalSetter>>,
    config: EngineConfig,
}

impl GoalDecider {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            chains: Vec::new(),
            config,
        }
    }

    pub fn with_chain(mut self, chain: Arc<GoalSetter>) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn chains(&self) -> &[Arc<GoalSetter>] {
        &self.chains
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide goals for `ctx` in a fresh evaluation scope.
    pub async fn decide(&self, ctx: &PushContext) -> GoalResult<Decision> {
        let push = ctx.known_id().map(ToString::to_string);
        let label = push.clone().unwrap_or_else(|| "<unknown>".to_string());
        let scope = EvaluationScope::with_policy(self.config.failure_policy);

        METRICS.inc_decisions();
        let goals = DecisionSpan::new(&label)
            .run(async {
                obs::emit_decision_started(&label, self.chains.len());
                let outcomes = future::join_all(
                    self.chains
                        .iter()
                        .map(|chain| evaluate_rule(chain.as_ref(), ctx, &scope)),
                )
                .await;

                let mut contributions = Vec::with_capacity(outcomes.len());
                for outcome in outcomes {
                    if let Some(goals) = outcome?.into_matched() {
                        contributions.push(goals);
                    }
                }
                let goals = merge_contributions(contributions);

                obs::emit_decision_finished(
                    &label,
                    goals.as_ref().map(|g| g.name.as_str()),
                    goals.as_ref().map_or(0, Goals::len),
                    scope.failures().len(),
                );
                Ok::<_, GoalError>(goals)
            })
            .await?;

        Ok(Decision {
            id: Uuid::new_v4(),
            push,
            goals,
            failures: scope.failures(),
            decided_at: Utc::now(),
        })
    }

    /// Predict goals for a partly known push across all chains, merged the
    /// way [`decide`](Self::decide) merges them.
    pub async fn predict(&self, ctx: &PushContext) -> GoalPrediction {
        predict_chains(&self.chains, ctx).await
    }

    pub fn describe(&self) -> Vec<MappingDescription> {
        self.chains
            .iter()
            .map(|chain| describe_mapping(chain.as_ref()))
            .collect()
    }
}
