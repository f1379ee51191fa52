use std::sync::Arc;

use serde_json::json;

use sdm_core::fakes::InMemoryProject;
use sdm_core::{
    all_matches, enrich_goal_setters, first_match, given, on_any_push, predict_goals, push_tests,
    when_push_satisfies, Commit, EngineConfig, GoalDecider, Goal, GoalError, GoalPrediction, Goals,
    PartialPush, PredicateCost, Push, PushContext, PushTest, RepoRef,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn goals(name: &str) -> Goals {
    Goals::new(name, vec![Goal::new(name)])
}

fn push(branch: &str, sha: &str) -> Push {
    Push::new(RepoRef::new("stevedores-org", "sdm"), branch)
        .with_commit(Commit::new(sha, "feat: speculate"))
}

/// Push metadata known, project not yet cloned.
///
/// Each test uses its own sha: expensive test results are cached per push.
fn metadata_only(branch: &str, sha: &str) -> PushContext {
    PushContext::new(push(branch, sha))
}

fn lang_is(lang: &'static str) -> PushTest {
    PushTest::sync(format!("lang is {lang}"), PredicateCost::Cheap, move |_, scope| {
        Ok(scope.get("lang") == Some(json!(lang)))
    })
}

/// Tree that picks a build tool from a language derived from the branch.
fn language_tree() -> Arc<sdm_core::GoalSetter> {
    given(vec![])
        .it_means("detect language")
        .compute(|ctx, scope| {
            Box::pin(async move {
                let lang = if ctx.branch()?.starts_with("java/") { "java" } else { "rust" };
                scope.set("lang", json!(lang));
                Ok::<_, GoalError>(())
            })
        })
        .then(vec![
            given(vec![lang_is("java").into()]).it_means("java").set(goals("maven")),
            given(vec![lang_is("rust").into()]).it_means("rust").set(goals("cargo")),
        ])
}

// ---------------------------------------------------------------------------
// Core scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unconditional_setter_is_definite_on_empty_context() {
    let setter = on_any_push().set_goals(goals("G")).into_setter();
    let prediction = predict_goals(setter.as_ref(), &PushContext::partial()).await;
    assert_eq!(
        prediction,
        GoalPrediction {
            definite_goals: vec![Goal::new("G")],
            possible_goals: vec![],
            unknown_roads: vec![],
        }
    );
}

#[tokio::test]
async fn guard_reading_missing_push_is_possible() {
    let setter = when_push_satisfies(vec![push_tests::to_default_branch().into()])
        .set_goals(goals("G"))
        .into_setter();
    let prediction = predict_goals(setter.as_ref(), &PushContext::partial()).await;
    assert_eq!(
        prediction,
        GoalPrediction {
            definite_goals: vec![],
            possible_goals: vec![Goal::new("G")],
            unknown_roads: vec![],
        }
    );
}

#[tokio::test]
async fn provably_empty_first_rule_is_skipped() {
    let chain = first_match(
        "chain",
        vec![
            when_push_satisfies(vec![push_tests::to_branch("release").into()])
                .set_goals(goals("X"))
                .into_setter(),
            when_push_satisfies(vec![push_tests::to_branch("main").into()])
                .set_goals(goals("G"))
                .into_setter(),
        ],
    );
    let prediction = predict_goals(chain.as_ref(), &metadata_only("main", "a1")).await;
    assert_eq!(
        prediction,
        GoalPrediction {
            definite_goals: vec![Goal::new("G")],
            possible_goals: vec![],
            unknown_roads: vec![],
        }
    );
}

// ---------------------------------------------------------------------------
// Mixed cheap / expensive guards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn indeterminate_conjunction_keeps_rule_possible() {
    let chain = first_match(
        "chain",
        vec![
            when_push_satisfies(vec![
                push_tests::to_branch("release").into(),
                push_tests::has_file("Dockerfile").into(),
            ])
            .set_goals(goals("docker"))
            .into_setter(),
            on_any_push().set_goals(goals("build")).into_setter(),
        ],
    );

    // Both guard tests run; the project read fails, so the conjunction is
    // indeterminate even though the branch test alone would rule it out.
    let prediction = predict_goals(chain.as_ref(), &metadata_only("main", "b2")).await;
    assert!(prediction.definite_goals.is_empty());
    assert_eq!(prediction.possible_names(), vec!["docker", "build"]);
    assert!(prediction.unknown_roads.is_empty());
}

#[tokio::test]
async fn project_available_resolves_everything() {
    let chain = first_match(
        "chain",
        vec![
            when_push_satisfies(vec![push_tests::has_file("Dockerfile").into()])
                .set_goals(goals("docker"))
                .into_setter(),
            on_any_push().set_goals(goals("build")).into_setter(),
        ],
    );
    let project = InMemoryProject::new().with_file("Cargo.toml", "[package]");
    let ctx = metadata_only("main", "c3").with_project(Arc::new(project));
    let prediction = predict_goals(chain.as_ref(), &ctx).await;
    assert_eq!(prediction.definite_names(), vec!["build"]);
    assert!(prediction.possible_goals.is_empty());
}

// ---------------------------------------------------------------------------
// Decision trees
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tree_with_indeterminate_root_makes_children_possible() {
    let tree = given(vec![push_tests::has_file("Cargo.toml").into()])
        .it_means("rust")
        .then(vec![
            given(vec![push_tests::to_default_branch().into()])
                .it_means("release")
                .set(goals("publish")),
            given(vec![]).it_means("branch").set(goals("build")),
        ]);
    let chain = first_match("chain", vec![tree]);

    let prediction = predict_goals(chain.as_ref(), &metadata_only("main", "d4")).await;
    assert!(prediction.definite_goals.is_empty());
    assert_eq!(prediction.possible_names(), vec!["publish"]);
    assert!(prediction.unknown_roads.is_empty());
}

#[tokio::test]
async fn tree_with_passing_root_classifies_children() {
    let tree = given(vec![push_tests::to_default_branch().into()])
        .it_means("default branch")
        .then(vec![
            given(vec![push_tests::has_file("Dockerfile").into()])
                .it_means("docker")
                .set(goals("docker")),
            given(vec![]).it_means("fallback").set(goals("build")),
        ]);
    let chain = first_match("chain", vec![tree]);

    let prediction = predict_goals(chain.as_ref(), &metadata_only("main", "e5")).await;
    assert!(prediction.definite_goals.is_empty());
    assert_eq!(prediction.possible_names(), vec!["docker", "build"]);
}

#[tokio::test]
async fn compute_lacking_data_leaves_later_rules_possible() {
    let chain = first_match(
        "chain",
        vec![
            language_tree(),
            on_any_push().it_means("fallback").set_goals(goals("fallback")).into_setter(),
        ],
    );

    let prediction = predict_goals(chain.as_ref(), &PushContext::partial()).await;
    assert!(prediction.definite_goals.is_empty());
    assert_eq!(prediction.possible_names(), vec!["fallback"]);
    assert_eq!(prediction.unknown_roads.len(), 1);
    assert_eq!(prediction.unknown_roads[0].name, "detect language");

    // Once the branch is known the tree resolves and the fallback is out.
    let branch_only = PushContext::from_partial(PartialPush {
        branch: Some("main".to_string()),
        ..PartialPush::default()
    });
    let prediction = predict_goals(chain.as_ref(), &branch_only).await;
    assert_eq!(prediction.definite_names(), vec!["cargo"]);
    assert!(prediction.possible_goals.is_empty());
    assert!(prediction.unknown_roads.is_empty());
}

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

fn locked_release() -> Arc<sdm_core::GoalSetter> {
    when_push_satisfies(vec![push_tests::to_default_branch().into()])
        .it_means("release")
        .set_goals(Goals::new("release", vec![Goal::new("release")]).and_lock())
        .into_setter()
}

#[tokio::test]
async fn enrichment_of_possibly_locked_base_is_only_possible() {
    let enriched = enrich_goal_setters(
        locked_release(),
        on_any_push().it_means("lint").set_goals(goals("lint")).into_setter(),
    );

    let prediction = predict_goals(enriched.as_ref(), &PushContext::partial()).await;
    assert!(prediction.definite_goals.is_empty());
    assert_eq!(prediction.possible_names(), vec!["release", "lint"]);

    // On the default branch the lock holds and lint is never added.
    let prediction = predict_goals(enriched.as_ref(), &metadata_only("main", "f6")).await;
    assert_eq!(prediction.definite_names(), vec!["release"]);
    assert!(prediction.possible_goals.is_empty());
}

#[tokio::test]
async fn additive_contributors_after_possible_lock_are_possible() {
    let chain = all_matches(
        "chain",
        vec![
            on_any_push().it_means("build").set_goals(goals("build")).into_setter(),
            locked_release(),
            on_any_push().it_means("lint").set_goals(goals("lint")).into_setter(),
        ],
    );

    let prediction = predict_goals(chain.as_ref(), &PushContext::partial()).await;
    assert_eq!(prediction.definite_names(), vec!["build"]);
    assert_eq!(prediction.possible_names(), vec!["release", "lint"]);
}

#[tokio::test]
async fn repeated_goals_are_listed_once() {
    let chain = first_match(
        "chain",
        vec![
            when_push_satisfies(vec![push_tests::to_default_branch().into()])
                .it_means("release")
                .set_goals(vec![Goal::new("build"), Goal::new("deploy")])
                .into_setter(),
            on_any_push().it_means("branch").set_goals(Goal::new("build")).into_setter(),
        ],
    );

    let prediction = predict_goals(chain.as_ref(), &PushContext::partial()).await;
    assert_eq!(prediction.possible_names(), vec!["build", "deploy"]);
}

#[tokio::test]
async fn decider_prediction_matches_decision_across_chains() {
    let decider = GoalDecider::new(EngineConfig::default())
        .with_chain(locked_release())
        .with_chain(on_any_push().it_means("lint").set_goals(goals("lint")).into_setter());

    let prediction = decider.predict(&PushContext::partial()).await;
    assert!(prediction.definite_goals.is_empty());
    assert_eq!(prediction.possible_names(), vec!["release", "lint"]);

    let decision = decider.decide(&metadata_only("main", "g7")).await.unwrap();
    assert_eq!(decision.goals.unwrap().unique_names(), vec!["release"]);
}
