//! SDM - Software Delivery Machine CLI
//!
//! The `sdm` command evaluates a declarative rules file against a push.
//!
//! ## Commands
//!
//! - `goals`: Decide the goals for a push
//! - `predict`: Predict goals for a partly known push
//! - `graph`: Render the decided goals as a Graphviz digraph
//! - `describe`: Show the structure of a rules file

mod rules;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use rules::RulesFile;
use sdm_core::{
    goals_to_dot, Decision, EngineConfig, GoalDecider, GoalState, LocalProject, PartialPush, Push,
    PushContext, METRICS,
};

#[derive(Parser)]
#[command(name = "sdm")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Software Delivery Machine: decide delivery goals for a push", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration file (TOML)
    #[arg(long, global = true, env = "SDM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide and print the goals for a push
    Goals {
        /// Rules file (TOML)
        #[arg(short, long)]
        rules: PathBuf,

        /// Push description (JSON)
        #[arg(short, long)]
        push: PathBuf,

        /// Checked-out project directory
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Predict goals when only part of the push is known
    Predict {
        /// Rules file (TOML)
        #[arg(short, long)]
        rules: PathBuf,

        /// Push description (JSON); absent fields are unknown
        #[arg(short, long)]
        push: PathBuf,
    },

    /// Render the decided goals as a Graphviz digraph
    Graph {
        /// Rules file (TOML)
        #[arg(short, long)]
        rules: PathBuf,

        /// Push description (JSON)
        #[arg(short, long)]
        push: PathBuf,

        /// Checked-out project directory
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Print the structure of a rules file as JSON
    Describe {
        /// Rules file (TOML)
        #[arg(short, long)]
        rules: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::load(cli.config.as_deref()).context("failed to load engine config")?;

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.level().context("invalid log_level")?
    };
    sdm_core::init_tracing(cli.json || config.log_json, level);
    config.apply();

    let result = match cli.command {
        Commands::Goals {
            rules,
            push,
            project,
        } => cmd_goals(config, &rules, &push, project.as_deref()).await,
        Commands::Predict { rules, push } => cmd_predict(config, &rules, &push).await,
        Commands::Graph {
            rules,
            push,
            project,
        } => cmd_graph(config, &rules, &push, project.as_deref()).await,
        Commands::Describe { rules } => cmd_describe(config, &rules),
    };

    METRICS.flush();
    result
}

fn load_decider(config: EngineConfig, rules: &Path) -> Result<GoalDecider> {
    RulesFile::load(rules)?.into_decider(config)
}

fn read_json_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

/// Build the context for a fully known push.
fn push_context(push: &Path, project: Option<&Path>) -> Result<PushContext> {
    let push: Push = serde_json::from_value(read_json_file(push)?)
        .with_context(|| format!("{:?} is not a valid push", push))?;
    let mut ctx = PushContext::new(push);
    if let Some(dir) = project {
        ctx = ctx.with_project(Arc::new(LocalProject::new(dir)));
    }
    Ok(ctx)
}

/// Build the context for a push known field by field. Absent fields (or a
/// `null` document) are insufficient data.
fn partial_push_context(push: &Path) -> Result<PushContext> {
    let value = read_json_file(push)?;
    let fields: PartialPush = if value.is_null() {
        PartialPush::default()
    } else {
        serde_json::from_value(value)
            .with_context(|| format!("{:?} is not a valid partial push", push))?
    };
    Ok(PushContext::from_partial(fields))
}

async fn decide(
    config: EngineConfig,
    rules: &Path,
    push: &Path,
    project: Option<&Path>,
) -> Result<Decision> {
    let decider = load_decider(config, rules)?;
    let ctx = push_context(push, project)?;
    decider.decide(&ctx).await.context("goal decision failed")
}

fn render_decision(decision: &Decision) -> String {
    let Some(goals) = &decision.goals else {
        return "No goals".to_string();
    };
    let mut out = format!("Goals: {}", goals.name);
    if goals.is_locked() {
        out.push_str(" (locked)");
    }
    for goal in &goals.goals {
        out.push_str(&format!("\n  {} [{}]", goal.describe(GoalState::Working), goal.environment));
        if goal.approval_required {
            out.push_str(" approval required");
        }
        let preconditions: Vec<&str> = goal.depends_on.iter().map(|g| g.unique_name.as_str()).collect();
        if !preconditions.is_empty() {
            out.push_str(&format!(" after {}", preconditions.join(", ")));
        }
    }
    for failure in &decision.failures {
        out.push_str(&format!("\n  ! rule '{}' failed: {}", failure.rule, failure.reason));
    }
    out
}

async fn cmd_goals(
    config: EngineConfig,
    rules: &Path,
    push: &Path,
    project: Option<&Path>,
) -> Result<()> {
    let decision = decide(config, rules, push, project).await?;
    info!(decision = %decision.id, goals = decision.goal_count(), "decided");
    println!("{}", render_decision(&decision));
    Ok(())
}

async fn cmd_predict(config: EngineConfig, rules: &Path, push: &Path) -> Result<()> {
    let decider = load_decider(config, rules)?;
    let ctx = partial_push_context(push)?;
    let prediction = decider.predict(&ctx).await;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

async fn cmd_graph(
    config: EngineConfig,
    rules: &Path,
    push: &Path,
    project: Option<&Path>,
) -> Result<()> {
    let decision = decide(config, rules, push, project).await?;
    match &decision.goals {
        Some(goals) => println!("{}", goals_to_dot(goals)),
        None => anyhow::bail!("no goals were set for this push"),
    }
    Ok(())
}

fn cmd_describe(config: EngineConfig, rules: &Path) -> Result<()> {
    let decider = load_decider(config, rules)?;
    println!("{}", serde_json::to_string_pretty(&decider.describe())?);
    Ok(())
}
