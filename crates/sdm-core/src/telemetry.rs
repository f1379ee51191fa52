//! Tracing subscriber setup for SDM binaries.
//!
//! Filtering comes from `SDM_LOG`, then `RUST_LOG`, then the level passed
//! in. Only the first successful call installs a subscriber.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "SDM_LOG";

fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global tracing subscriber.
///
/// `json` switches to newline-delimited JSON lines. Log output goes to
/// stderr so command output on stdout (goal lists, DOT graphs) stays clean.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(filter_for(level));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    // A subscriber installed earlier (e.g. by a test harness) wins.
    installed.ok();
}
