//! Engine configuration.
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! - `SDM_CACHE_CAPACITY` (optional, default: 1000) - push test cache size
//! - `SDM_FAILURE_POLICY` (optional, default: "fail-fast") - `fail-fast` or
//!   `isolate-and-report`
//!
//! ```toml
//! cache_capacity = 500
//! failure_policy = "isolate-and-report"
//! log_json = true
//! log_level = "debug"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::cache::{PushTestCache, DEFAULT_CACHE_CAPACITY};
use crate::error::{GoalError, GoalResult};
use crate::scope::FailurePolicy;

pub const CACHE_CAPACITY_ENV: &str = "SDM_CACHE_CAPACITY";
pub const FAILURE_POLICY_ENV: &str = "SDM_FAILURE_POLICY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_capacity: usize,
    pub failure_policy: FailurePolicy,
    pub log_json: bool,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            failure_policy: FailurePolicy::default(),
            log_json: false,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> GoalResult<Self> {
        toml::from_str(raw).map_err(|e| GoalError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> GoalResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GoalError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Defaults, or `path` when given, with environment overrides applied.
    pub fn load(path: Option<&Path>) -> GoalResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    pub fn with_env_overrides(self) -> GoalResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> GoalResult<Self> {
        if let Some(raw) = lookup(CACHE_CAPACITY_ENV) {
            self.cache_capacity = raw.trim().parse().map_err(|_| {
                GoalError::Config(format!("{CACHE_CAPACITY_ENV} must be a number, got '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup(FAILURE_POLICY_ENV) {
            self.failure_policy = raw
                .trim()
                .parse()
                .map_err(|e: String| GoalError::Config(format!("{FAILURE_POLICY_ENV}: {e}")))?;
        }
        Ok(self)
    }

    pub fn level(&self) -> GoalResult<Level> {
        self.log_level
            .parse()
            .map_err(|_| GoalError::Config(format!("unknown log level '{}'", self.log_level)))
    }

    /// Size the process-wide push test cache.
    ///
    /// Returns `false` if the cache was already in use, in which case its
    /// capacity is left as it was.
    pub fn apply(&self) -> bool {
        let installed = PushTestCache::init_global(self.cache_capacity);
        if !installed {
            tracing::debug!(
                requested = self.cache_capacity,
                current = PushTestCache::global().capacity(),
                "push test cache already initialised"
            );
        }
        installed
    }
}
