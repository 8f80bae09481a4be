//! gridscale.toml configuration.
//!
//! ```toml
//! [retry]
//! strategy = "exponential"   # or "immediate"
//! base = "1s"
//! max = "30s"
//!
//! [blocking]
//! wait_time = "5m"
//!
//! [canonical]
//! target = "local"
//! source = "local"
//! ```
//!
//! Every section and key is optional.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use gridscale_orchestrator::{Orchestrator, RetryPolicy};
use gridscale_policy::{CanonicalDefaults, Normalizer, OrchestratorPolicySource};
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::registry::WatcherRegistry;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub retry: RetryConfig,
    pub blocking: BlockingConfig,
    pub canonical: CanonicalDefaults,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    #[default]
    Immediate,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub strategy: RetryStrategy,
    /// First pause for exponential retry (e.g., "1s").
    pub base: String,
    /// Largest pause for exponential retry (e.g., "30s").
    pub max: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Immediate,
            base: "1s".to_string(),
            max: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingConfig {
    /// How long the orchestrator may hold a blocking query (e.g., "5m").
    pub wait_time: String,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            wait_time: "5m".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn from_file(path: &Path) -> StateResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StateError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> StateResult<Self> {
        let config: SyncConfig =
            toml::from_str(content).map_err(|e| StateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> StateResult<String> {
        toml::to_string_pretty(self).map_err(|e| StateError::Config(e.to_string()))
    }

    /// Check every duration and name.
    pub fn validate(&self) -> StateResult<()> {
        if let RetryPolicy::Exponential { base, max } = self.retry_policy()? {
            if base.is_zero() || max < base {
                return Err(StateError::Config(format!(
                    "retry: base must be non-zero and no larger than max (base {base:?}, max {max:?})"
                )));
            }
        }
        self.wait_time()?;
        if self.canonical.target.is_empty() || self.canonical.source.is_empty() {
            return Err(StateError::Config(
                "canonical: target and source must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> StateResult<RetryPolicy> {
        Ok(match self.retry.strategy {
            RetryStrategy::Immediate => RetryPolicy::Immediate,
            RetryStrategy::Exponential => RetryPolicy::Exponential {
                base: parse_duration("retry.base", &self.retry.base)?,
                max: parse_duration("retry.max", &self.retry.max)?,
            },
        })
    }

    pub fn wait_time(&self) -> StateResult<Duration> {
        parse_duration("blocking.wait_time", &self.blocking.wait_time)
    }

    pub fn canonical_defaults(&self) -> &CanonicalDefaults {
        &self.canonical
    }

    /// Build a policy source configured from this file.
    pub fn policy_source<O: Orchestrator>(
        &self,
        orchestrator: Arc<O>,
    ) -> StateResult<OrchestratorPolicySource<O>> {
        Ok(OrchestratorPolicySource::new(orchestrator)
            .with_normalizer(Normalizer::new(self.canonical.clone()))
            .with_retry(self.retry_policy()?)
            .with_wait_time(self.wait_time()?))
    }

    /// Build a watcher registry configured from this file.
    pub fn watcher_registry<O: Orchestrator>(
        &self,
        orchestrator: Arc<O>,
    ) -> StateResult<WatcherRegistry<O>> {
        Ok(WatcherRegistry::new(orchestrator)
            .with_retry(self.retry_policy()?)
            .with_wait_time(self.wait_time()?))
    }
}

fn parse_duration(field: &str, value: &str) -> StateResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| StateError::Config(format!("{field}: invalid duration {value:?}: {e}")))
}
