//! Runtime configuration (YAML)
//!
//! ```yaml
//! max_ticks: 10000        # upper bound for run_until_idle
//! log_filter: info        # used when RUST_LOG is unset
//! invalidation: coalesce  # or: reentrant
//! journal: true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StepError;

/// How a binding treats an invalidation raised while it is already delivering one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationPolicy {
    /// Deliver nested invalidations immediately, re-entering subscribers
    #[default]
    Reentrant,
    /// Fold nested invalidations into one extra pass after the current one
    Coalesce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub max_ticks: u64,
    pub log_filter: String,
    /// Policy for bindings built with `BindingBuilder::policy_from`. Bindings
    /// made with `Binding::create` or without a policy stay `Reentrant`.
    pub invalidation: InvalidationPolicy,
    pub journal: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_ticks: 10_000,
            log_filter: "info".to_string(),
            invalidation: InvalidationPolicy::default(),
            journal: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, StepError> {
        // An empty document means "all defaults"
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StepError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), StepError> {
        if self.max_ticks == 0 {
            return Err(StepError::Config("max_ticks must be greater than 0".into()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(StepError::Config("log_filter cannot be empty".into()));
        }
        Ok(())
    }
}
