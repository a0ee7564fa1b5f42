//! Configuration
//!
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use yaml_peg::serde as yaml;

/// Struct representing a lakegrant.yaml file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LakegrantConfig {
    /// Config schema version
    #[serde(default = "default_version")]
    pub version: String,
    /// Retry budgets and backoff for calls to the permissions service
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LakegrantConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_version() -> String {
    "0.0.1".to_owned()
}

impl LakegrantConfig {
    /// Read and validate a config file.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<LakegrantConfig> {
        debug!("reading config from {:?}", path.as_ref());
        let config_raw = fs::read_to_string(&path).context("Reading file")?;
        Self::from_yaml(&config_raw)
    }

    /// Parse and validate a config from yaml text.
    pub fn from_yaml(raw: &str) -> Result<LakegrantConfig> {
        let mut config =
            yaml::from_str::<LakegrantConfig>(raw).context("Deserializing config")?;
        let config = config
            .pop()
            .ok_or_else(|| anyhow!["config file has no documents"])?;
        config.retry.validate().context("Validating retry config")?;
        Ok(config)
    }

    /// Convert this config to a yaml string.
    pub fn to_yaml(&self) -> Result<String> {
        yaml::to_string(self).map_err(anyhow::Error::from)
    }
}

/// Largest accepted retry budget, in seconds.
pub const MAX_RETRY_BUDGET_SECS: u64 = 24 * 60 * 60;
/// Largest accepted backoff, in milliseconds.
pub const MAX_BACKOFF_MILLIS: u64 = 60 * 60 * 1000;

/// How long, and how often, to retry transient failures.
///
/// Creating and reading share the propagation budget: newly created
/// principals and locations take a while to become visible to the service.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Budget for grant and list calls, in seconds
    #[serde(default = "default_propagation_timeout_secs")]
    pub propagation_timeout_secs: u64,
    /// Budget for revoke calls, in seconds
    #[serde(default = "default_delete_timeout_secs")]
    pub delete_timeout_secs: u64,
    /// First backoff between attempts, in milliseconds
    #[serde(default = "default_initial_backoff_millis")]
    pub initial_backoff_millis: u64,
    /// Upper bound for the backoff, in milliseconds
    #[serde(default = "default_max_backoff_millis")]
    pub max_backoff_millis: u64,
    /// Base of the exponential backoff: the nth retry waits
    /// `initial * base^n`, capped at the maximum
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,
}

fn default_propagation_timeout_secs() -> u64 {
    120
}

fn default_delete_timeout_secs() -> u64 {
    120
}

fn default_initial_backoff_millis() -> u64 {
    500
}

fn default_max_backoff_millis() -> u64 {
    10_000
}

fn default_backoff_base() -> u32 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            propagation_timeout_secs: default_propagation_timeout_secs(),
            delete_timeout_secs: default_delete_timeout_secs(),
            initial_backoff_millis: default_initial_backoff_millis(),
            max_backoff_millis: default_max_backoff_millis(),
            backoff_base: default_backoff_base(),
        }
    }
}

impl RetryConfig {
    /// Catch values that would make the retry loop useless or endless.
    pub fn validate(&self) -> Result<()> {
        let budgets = [self.propagation_timeout_secs, self.delete_timeout_secs];
        if budgets.iter().any(|b| *b == 0 || *b > MAX_RETRY_BUDGET_SECS) {
            bail!(
                "retry budgets must be between 1 and {MAX_RETRY_BUDGET_SECS} seconds: {:#?}",
                self
            );
        }
        if self.initial_backoff_millis == 0
            || self.max_backoff_millis < self.initial_backoff_millis
            || self.max_backoff_millis > MAX_BACKOFF_MILLIS
        {
            bail!(
                "backoff must be positive, no larger than its maximum, and at most \
                 {MAX_BACKOFF_MILLIS}ms: {:#?}",
                self
            );
        }
        if self.backoff_base == 0 {
            bail!("backoff base must be at least 1: {:#?}", self);
        }
        Ok(())
    }

    /// Budget for grant and list calls
    pub fn propagation_timeout(&self) -> Duration {
        Duration::from_secs(self.propagation_timeout_secs)
    }

    /// Budget for revoke calls
    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    /// First backoff between attempts
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_millis)
    }

    /// Upper bound for the backoff
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_millis)
    }
}
