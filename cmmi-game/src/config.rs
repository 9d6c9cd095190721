//! Suite configuration
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_ADMIN_SECRET, DEFAULT_LEADERBOARD_SIZE, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_STORAGE_PREFIX, DEFAULT_TIME_LIMIT_SECS, ENV_ADMIN_SECRET, ENV_API_KEY,
    ENV_GATING_POLICY, ENV_POLL_INTERVAL_MS, ENV_PROJECT_ID, PLACEHOLDER_API_KEY,
    PLACEHOLDER_PROJECT_ID,
};
use crate::progression::{GatingPolicy, UnknownGatingPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Connection settings for the hosted document store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableConfig {
    pub project_id: Option<String>,
    pub api_key: Option<String>,
}

impl DurableConfig {
    /// Both settings present and not left at their template values.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let set = |value: &Option<String>, placeholder: &str| {
            value
                .as_deref()
                .is_some_and(|v| !v.trim().is_empty() && v != placeholder)
        };
        set(&self.project_id, PLACEHOLDER_PROJECT_ID) && set(&self.api_key, PLACEHOLDER_API_KEY)
    }
}

/// Startup configuration passed to every component that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub gating_policy: GatingPolicy,
    pub poll_interval_ms: u64,
    pub admin_secret: String,
    pub storage_prefix: String,
    pub leaderboard_size: usize,
    pub time_limit_secs: u32,
    /// Fixed seed for record ids; `None` seeds from the clock.
    pub id_seed: Option<u64>,
    pub durable: DurableConfig,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            gating_policy: GatingPolicy::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            admin_secret: DEFAULT_ADMIN_SECRET.to_string(),
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            id_seed: None,
            durable: DurableConfig::default(),
        }
    }
}

impl SuiteConfig {
    /// Parse a configuration document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply `CMMI_*` overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if an override cannot be parsed.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project_id) = lookup(ENV_PROJECT_ID) {
            self.durable.project_id = Some(project_id);
        }
        if let Some(api_key) = lookup(ENV_API_KEY) {
            self.durable.api_key = Some(api_key);
        }
        if let Some(secret) = lookup(ENV_ADMIN_SECRET) {
            self.admin_secret = secret;
        }
        if let Some(policy) = lookup(ENV_GATING_POLICY) {
            self.gating_policy = policy.parse().map_err(|UnknownGatingPolicy(value)| {
                ConfigError::InvalidValue {
                    key: ENV_GATING_POLICY.to_string(),
                    value,
                }
            })?;
        }
        if let Some(interval) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = interval
                .trim()
                .parse()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: ENV_POLL_INTERVAL_MS.to_string(),
                    value: interval.clone(),
                })?;
        }
        Ok(self)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment override cannot be parsed.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
