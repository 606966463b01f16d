//! Retry configuration
//!
//! `RetryConfig` is the serializable form of a [`RetryPolicy`]. It can be read
//! from JSON or from `STATARCH_*` environment variables and is validated before
//! use.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

use crate::error::ConfigError;
use crate::retry::{BASE_DELAY, MAX_RETRIES, RetryPolicy};

pub const ENV_MAX_RETRIES: &str = "STATARCH_MAX_RETRIES";
pub const ENV_BASE_DELAY_MS: &str = "STATARCH_BASE_DELAY_MS";
pub const ENV_MAX_DELAY_MS: &str = "STATARCH_MAX_DELAY_MS";
pub const ENV_JITTER: &str = "STATARCH_JITTER";

/// Serializable retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[validate(range(max = 10))]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    #[validate(range(min = 1, max = 60000))]
    pub base_delay_ms: u64,

    /// Cap for any single delay, in milliseconds
    #[validate(range(min = 1))]
    pub max_delay_ms: u64,

    /// Randomize delays by up to 10%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay_ms: BASE_DELAY.as_millis() as u64,
            max_delay_ms: 60_000,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Parse and validate a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`; unset keys keep their defaults.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, ENV_MAX_RETRIES)? {
            config.max_retries = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_BASE_DELAY_MS)? {
            config.base_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_DELAY_MS)? {
            config.max_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_JITTER)? {
            config.jitter = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Build the policy these settings describe
    pub fn into_policy(self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(self.max_retries)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter)
    }
}

fn parse_var<L, V>(lookup: &L, key: &str) -> Result<Option<V>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    V: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        })
}
