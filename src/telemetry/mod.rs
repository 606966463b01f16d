//! Tracing setup
//!
//! Retry diagnostics are emitted as `tracing` events under the
//! `statarch::retry` target. Applications that do not install their own
//! subscriber can call [`init_tracing`].
//!
//! ```rust,no_run
//! use statarch::telemetry::{TracingConfig, init_tracing};
//!
//! init_tracing(&TracingConfig::default().json(true))?;
//! # Ok::<(), statarch::error::ConfigError>(())
//! ```

use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Environment variable consulted for the log filter
pub const LOG_ENV: &str = "STATARCH_LOG";

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter used when `STATARCH_LOG` is unset
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_filter: "statarch=info".to_string(),
            json: false,
        }
    }
}

impl TracingConfig {
    pub fn default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// `STATARCH_LOG` when set and valid, otherwise the configured default
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        match EnvFilter::try_from_env(LOG_ENV) {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_filter).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "default_filter".to_string(),
                    value: format!("{} ({e})", self.default_filter),
                }
            }),
        }
    }
}

/// Install a global fmt subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), ConfigError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| ConfigError::Tracing(e.to_string()))
}
