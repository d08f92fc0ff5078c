use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Backoff schedule applied by the transport to retryable attempts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: u32,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            factor: 2,
            max_delay_ms: 4000,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = u64::from(self.factor.max(1)).saturating_pow(exponent);
        let delay = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Resolved connection settings. Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct DatabricksConfig {
    pub host: String,
    pub token: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl DatabricksConfig {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            host: normalize_host(&host.into()),
            token: token.into().trim().to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("DATABRICKS_HOST").map_err(|_| ConfigError::MissingHost)?;
        let token = std::env::var("DATABRICKS_TOKEN").map_err(|_| ConfigError::MissingToken)?;
        Self::new(host, token)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return String::new();
    }
    if host.starts_with("http") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}
