use dbperms_integrations::{DatabricksConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = ".dbperms";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_secs: dbperms_integrations::config::DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            log_file: None,
        }
    }
}

/// CLI flags that override single fields of the file config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub request_timeout_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Loads `~/.dbperms/config.json`, writing the defaults there on first run.
    pub fn load_from_dir() -> eyre::Result<Self> {
        match dirs::home_dir() {
            Some(home) => Self::load_from(&home.join(CONFIG_DIR).join(CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> eyre::Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&Self::default())?;
            std::fs::write(path, json)?;
        }

        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str::<Config>(&contents)
            .map_err(|e| eyre::eyre!("Failed to parse {}: {}", path.display(), e))
    }

    pub fn from_json(json: &str) -> eyre::Result<Self> {
        serde_json::from_str(json).map_err(|e| eyre::eyre!("Failed to parse --json config: {}", e))
    }

    pub fn apply_override(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(timeout) = overrides.request_timeout_secs {
            self.request_timeout_secs = timeout;
        }
        if let Some(log_file) = overrides.log_file {
            self.log_file = Some(log_file);
        }
        self
    }

    /// Resolves credentials (flag, then environment) and builds the transport settings.
    ///
    /// `.env` values are expected to be loaded into the environment beforehand.
    pub fn databricks(
        &self,
        host: Option<String>,
        token: Option<String>,
    ) -> eyre::Result<DatabricksConfig> {
        let host = host
            .or_else(|| std::env::var("DATABRICKS_HOST").ok())
            .unwrap_or_default();
        let token = token
            .or_else(|| std::env::var("DATABRICKS_TOKEN").ok())
            .unwrap_or_default();

        if self.request_timeout_secs == 0 {
            return Err(eyre::eyre!("request_timeout_secs must be at least 1"));
        }
        let config = DatabricksConfig::new(host, token)
            .map_err(|e| eyre::eyre!("{}. Set DATABRICKS_HOST and DATABRICKS_TOKEN or pass --host/--token", e))?
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_retry(self.retry.clone());
        config.validate()?;
        Ok(config)
    }
}
