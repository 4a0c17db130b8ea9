use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{identity::RetryPolicy, render::CodeStyle};

/// Runtime configuration for the attestation pipeline.
///
/// Every field has a default, so a configuration file only needs the values
/// it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the attestation backend; endpoints live under `/unblind`
    pub base_url: String,
    /// Transport timeout applied to every backend request
    pub request_timeout_ms: u64,
    /// Upper bound on the render and hash calls of a single event
    pub call_timeout_ms: u64,
    pub signup: RetryPolicy,
    pub code: CodeStyle,
    /// Where the identity is persisted; in memory when unset
    pub state_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_owned(),
            request_timeout_ms: 10_000,
            call_timeout_ms: 15_000,
            signup: RetryPolicy::default(),
            code: CodeStyle::default(),
            state_path: None,
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// # Returns
    ///
    /// `Some(Config)` if the file exists and is valid, `None` if the file doesn't exist.
    pub fn load(config_file: &Path) -> Result<Option<Self>> {
        if config_file.exists() {
            let contents = fs::read_to_string(config_file)?;
            let config = serde_json::from_str::<Config>(&contents)
                .map_err(|e| anyhow!("Invalid config {}: {e}", config_file.display()))?;

            Ok(Some(config))
        } else {
            info!("No config found at {}", config_file.display());

            Ok(None)
        }
    }

    /// Applies `UNBLIND_BASE_URL` and `UNBLIND_STATE_PATH` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base_url) = env::var("UNBLIND_BASE_URL") {
            self.base_url = base_url;
        }
        if let Ok(state_path) = env::var("UNBLIND_STATE_PATH") {
            self.state_path = Some(PathBuf::from(state_path));
        }
        self
    }

    /// Rejects values that would only fail later, mid-event.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("baseUrl must not be empty"));
        }
        if self.code.border < 0 {
            return Err(anyhow!(
                "code.border must be non-negative, got {}",
                self.code.border
            ));
        }
        if self.signup.max_attempts == 0 {
            return Err(anyhow!("signup.maxAttempts must be at least 1"));
        }
        if self.request_timeout_ms == 0 || self.call_timeout_ms == 0 {
            return Err(anyhow!("timeouts must be greater than zero"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
