//! Console configuration, read from `.cockpit/cockpit.toml`.
//!
//! Layered: file → environment → CLI flags. Every section is optional
//! and carries defaults, so a missing file is a fully working setup
//! pointed at a local engine.
//!
//! # Configuration File Format
//!
//! ```toml
//! [engine]
//! base_url = "http://127.0.0.1:8790"
//! api_token = "secret"
//!
//! [timeouts]
//! plan_request_secs = 15
//! confirm_request_secs = 45
//!
//! [polling]
//! interval_secs = 3
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::workflow::RecoveryBudgets;

/// Directory name holding per-project console state and config.
pub const COCKPIT_DIR: &str = ".cockpit";
const CONFIG_FILE: &str = "cockpit.toml";
const STATE_DIR: &str = "state";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CockpitConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default)]
    pub polling: PollingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8790".to_string()
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSection {
    /// How long an interrupted plan request stays reconcilable.
    #[serde(default = "default_plan_request_secs")]
    pub plan_request_secs: u64,
    /// How long an interrupted confirm request stays reconcilable.
    #[serde(default = "default_confirm_request_secs")]
    pub confirm_request_secs: u64,
}

fn default_plan_request_secs() -> u64 {
    15
}

fn default_confirm_request_secs() -> u64 {
    45
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            plan_request_secs: default_plan_request_secs(),
            confirm_request_secs: default_confirm_request_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSection {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    3
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
        }
    }
}

impl CockpitConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse cockpit.toml")
    }

    /// Load configuration from `.cockpit/cockpit.toml` under the given
    /// project root. A missing file yields the defaults.
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(COCKPIT_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Engine base URL, with the environment taking precedence over the
    /// file.
    pub fn engine_url(&self) -> String {
        std::env::var("COCKPIT_ENGINE_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.engine.base_url.clone())
    }

    /// API token, with the environment taking precedence over the file.
    pub fn api_token(&self) -> Option<String> {
        std::env::var("COCKPIT_API_TOKEN")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.engine.api_token.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs.max(1))
    }

    pub fn recovery_budgets(&self) -> RecoveryBudgets {
        RecoveryBudgets {
            plan_timeout: Duration::from_secs(self.timeouts.plan_request_secs),
            confirm_timeout: Duration::from_secs(self.timeouts.confirm_request_secs),
        }
    }

    /// Directory holding the persisted workflow records.
    pub fn state_dir(project_root: &Path) -> PathBuf {
        project_root.join(COCKPIT_DIR).join(STATE_DIR)
    }
}
