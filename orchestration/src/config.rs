//! Policy configuration — one YAML document, every section optional.
//!
//! Missing keys fall back to the defaults documented on each type; a handful
//! of deployment knobs also honour `PILOT_*` environment variables, which
//! win over the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::drift::GuardrailConfig;
use crate::memory::{LifecycleConfig, LoadingConfig, RelevanceConfig};
use crate::pressure::PressureConfig;
use crate::router::RoleProfile;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed policy document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("relevance weights must sum to 1 (within 0.01)")]
    BadWeights,
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Session-section knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    pub max_concurrent_sessions: usize,
    pub heartbeat_interval_sec: u64,
    pub lease_minutes: i64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 6,
            heartbeat_interval_sec: 30,
            lease_minutes: 15,
        }
    }
}

/// Orchestrator-section knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorPolicy {
    /// Consecutive divergent predictions before a drift alert.
    pub drift_threshold: usize,
    pub require_tests_pass: bool,
    pub auto_reassign_stale: bool,
    /// Seconds between PM ticks.
    pub tick_interval_sec: u64,
    /// Optional shell command the work review runs as its test gate.
    pub test_command: Option<String>,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            drift_threshold: 3,
            require_tests_pass: false,
            auto_reassign_stale: true,
            tick_interval_sec: 30,
            test_command: None,
        }
    }
}

/// Memory-section knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryPolicy {
    pub relevance: RelevanceConfig,
    pub lifecycle: LifecycleConfig,
    pub loading: LoadingConfig,
}

/// Notifications-section knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPolicy {
    /// Webhook URLs by channel name.
    pub webhooks: Vec<WebhookConfig>,
    pub primary_channel: String,
    pub digest_interval_minutes: u64,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            webhooks: Vec::new(),
            primary_channel: "log".to_string(),
            digest_interval_minutes: 30,
        }
    }
}

/// One configured webhook sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
}

/// Execution-section knobs. Remote providers (docker, ssh) are free-form
/// maps handed verbatim to their adapters; the core never interprets them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionPolicy {
    pub providers: std::collections::BTreeMap<String, serde_yaml::Value>,
}

/// Worktree-section knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorktreePolicy {
    pub base_branch: String,
    pub base_dir: Option<PathBuf>,
}

impl Default for WorktreePolicy {
    fn default() -> Self {
        Self {
            base_branch: "main".to_string(),
            base_dir: None,
        }
    }
}

/// The whole policy document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub session: SessionPolicy,
    pub orchestrator: OrchestratorPolicy,
    pub memory: MemoryPolicy,
    pub pressure: PressureConfig,
    pub drift_prevention: GuardrailConfig,
    pub notifications: NotificationPolicy,
    pub execution: ExecutionPolicy,
    pub worktree: WorktreePolicy,
    /// Routing profiles, in registration (tie-break) order.
    pub roles: Vec<RoleProfile>,
    /// Router confidence gate.
    pub confidence_threshold: f64,
}

impl PilotConfig {
    /// Load from a YAML file, falling back to defaults when absent, then
    /// apply environment overrides and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })?;
            serde_yaml::from_str(&text)?
        } else {
            Self::defaults()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults, including the gate the router documents.
    pub fn defaults() -> Self {
        Self {
            confidence_threshold: 0.3,
            ..Default::default()
        }
    }

    fn apply_env(&mut self) {
        if let Some(interval) = env_parse::<u64>("PILOT_HEARTBEAT_INTERVAL_SEC") {
            self.session.heartbeat_interval_sec = interval;
        }
        if let Some(interval) = env_parse::<u64>("PILOT_TICK_INTERVAL_SEC") {
            self.orchestrator.tick_interval_sec = interval;
        }
        if let Ok(url) = std::env::var("PILOT_WEBHOOK_URL") {
            if !url.is_empty() {
                self.notifications.webhooks.push(WebhookConfig {
                    name: "env-webhook".to_string(),
                    url,
                });
            }
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if !self.memory.relevance.weights.is_normalised() {
            return Err(ConfigError::BadWeights);
        }
        Ok(())
    }

    /// Zero confidence threshold means an unset document; use the default.
    pub fn confidence_threshold(&self) -> f64 {
        if self.confidence_threshold > 0.0 {
            self.confidence_threshold
        } else {
            0.3
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
