//! Runtime configuration.
//!
//! Defaults cover a local deployment; an optional YAML file and
//! `QUIZRUNNER_*` environment variables override individual fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// Model chain settings for the planner and coder stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelChainConfig {
    /// Primary planning model, expected to accept an image part.
    pub planner: String,
    /// Fallback planner used when the primary call fails.
    pub planner_fallback: String,
    /// Model whose sole job is coercing broken output into valid JSON.
    pub repair: String,
    /// Ordered coder models, one per attempt.
    pub coders: Vec<String>,
}

impl Default for ModelChainConfig {
    fn default() -> Self {
        Self {
            planner: "gemini-1.5-flash".to_string(),
            planner_fallback: "openai/gpt-5-nano".to_string(),
            repair: "openai/gpt-5-nano".to_string(),
            coders: vec![
                "openai/gpt-5-nano".to_string(),
                "openai/gpt-5-nano".to_string(),
                "openai/gpt-5-nano".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Bind address for the inbound surface.
    pub bind_addr: String,
    /// Shared secret expected on inbound mission requests. Unset disables
    /// acceptance (healthz reports the gap).
    pub secret: Option<String>,
    /// Chat-completions endpoint base, e.g. `https://aipipe.org/openrouter/v1`.
    pub api_base: String,
    /// Bearer token for the model gateway.
    pub api_token: Option<String>,
    pub models: ModelChainConfig,
    /// Root under which per-mission workspaces are created.
    pub workspace_root: PathBuf,
    /// Root for audit trails written by the disk recorder.
    pub log_root: PathBuf,
    /// Global mission deadline in seconds, checked at round boundaries.
    pub mission_deadline_secs: u64,
    /// Settle delay between snapshot capture and planning, in seconds.
    pub think_delay_secs: u64,
    /// Snapshot capture attempts before a round faults.
    pub observe_attempts: u32,
    /// Base backoff between capture attempts, in milliseconds.
    pub observe_backoff_ms: u64,
    /// Per-call model timeout in seconds.
    pub model_timeout_secs: u64,
    /// Answer submission timeout in seconds.
    pub submit_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            secret: None,
            api_base: "https://aipipe.org/openrouter/v1".to_string(),
            api_token: None,
            models: ModelChainConfig::default(),
            workspace_root: PathBuf::from("downloads"),
            log_root: PathBuf::from("mission_logs"),
            mission_deadline_secs: 175,
            think_delay_secs: 5,
            observe_attempts: 3,
            observe_backoff_ms: 2_000,
            model_timeout_secs: 120,
            submit_timeout_secs: 15,
        }
    }
}

impl AgentConfig {
    /// Load configuration: defaults, then an optional YAML file, then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AgentError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path).map_err(|err| {
                    AgentError::config(format!("cannot read {}: {err}", path.display()))
                })?;
                serde_yaml::from_str(&raw).map_err(|err| {
                    AgentError::config(format!("cannot parse {}: {err}", path.display()))
                })?
            }
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("QUIZRUNNER_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(secret) = std::env::var("QUIZRUNNER_SECRET") {
            self.secret = Some(secret);
        }
        if let Ok(base) = std::env::var("QUIZRUNNER_API_BASE") {
            self.api_base = base;
        }
        if let Ok(token) = std::env::var("QUIZRUNNER_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Ok(root) = std::env::var("QUIZRUNNER_WORKSPACE_ROOT") {
            self.workspace_root = PathBuf::from(root);
        }
        if let Ok(root) = std::env::var("QUIZRUNNER_LOG_ROOT") {
            self.log_root = PathBuf::from(root);
        }
        if let Ok(deadline) = std::env::var("QUIZRUNNER_MISSION_DEADLINE_SECS") {
            if let Ok(secs) = deadline.parse() {
                self.mission_deadline_secs = secs;
            }
        }
    }

    pub fn mission_deadline(&self) -> Duration {
        Duration::from_secs(self.mission_deadline_secs)
    }

    pub fn think_delay(&self) -> Duration {
        Duration::from_secs(self.think_delay_secs)
    }

    pub fn observe_backoff(&self) -> Duration {
        Duration::from_millis(self.observe_backoff_ms)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    /// Attempt budget per round: one coder model per attempt, capped at three.
    pub fn attempt_budget(&self) -> usize {
        self.models.coders.len().min(3)
    }
}
