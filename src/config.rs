use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{EyeHandError, EyeHandResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub api_base: String,
    /// Model name sent to the API.
    pub model: String,
    /// Optional API key stored in config.toml (falls back to env var EYEHAND_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Shorter timeout for the yes/no verification call.
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_request_timeout() -> u64 {
    60
}

fn default_verify_timeout() -> u64 {
    30
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub mode: AgentMode,
    /// Symmetric clamp applied to dx/dy before the sink sees them.
    #[serde(default = "default_max_displacement")]
    pub max_displacement: i32,
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    /// Screen resolution quoted in the hybrid execute-stage prompt so the
    /// model can convert normalized grounding coordinates to pixels.
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
    /// Persist each executed action to a session JSONL file.
    #[serde(default = "default_true")]
    pub session_trace: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// One vision call decides the next action directly.
    #[default]
    Single,
    /// Plan → ground → execute pipeline across three model calls.
    Hybrid,
}

fn default_max_displacement() -> i32 {
    200
}

fn default_history_depth() -> usize {
    3
}

fn default_screen_width() -> u32 {
    1920
}

fn default_screen_height() -> u32 {
    1080
}

fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: AgentMode::Single,
            max_displacement: default_max_displacement(),
            history_depth: default_history_depth(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            session_trace: true,
        }
    }
}

impl GatewayConfig {
    /// Resolve the API key: config.toml entry first, then EYEHAND_API_KEY.
    pub fn resolve_api_key(&self) -> String {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("EYEHAND_API_KEY").ok())
            .unwrap_or_default()
    }
}

fn resolve_config_path() -> EyeHandResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(EyeHandError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> EyeHandResult<AppConfig> {
    // .env may carry EYEHAND_API_KEY; absence is fine.
    let _ = dotenvy::dotenv();

    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        model = %config.gateway.model,
        mode = ?config.agent.mode,
        "config loaded"
    );
    Ok(config)
}
