//! Configuration loading, validation, and management for agentflow.
//!
//! Loads configuration from `~/.agentflow/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use agentflow_core::{CredentialPolicy, RemoteServerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentflow/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint (can be overridden per model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// System prompt for the reactive loop when the caller supplies none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Conversation and tool-call model settings
    #[serde(default)]
    pub models: ModelsConfig,

    /// Tool dispatch settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Code sandbox settings
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Reactive loop settings
    #[serde(default)]
    pub react: ReactConfig,

    /// Code execution loop settings
    #[serde(default)]
    pub code_execution: CodeExecutionConfig,

    /// Remote tool servers
    #[serde(default)]
    pub remote: RemoteConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_conversation_model() -> String {
    "gpt-4o".into()
}
fn default_tool_call_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_tool_timeout() -> u64 {
    60
}
fn default_sandbox_command() -> Vec<String> {
    vec!["python3".into(), "-I".into(), "-".into()]
}
fn default_sandbox_timeout() -> u64 {
    30
}
fn default_sandbox_max_output() -> usize {
    1024 * 1024
}
fn default_react_iterations() -> usize {
    25
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("system_prompt", &self.system_prompt)
            .field("models", &self.models)
            .field("tools", &self.tools)
            .field("sandbox", &self.sandbox)
            .field("react", &self.react)
            .field("code_execution", &self.code_execution)
            .field("remote", &self.remote)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Used for planning, code generation and answer synthesis
    #[serde(default = "ModelConfig::conversation")]
    pub conversation: ModelConfig,

    /// Used for tool calling
    #[serde(default = "ModelConfig::tool_call")]
    pub tool_call: ModelConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            conversation: ModelConfig::conversation(),
            tool_call: ModelConfig::tool_call(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Overrides the top-level `api_url` for this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Overrides the top-level `api_key` for this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl ModelConfig {
    fn named(model: String) -> Self {
        Self {
            model,
            temperature: default_temperature(),
            max_tokens: None,
            api_url: None,
            api_key: None,
        }
    }

    fn conversation() -> Self {
        Self::named(default_conversation_model())
    }

    fn tool_call() -> Self {
        Self::named(default_tool_call_model())
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-invocation timeout
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Interpreter argv; the program is written to its stdin
    #[serde(default = "default_sandbox_command")]
    pub command: Vec<String>,

    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    /// Pass the host environment through to the interpreter
    #[serde(default)]
    pub inherit_env: bool,

    /// Let programs read and write the host filesystem
    #[serde(default)]
    pub allow_fs: bool,

    /// Let programs open sockets
    #[serde(default)]
    pub allow_net: bool,

    /// Read-only paths the interpreter needs when `allow_fs` is off.
    /// Unset means the system library locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_paths: Option<Vec<PathBuf>>,

    /// Combined stdout and stderr a run may print before it is killed
    #[serde(default = "default_sandbox_max_output")]
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command: default_sandbox_command(),
            timeout_secs: default_sandbox_timeout(),
            inherit_env: false,
            allow_fs: false,
            allow_net: false,
            read_paths: None,
            max_output_bytes: default_sandbox_max_output(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactConfig {
    #[serde(default = "default_react_iterations")]
    pub max_iterations: usize,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_react_iterations(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeExecutionConfig {
    /// Absent means the loop runs until the model answers in plain text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub credential_policy: CredentialPolicy,

    #[serde(default)]
    pub servers: Vec<RemoteServerConfig>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentflow/config.toml).
    ///
    /// Also checks environment variables:
    /// - `AGENTFLOW_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `AGENTFLOW_API_URL`
    /// - `AGENTFLOW_MODEL` (sets both models)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("AGENTFLOW_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("AGENTFLOW_API_URL") {
            config.api_url = url;
        }

        if let Ok(model) = std::env::var("AGENTFLOW_MODEL") {
            config.models.conversation.model = model.clone();
            config.models.tool_call.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentflow")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, model) in [
            ("models.conversation", &self.models.conversation),
            ("models.tool_call", &self.models.tool_call),
        ] {
            if model.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{label}.model must not be empty")));
            }
            if !(0.0..=2.0).contains(&model.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "{label}.temperature must be between 0.0 and 2.0"
                )));
            }
        }

        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("tools.timeout_secs must be > 0".into()));
        }

        if self.sandbox.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("sandbox.timeout_secs must be > 0".into()));
        }

        if self.sandbox.command.first().is_none_or(|c| c.trim().is_empty()) {
            return Err(ConfigError::ValidationError("sandbox.command must name an interpreter".into()));
        }

        if self.sandbox.max_output_bytes == 0 {
            return Err(ConfigError::ValidationError("sandbox.max_output_bytes must be > 0".into()));
        }

        if self.react.max_iterations == 0 {
            return Err(ConfigError::ValidationError("react.max_iterations must be > 0".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for server in &self.remote.servers {
            if server.server_id.trim().is_empty() {
                return Err(ConfigError::ValidationError("remote server_id must not be empty".into()));
            }
            if !seen.insert(server.server_id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate remote server_id '{}'",
                    server.server_id
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || (self.models.conversation.api_key.is_some() && self.models.tool_call.api_key.is_some())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            system_prompt: None,
            models: ModelsConfig::default(),
            tools: ToolsConfig::default(),
            sandbox: SandboxConfig::default(),
            react: ReactConfig::default(),
            code_execution: CodeExecutionConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for agentflow_core::Error {
    fn from(err: ConfigError) -> Self {
        agentflow_core::Error::Config {
            message: err.to_string(),
        }
    }
}
