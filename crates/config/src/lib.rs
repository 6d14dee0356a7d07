//! Configuration loading, validation, and management for ragloom.
//!
//! Loads configuration from `~/.ragloom/config.toml` with environment
//! variable overrides. Validates all settings before any run starts.
//!
//! The loaded [`AppConfig`] is a file schema only. The orchestrator converts
//! it into explicit per-call settings; nothing here is consulted while a run
//! is in progress.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ragloom/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tool scheduling: parallelism, retries, timeouts
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Context assembly: token budget and truncation policy
    #[serde(default)]
    pub context: ContextConfig,

    /// Dependency inference rules for model-emitted tool calls.
    /// Omitting the table keeps the built-in rules; `dependency_rules = []`
    /// disables inference.
    #[serde(default = "default_dependency_rules")]
    pub dependency_rules: Vec<DependencyRuleConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            context: ContextConfig::default(),
            dependency_rules: default_dependency_rules(),
        }
    }
}

/// A full-document load waits for the document search unless ids were given.
fn default_dependency_rules() -> Vec<DependencyRuleConfig> {
    vec![DependencyRuleConfig {
        tool: "load_documents_full".into(),
        depends_on: "search_user_documents".into(),
        unless_argument: Some("document_ids".into()),
    }]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Run independent tools concurrently. `false` forces sequential execution.
    #[serde(default = "default_true")]
    pub parallel_execution: bool,

    /// Retries per tool after the first attempt.
    #[serde(default = "default_max_tool_retries")]
    pub max_tool_retries: u32,

    /// Maximum tool executions in flight at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-attempt timeout for a single tool.
    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,

    /// Deadline for the whole run. Unset means no deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_deadline_ms: Option<u64>,

    #[serde(default)]
    pub retry_backoff: BackoffConfig,
}

fn default_true() -> bool {
    true
}
fn default_max_tool_retries() -> u32 {
    2
}
fn default_max_workers() -> usize {
    4
}
fn default_node_timeout_ms() -> u64 {
    30_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel_execution: true,
            max_tool_retries: default_max_tool_retries(),
            max_workers: default_max_workers(),
            node_timeout_ms: default_node_timeout_ms(),
            run_deadline_ms: None,
            retry_backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff between retry attempts: 1s, 2s, 4s, ... capped at `max_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_backoff_max_ms() -> u64 {
    8_000
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            multiplier: default_backoff_multiplier(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token-aware assembly. `false` falls back to fixed-length truncation.
    #[serde(default = "default_true")]
    pub token_aware: bool,

    /// Model context window.
    #[serde(default = "default_total_tokens")]
    pub total_tokens: usize,

    #[serde(default = "default_reserved_output_tokens")]
    pub reserved_output_tokens: usize,

    #[serde(default = "default_reserved_system_tokens")]
    pub reserved_system_tokens: usize,

    /// Heuristic estimator ratio (~4 chars per token for mixed text).
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f32,

    /// Framing overhead charged per segment (role, delimiters).
    #[serde(default = "default_segment_overhead_tokens")]
    pub segment_overhead_tokens: usize,

    /// Truncated fragments smaller than this are dropped instead.
    #[serde(default = "default_min_segment_tokens")]
    pub min_segment_tokens: usize,

    /// Fallback mode: how many trailing history turns to keep.
    #[serde(default = "default_fallback_messages_limit")]
    pub fallback_messages_limit: usize,

    /// Fallback mode: hard cut of the raw concatenation, in characters.
    #[serde(default = "default_fallback_max_context_chars")]
    pub fallback_max_context_chars: usize,
}

fn default_total_tokens() -> usize {
    180_000
}
fn default_reserved_output_tokens() -> usize {
    4_000
}
fn default_reserved_system_tokens() -> usize {
    2_000
}
fn default_chars_per_token() -> f32 {
    4.0
}
fn default_segment_overhead_tokens() -> usize {
    4
}
fn default_min_segment_tokens() -> usize {
    16
}
fn default_fallback_messages_limit() -> usize {
    20
}
fn default_fallback_max_context_chars() -> usize {
    50_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_aware: true,
            total_tokens: default_total_tokens(),
            reserved_output_tokens: default_reserved_output_tokens(),
            reserved_system_tokens: default_reserved_system_tokens(),
            chars_per_token: default_chars_per_token(),
            segment_overhead_tokens: default_segment_overhead_tokens(),
            min_segment_tokens: default_min_segment_tokens(),
            fallback_messages_limit: default_fallback_messages_limit(),
            fallback_max_context_chars: default_fallback_max_context_chars(),
        }
    }
}

/// `tool` depends on every earlier call to `depends_on` in the same plan,
/// unless its arguments carry a non-empty `unless_argument`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRuleConfig {
    pub tool: String,
    pub depends_on: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless_argument: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Priority: env vars > config file > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
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

    /// Apply `RAGLOOM_*` overrides. `lookup` resolves a variable name to its value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RAGLOOM_PARALLEL_TOOLS") {
            self.orchestrator.parallel_execution = parse_env("RAGLOOM_PARALLEL_TOOLS", &v)?;
        }
        if let Some(v) = lookup("RAGLOOM_MAX_TOOL_RETRIES") {
            self.orchestrator.max_tool_retries = parse_env("RAGLOOM_MAX_TOOL_RETRIES", &v)?;
        }
        if let Some(v) = lookup("RAGLOOM_MAX_WORKERS") {
            self.orchestrator.max_workers = parse_env("RAGLOOM_MAX_WORKERS", &v)?;
        }
        if let Some(v) = lookup("RAGLOOM_TOKEN_BUDGET") {
            self.context.total_tokens = parse_env("RAGLOOM_TOKEN_BUDGET", &v)?;
        }
        if let Some(v) = lookup("RAGLOOM_RESERVED_OUTPUT_TOKENS") {
            self.context.reserved_output_tokens = parse_env("RAGLOOM_RESERVED_OUTPUT_TOKENS", &v)?;
        }
        if let Some(v) = lookup("RAGLOOM_RESERVED_SYSTEM_TOKENS") {
            self.context.reserved_system_tokens = parse_env("RAGLOOM_RESERVED_SYSTEM_TOKENS", &v)?;
        }
        if let Some(v) = lookup("RAGLOOM_USE_TOKEN_AWARE_CONTEXT") {
            self.context.token_aware = parse_env("RAGLOOM_USE_TOKEN_AWARE_CONTEXT", &v)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragloom")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.max_workers == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_workers must be at least 1".into(),
            ));
        }

        if self.orchestrator.node_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.node_timeout_ms must be > 0".into(),
            ));
        }

        if self.orchestrator.retry_backoff.multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.retry_backoff.multiplier must be >= 1.0".into(),
            ));
        }

        if self.context.chars_per_token <= 0.0 {
            return Err(ConfigError::ValidationError(
                "context.chars_per_token must be > 0".into(),
            ));
        }

        let reserved = self
            .context
            .reserved_output_tokens
            .checked_add(self.context.reserved_system_tokens)
            .ok_or_else(|| {
                ConfigError::ValidationError(
                    "context reserved output + system tokens overflow".into(),
                )
            })?;
        if reserved >= self.context.total_tokens {
            return Err(ConfigError::ValidationError(format!(
                "context.total_tokens ({}) must exceed reserved output + system tokens ({})",
                self.context.total_tokens, reserved
            )));
        }

        for rule in &self.dependency_rules {
            if rule.tool == rule.depends_on {
                return Err(ConfigError::ValidationError(format!(
                    "dependency rule for '{}' depends on itself",
                    rule.tool
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has an invalid value: {value}")))
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
