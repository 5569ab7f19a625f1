//! Configuration loading, validation, and management for recall.
//!
//! Loads configuration from `~/.recall/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.recall/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallConfig {
    /// LLM endpoint used by the compression strategies and the chat command
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Where archive, working memory, and the task queue live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Partition sizes and compression thresholds
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Per-conversation worker behavior
    #[serde(default)]
    pub queue: QueueConfig,

    /// Session registry housekeeping
    #[serde(default)]
    pub session: SessionConfig,

    /// Strategy selection and prompt overrides
    #[serde(default)]
    pub compression: CompressionConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Temperature for chat replies
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Temperature for compression calls (summaries, judgments)
    #[serde(default = "default_compression_temperature")]
    pub compression_temperature: f32,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_compression_temperature() -> f32 {
    0.2
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            compression_temperature: default_compression_temperature(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("compression_temperature", &self.compression_temperature)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory", "file", or "sqlite"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database file (sqlite) or directory (file). Defaults under the config dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

impl StorageConfig {
    /// The configured path, or the backend's default location.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None if self.backend == "file" => RecallConfig::config_dir().join("data"),
            None => RecallConfig::config_dir().join("recall.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Exchanges frozen at the start of the conversation
    #[serde(default = "default_head_size")]
    pub head_size: usize,

    /// Most recent exchanges kept verbatim
    #[serde(default = "default_tail_size")]
    pub tail_size: usize,

    /// Days an untouched working memory survives (0 = forever)
    #[serde(default = "default_expire_days")]
    pub expire_days: u32,

    #[serde(default = "default_max_pin_count")]
    pub max_pin_count: usize,

    #[serde(default = "default_max_pin_tokens")]
    pub max_pin_tokens: usize,

    /// Rolling window message count that triggers history summarization
    #[serde(default = "default_window_max_size")]
    pub window_max_size: usize,

    /// Rolling window token estimate that triggers history summarization
    #[serde(default = "default_window_token_threshold")]
    pub window_token_threshold: usize,

    /// Evicted exchanges above this estimate are summarized before demotion
    #[serde(default = "default_current_round_token_threshold")]
    pub current_round_token_threshold: usize,
}

fn default_head_size() -> usize {
    1
}
fn default_tail_size() -> usize {
    2
}
fn default_expire_days() -> u32 {
    7
}
fn default_max_pin_count() -> usize {
    10
}
fn default_max_pin_tokens() -> usize {
    300
}
fn default_window_max_size() -> usize {
    5
}
fn default_window_token_threshold() -> usize {
    3000
}
fn default_current_round_token_threshold() -> usize {
    1000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            head_size: default_head_size(),
            tail_size: default_tail_size(),
            expire_days: default_expire_days(),
            max_pin_count: default_max_pin_count(),
            max_pin_tokens: default_max_pin_tokens(),
            window_max_size: default_window_max_size(),
            window_token_threshold: default_window_token_threshold(),
            current_round_token_threshold: default_current_round_token_threshold(),
        }
    }
}

impl MemoryConfig {
    pub fn expiry(&self) -> Option<Duration> {
        match self.expire_days {
            0 => None,
            days => Some(Duration::from_secs(u64::from(days) * 24 * 60 * 60)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How long a worker blocks on an empty queue per poll
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Consecutive empty polls (or failures) before a worker exits
    #[serde(default = "default_max_idle_loops")]
    pub max_idle_loops: u32,

    /// Pause after a failed poll or task
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
}

fn default_poll_timeout_secs() -> u64 {
    10
}
fn default_max_idle_loops() -> u32 {
    6
}
fn default_error_backoff_secs() -> u64 {
    5
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: default_poll_timeout_secs(),
            max_idle_loops: default_max_idle_loops(),
            error_backoff_secs: default_error_backoff_secs(),
        }
    }
}

impl QueueConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How often the reaper sweeps the session registry
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,

    /// Sessions untouched for this long are dropped from the registry
    #[serde(default = "default_max_inactive_minutes")]
    pub max_inactive_minutes: u64,
}

fn default_cleanup_interval_minutes() -> u64 {
    10
}
fn default_max_inactive_minutes() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
            max_inactive_minutes: default_max_inactive_minutes(),
        }
    }
}

impl SessionConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_minutes * 60)
    }

    pub fn max_inactive(&self) -> Duration {
        Duration::from_secs(self.max_inactive_minutes * 60)
    }
}

/// The four compression strategies, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    PinJudgment,
    CurrentRoundSummarization,
    HistorySummarization,
    PinAggregation,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::PinJudgment,
        StrategyKind::CurrentRoundSummarization,
        StrategyKind::HistorySummarization,
        StrategyKind::PinAggregation,
    ];

    /// Position in the fixed pipeline order, starting at 1.
    pub fn order(&self) -> u8 {
        match self {
            StrategyKind::PinJudgment => 1,
            StrategyKind::CurrentRoundSummarization => 2,
            StrategyKind::HistorySummarization => 3,
            StrategyKind::PinAggregation => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::PinJudgment => "pin_judgment",
            StrategyKind::CurrentRoundSummarization => "current_round_summarization",
            StrategyKind::HistorySummarization => "history_summarization",
            StrategyKind::PinAggregation => "pin_aggregation",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custom system prompts. Unset or blank entries use the built-in prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_judgment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_round_summarization: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_summarization: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_aggregation: Option<String>,
}

impl PromptOverrides {
    /// The non-blank override for a strategy, if any.
    pub fn get(&self, kind: StrategyKind) -> Option<&str> {
        let custom = match kind {
            StrategyKind::PinJudgment => &self.pin_judgment,
            StrategyKind::CurrentRoundSummarization => &self.current_round_summarization,
            StrategyKind::HistorySummarization => &self.history_summarization,
            StrategyKind::PinAggregation => &self.pin_aggregation,
        };
        custom.as_deref().filter(|p| !p.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,

    #[serde(default)]
    pub prompts: PromptOverrides,
}

fn default_strategies() -> Vec<StrategyKind> {
    StrategyKind::ALL.to_vec()
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            prompts: PromptOverrides::default(),
        }
    }
}

impl CompressionConfig {
    pub fn is_enabled(&self, kind: StrategyKind) -> bool {
        self.strategies.contains(&kind)
    }
}

impl RecallConfig {
    /// Load configuration from the default path (~/.recall/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `RECALL_API_KEY`, falling back to `OPENAI_API_KEY`
    /// - `RECALL_API_URL`
    /// - `RECALL_MODEL`
    /// - `RECALL_DATABASE`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env();
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

    fn apply_env(&mut self) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("RECALL_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("RECALL_API_URL") {
            self.provider.api_url = url;
        }

        if let Ok(model) = std::env::var("RECALL_MODEL") {
            self.provider.model = model;
        }

        if let Ok(path) = std::env::var("RECALL_DATABASE") {
            self.storage.path = Some(PathBuf::from(path));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".recall")
    }

    /// The default config file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature)
            || !(0.0..=2.0).contains(&self.provider.compression_temperature)
        {
            return Err(ConfigError::ValidationError(
                "provider temperatures must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.storage.backend.as_str(), "memory" | "file" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage backend '{}' (expected memory, file, or sqlite)",
                self.storage.backend
            )));
        }

        if self.memory.tail_size == 0 {
            return Err(ConfigError::ValidationError("memory.tail_size must be > 0".into()));
        }

        if self.memory.window_max_size == 0 || self.memory.max_pin_count == 0 {
            return Err(ConfigError::ValidationError(
                "memory.window_max_size and memory.max_pin_count must be > 0".into(),
            ));
        }

        if self.queue.poll_timeout_secs == 0 || self.queue.max_idle_loops == 0 {
            return Err(ConfigError::ValidationError(
                "queue.poll_timeout_secs and queue.max_idle_loops must be > 0".into(),
            ));
        }

        if self.session.cleanup_interval_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "session.cleanup_interval_minutes must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config --default` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
