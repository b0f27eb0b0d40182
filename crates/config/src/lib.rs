//! Configuration loading, validation, and management for docchat.
//!
//! Loads configuration from `~/.docchat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.docchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the default provider (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Models used by each step of a turn
    #[serde(default)]
    pub models: ModelsConfig,

    /// Turn orchestration limits and windows
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Web search adapter
    #[serde(default)]
    pub search: SearchConfig,

    /// Web scrape adapter
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Document retrieval and chunking
    #[serde(default)]
    pub documents: DocumentsConfig,

    /// Session and document persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "groq".into()
}

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
            .field("default_provider", &self.default_provider)
            .field("models", &self.models)
            .field("orchestration", &self.orchestration)
            .field("search", &self.search)
            .field("scrape", &self.scrape)
            .field("documents", &self.documents)
            .field("storage", &self.storage)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Chat answers and routing use `chat_model`; tool selection and
/// reflection use `tool_model`; the running summary uses `summary_model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,

    #[serde(default = "default_chat_model")]
    pub tool_model: String,

    #[serde(default)]
    pub tool_temperature: f32,

    #[serde(default = "default_summary_model")]
    pub summary_model: String,

    #[serde(default)]
    pub summary_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_chat_model() -> String {
    "llama-3.3-70b-versatile".into()
}
fn default_summary_model() -> String {
    "llama-3.1-8b-instant".into()
}
fn default_chat_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            chat_temperature: default_chat_temperature(),
            tool_model: default_chat_model(),
            tool_temperature: 0.0,
            summary_model: default_summary_model(),
            summary_temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Tool-dispatch steps allowed per turn
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// Recent messages the router classifies
    #[serde(default = "default_router_window")]
    pub router_window: usize,

    /// Recent messages the responder sees
    #[serde(default = "default_response_window")]
    pub response_window: usize,

    #[serde(default = "default_summary_word_limit")]
    pub summary_word_limit: usize,

    /// Seconds between keep-alive events on streaming turns
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Buffered events per streaming turn
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_tool_iterations() -> u32 {
    3
}
fn default_router_window() -> usize {
    3
}
fn default_response_window() -> usize {
    5
}
fn default_summary_word_limit() -> usize {
    300
}
fn default_heartbeat_interval() -> u64 {
    15
}
fn default_event_buffer() -> usize {
    128
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            router_window: default_router_window(),
            response_window: default_response_window(),
            summary_word_limit: default_summary_word_limit(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_url")]
    pub api_url: String,

    #[serde(default = "default_search_max_results")]
    pub max_results: usize,

    /// Hits scoring below this are dropped
    #[serde(default = "default_search_min_score")]
    pub min_score: f32,

    /// Formatted output is truncated to this many characters
    #[serde(default = "default_search_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_search_depth")]
    pub search_depth: String,
}

fn default_search_url() -> String {
    "https://api.tavily.com".into()
}
fn default_search_max_results() -> usize {
    3
}
fn default_search_min_score() -> f32 {
    0.3
}
fn default_search_max_chars() -> usize {
    7000
}
fn default_search_depth() -> String {
    "basic".into()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_search_url(),
            max_results: default_search_max_results(),
            min_score: default_search_min_score(),
            max_chars: default_search_max_chars(),
            search_depth: default_search_depth(),
        }
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("max_results", &self.max_results)
            .field("min_score", &self.min_score)
            .field("max_chars", &self.max_chars)
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_scrape_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_http_timeout() -> u64 {
    30
}
fn default_scrape_max_chars() -> usize {
    6000
}
fn default_user_agent() -> String {
    concat!("docchat/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            max_chars: default_scrape_max_chars(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    /// Chunks fetched per document search
    #[serde(default = "default_documents_limit")]
    pub limit: usize,

    #[serde(default = "default_documents_min_score")]
    pub min_score: f32,

    /// Characters per ingested chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_documents_limit() -> usize {
    6
}
fn default_documents_min_score() -> f32 {
    0.4
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            limit: default_documents_limit(),
            min_score: default_documents_min_score(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "postgres"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_storage_backend() -> String {
    "memory".into()
}
fn default_max_connections() -> u32 {
    10
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("database_url", &redact(&self.database_url))
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// CORS origins; the Streamlit-style UI runs on 8501 by default
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:8501".into()]
}
fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: default_allowed_origins(),
            body_limit: default_body_limit(),
        }
    }
}

const STORAGE_BACKENDS: &[&str] = &["memory", "postgres"];

impl AppConfig {
    /// Load configuration from the default path (~/.docchat/config.toml).
    ///
    /// Environment variables override the file:
    /// - `DOCCHAT_API_KEY`, then `GROQ_API_KEY`, then `OPENAI_API_KEY`
    /// - `DOCCHAT_PROVIDER`, `DOCCHAT_MODEL`
    /// - `TAVILY_API_KEY`
    /// - `DATABASE_URL` or `POSTGRES_DB_URL`, `DOCCHAT_STORAGE_BACKEND`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::read_file(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("DOCCHAT_API_KEY")
                .or_else(|| lookup("GROQ_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("DOCCHAT_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("DOCCHAT_MODEL") {
            self.models.chat_model = model.clone();
            self.models.tool_model = model;
        }

        if let Some(key) = lookup("TAVILY_API_KEY") {
            self.search.api_key = Some(key);
        }

        if let Some(url) = lookup("DATABASE_URL").or_else(|| lookup("POSTGRES_DB_URL")) {
            self.storage.database_url = Some(url);
        }

        if let Some(backend) = lookup("DOCCHAT_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".docchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("models.chat_temperature", self.models.chat_temperature),
            ("models.tool_temperature", self.models.tool_temperature),
            ("models.summary_temperature", self.models.summary_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        let orch = &self.orchestration;
        if orch.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration.max_tool_iterations must be at least 1".into(),
            ));
        }
        if orch.router_window == 0 || orch.response_window == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration windows must be at least 1".into(),
            ));
        }
        if orch.heartbeat_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "orchestration.heartbeat_interval_secs must be > 0".into(),
            ));
        }

        if self.documents.chunk_size == 0 || self.documents.chunk_overlap >= self.documents.chunk_size {
            return Err(ConfigError::ValidationError(
                "documents.chunk_overlap must be smaller than a non-zero chunk_size".into(),
            ));
        }

        if !STORAGE_BACKENDS.contains(&self.storage.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "storage.backend must be one of {STORAGE_BACKENDS:?}, got '{}'",
                self.storage.backend
            )));
        }
        if self.storage.backend == "postgres" && self.storage.database_url.is_none() {
            return Err(ConfigError::ValidationError(
                "storage.backend = \"postgres\" requires storage.database_url or DATABASE_URL".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            models: ModelsConfig::default(),
            orchestration: OrchestrationConfig::default(),
            search: SearchConfig::default(),
            scrape: ScrapeConfig::default(),
            documents: DocumentsConfig::default(),
            storage: StorageConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
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
