use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (`warden.toml` + `WARDEN_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WardenConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub ratelimit: RatelimitConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub subagents: SubagentsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub credential: CredentialConfig,
}

/// Process-level options: data directory, log level, which channels to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "bool_true")]
    pub telegram_enabled: bool,
    #[serde(default)]
    pub cli_enabled: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            telegram_enabled: true,
            cli_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// `provider.*` — active chat/embedding backend selection and per-backend
/// credential sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_active_model")]
    pub active_model: String,
    #[serde(default = "default_active_embedding")]
    pub active_embedding: String,
    /// Model ids usable for embeddings, keyed by backend name.
    #[serde(default)]
    pub embedding_models: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub anthropic: Option<AnthropicConfig>,
    #[serde(default)]
    pub openai: Option<OpenAiConfig>,
    #[serde(default)]
    pub ollama: Option<OllamaConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            active_model: default_active_model(),
            active_embedding: default_active_embedding(),
            embedding_models: Default::default(),
            anthropic: None,
            openai: None,
            ollama: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

/// `telegram.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    /// `allowlist` gates unregistered groups; `open` admits anyone.
    #[serde(default = "default_group_policy")]
    pub group_policy: String,
    /// Whether the bot responds to private DMs at all.
    #[serde(default = "bool_true")]
    pub dm_allowed: bool,
    #[serde(default)]
    pub require_mention: bool,
    #[serde(default = "default_bot_trigger_name")]
    pub bot_trigger_name: String,
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,
    /// Usernames/ids allowed to talk to the bot in DMs. `"*"` allows everyone.
    #[serde(default)]
    pub allow_users: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            group_policy: default_group_policy(),
            dm_allowed: true,
            require_mention: false,
            bot_trigger_name: default_bot_trigger_name(),
            max_attachment_bytes: default_max_attachment_bytes(),
            allow_users: Vec::new(),
        }
    }
}

/// `ratelimit.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatelimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "bool_true")]
    pub owner_exempt: bool,
}

impl Default for RatelimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
            owner_exempt: true,
        }
    }
}

/// `session.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default)]
    pub thinking_budget: Option<u32>,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u32,
    #[serde(default = "default_keep_recent")]
    pub compaction_keep_recent: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            thinking_budget: None,
            max_context_tokens: default_max_context_tokens(),
            compaction_keep_recent: default_keep_recent(),
        }
    }
}

/// `subagents.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentsConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    #[serde(default = "default_subagent_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_subagent_max_rounds")]
    pub max_tool_rounds: u32,
}

impl Default for SubagentsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: default_max_concurrent(),
            timeout_seconds: default_subagent_timeout(),
            max_tool_rounds: default_subagent_max_rounds(),
        }
    }
}

/// `memory.*`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub auto_capture: bool,
    #[serde(default = "default_evaluator_driver")]
    pub evaluator_driver: String,
    #[serde(default)]
    pub evaluator_model: Option<String>,
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            auto_capture: false,
            evaluator_driver: default_evaluator_driver(),
            evaluator_model: None,
            recall_limit: default_recall_limit(),
        }
    }
}

/// `credential.*` — opaque strings, interpreted by the provider adapters
/// (file paths, OAuth profile names, etc).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialConfig {
    #[serde(flatten)]
    pub values: std::collections::HashMap<String, String>,
}

fn bool_true() -> bool {
    true
}
fn default_data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.warden", home)
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.warden/warden.db", home)
}
fn default_active_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_active_embedding() -> String {
    "voyage-3".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_group_policy() -> String {
    "allowlist".to_string()
}
fn default_bot_trigger_name() -> String {
    "warden".to_string()
}
fn default_max_attachment_bytes() -> usize {
    20 * 1024 * 1024
}
fn default_max_requests() -> u32 {
    4
}
fn default_window_seconds() -> u64 {
    60
}
fn default_max_tool_rounds() -> u32 {
    100
}
fn default_max_context_tokens() -> u32 {
    128_000
}
fn default_keep_recent() -> u32 {
    20
}
fn default_max_concurrent() -> u32 {
    2
}
fn default_subagent_timeout() -> u64 {
    900
}
fn default_subagent_max_rounds() -> u32 {
    25
}
fn default_evaluator_driver() -> String {
    "provider".to_string()
}
fn default_recall_limit() -> usize {
    5
}

impl WardenConfig {
    /// Load config from a TOML file with `WARDEN_*` env var overrides.
    ///
    /// Checks, in order: explicit path argument, then `~/.warden/warden.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: WardenConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("WARDEN_").split("_"))
            .extract()
            .map_err(|e| crate::error::WardenError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.warden/warden.toml", home)
}
