use serde::Deserialize;
use validator::Validate;

/// Main configuration for Helpdesk Controller
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct Config {
    /// HTTP server port
    #[validate(range(min = 1024, max = 65535))]
    pub server_port: u16,

    /// Whether permissive CORS headers are emitted
    pub cors_enabled: bool,

    /// Database URL (SeaORM / SQLite)
    pub database_url: String,

    /// Maximum database connections
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,

    /// Chat-completion API base URL (OpenRouter-compatible)
    pub llm_api_url: String,

    /// Chat-completion API key
    #[validate(length(min = 1))]
    pub llm_api_key: String,

    /// Model requested from the completion API
    pub llm_model: String,

    /// max_tokens parameter sent with each completion request
    #[validate(range(min = 1))]
    pub llm_max_tokens: u32,

    /// Sampling temperature for completions
    #[validate(range(min = 0.0, max = 2.0))]
    pub llm_temperature: f32,

    /// Per-call timeout for the completion API, in milliseconds
    #[validate(range(min = 100))]
    pub llm_timeout_ms: u64,

    /// Maximum completion attempts (first call included)
    #[validate(range(min = 1, max = 10))]
    pub llm_max_retries: u32,

    /// Maximum FAQ entries retrieved per user message
    #[validate(range(min = 1, max = 50))]
    pub faq_max_results: u32,

    /// TTL for cached FAQ search results, in seconds
    pub faq_cache_ttl_secs: u64,

    /// TTL for cached conversation history, in seconds
    pub history_cache_ttl_secs: u64,

    /// Messages loaded as prompt context per turn
    #[validate(range(min = 1, max = 100))]
    pub history_limit: u32,

    /// Maximum accepted user-message length, in characters
    #[validate(range(min = 1))]
    pub max_message_length: usize,

    /// Per-IP request budget for chat routes, per minute
    #[validate(range(min = 1))]
    pub rate_limit_per_minute: u32,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            // Core defaults
            .set_default("server_port", 8080)?
            .set_default("cors_enabled", true)?
            .set_default("database_url", "sqlite://helpdesk.db")?
            .set_default("max_connections", 10)?
            .set_default("log_level", "info")?
            // Completion API defaults
            .set_default("llm_api_url", "https://openrouter.ai/api/v1")?
            .set_default("llm_model", "meta-llama/llama-3.1-8b-instruct:free")?
            .set_default("llm_max_tokens", 300)?
            .set_default("llm_temperature", 0.7)?
            .set_default("llm_timeout_ms", 30_000)?
            .set_default("llm_max_retries", 3)?
            // Retrieval and cache defaults
            .set_default("faq_max_results", 5)?
            .set_default("faq_cache_ttl_secs", 3600)?
            .set_default("history_cache_ttl_secs", 300)?
            .set_default("history_limit", 10)?
            .set_default("max_message_length", 2000)?
            .set_default("rate_limit_per_minute", 20)?
            // Load from ~/.helpdesk/config.toml (if present)
            .add_source(
                config::File::with_name(&format!(
                    "{}/.helpdesk/config",
                    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
                ))
                .required(false),
            )
            // Environment overrides: HELPDESK__SERVER_PORT, HELPDESK__LLM_API_KEY, etc.
            .add_source(config::Environment::with_prefix("HELPDESK").separator("__"))
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }
}
