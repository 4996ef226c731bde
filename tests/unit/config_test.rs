use helpdesk_controller::config::Config;
use validator::Validate;

fn valid_config() -> Config {
    Config {
        server_port: 8080,
        cors_enabled: true,
        database_url: "sqlite::memory:".to_string(),
        max_connections: 10,
        llm_api_url: "https://openrouter.ai/api/v1".to_string(),
        llm_api_key: "test-key".to_string(),
        llm_model: "meta-llama/llama-3.1-8b-instruct:free".to_string(),
        llm_max_tokens: 300,
        llm_temperature: 0.7,
        llm_timeout_ms: 30_000,
        llm_max_retries: 3,
        faq_max_results: 5,
        faq_cache_ttl_secs: 3600,
        history_cache_ttl_secs: 300,
        history_limit: 10,
        max_message_length: 2000,
        rate_limit_per_minute: 20,
        log_level: "info".to_string(),
    }
}

#[test]
fn test_valid_config_passes_validation() {
    assert!(valid_config().validate().is_ok());
}

#[test]
fn test_privileged_port_rejected() {
    let mut config = valid_config();
    config.server_port = 80;
    assert!(config.validate().is_err());
}

#[test]
fn test_empty_api_key_rejected() {
    let mut config = valid_config();
    config.llm_api_key = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_temperature_out_of_range_rejected() {
    let mut config = valid_config();
    config.llm_temperature = 2.5;
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_retries_rejected() {
    let mut config = valid_config();
    config.llm_max_retries = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_history_limit_bounds() {
    let mut config = valid_config();
    config.history_limit = 100;
    assert!(config.validate().is_ok());

    config.history_limit = 101;
    assert!(config.validate().is_err());
}
