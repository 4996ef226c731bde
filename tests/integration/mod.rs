// tests/integration/mod.rs

pub use serde_json::json;
pub use std::sync::Arc;
pub use uuid::Uuid;

use axum::Router;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helpdesk_controller::{
    api::routes::{create_router, AppState},
    config::Config,
    orchestrator::ChatOrchestrator,
    services::{
        cache_service::CacheService, faq_retrieval::FaqRetrievalService,
        llm_client::{LlmClient, RetryPolicy}, prompt_builder::PromptBuilder,
    },
    storage::{cache::InMemoryCacheStore, init_db, repository::SeaOrmRepository},
};

pub mod orchestrator;
pub mod repository;

// ============================================
// Shared Test Helpers
// ============================================

pub fn test_config(llm_url: &str, rate_limit_per_minute: u32) -> Config {
    Config {
        server_port: 8080,
        cors_enabled: true,
        database_url: "sqlite::memory:".to_string(),
        max_connections: 10,
        llm_api_url: llm_url.to_string(),
        llm_api_key: "test-key".to_string(),
        llm_model: "test-model".to_string(),
        llm_max_tokens: 300,
        llm_temperature: 0.7,
        llm_timeout_ms: 5_000,
        llm_max_retries: 3,
        faq_max_results: 5,
        faq_cache_ttl_secs: 3600,
        history_cache_ttl_secs: 300,
        history_limit: 10,
        max_message_length: 2000,
        rate_limit_per_minute,
        log_level: "info".to_string(),
    }
}

/// Everything a test needs, plus the TempDir keeping the SQLite file alive.
pub struct TestContext {
    pub state: AppState,
    pub repo: Arc<SeaOrmRepository>,
    pub cache: Arc<CacheService>,
    _tmp: TempDir,
}

impl TestContext {
    pub fn orchestrator(&self) -> &ChatOrchestrator {
        &self.state.orchestrator
    }

    pub fn app(&self) -> Router {
        create_router(self.state.clone())
    }
}

pub async fn test_context(llm_url: &str) -> TestContext {
    test_context_with_rate_limit(llm_url, 1000).await
}

pub async fn test_context_with_rate_limit(llm_url: &str, rate_limit: u32) -> TestContext {
    let tmp = TempDir::new().unwrap();
    let db_url = format!("sqlite://{}", tmp.path().join("test.db").display());
    let db = init_db(&db_url).await.unwrap();

    let config = Arc::new(test_config(llm_url, rate_limit));
    let repo = Arc::new(SeaOrmRepository::new(db));

    let cache = Arc::new(CacheService::new(
        Arc::new(InMemoryCacheStore::new()),
        Duration::from_secs(config.history_cache_ttl_secs),
        Duration::from_secs(config.faq_cache_ttl_secs),
    ));

    let llm = Arc::new(
        LlmClient::from_config(&config).with_policy(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        }),
    );

    let faqs = Arc::new(FaqRetrievalService::new(
        repo.clone(),
        cache.clone(),
        config.faq_max_results as u64,
    ));

    let orchestrator = Arc::new(ChatOrchestrator::new(
        repo.clone(),
        faqs.clone(),
        cache.clone(),
        PromptBuilder::new(config.faq_max_results as usize),
        llm,
        config.history_limit as u64,
    ));

    let state = AppState {
        config,
        orchestrator,
        faqs,
        repo: repo.clone(),
        cache: cache.clone(),
        started_at: Instant::now(),
    };

    TestContext {
        state,
        repo,
        cache,
        _tmp: tmp,
    }
}

/// Mount a chat-completion mock answering every request with `content`.
pub async fn mount_completion(server: &MockServer, content: &str, tokens: u32) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "total_tokens": tokens }
        })))
        .mount(server)
        .await;
}
