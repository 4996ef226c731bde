use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use helpdesk_controller::{
    api::routes::{self, AppState},
    config::Config,
    orchestrator::ChatOrchestrator,
    services::{
        cache_service::CacheService, faq_retrieval::FaqRetrievalService, llm_client::LlmClient,
        prompt_builder::PromptBuilder,
    },
    storage::{self, cache::InMemoryCacheStore, repository::SeaOrmRepository},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helpdesk_controller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let config = Arc::new(Config::load()?);

    // Initialize database and repository
    let db = storage::init_db(&config.database_url).await?;
    let repo = Arc::new(SeaOrmRepository::new(db));

    // Cache: in-process TTL store behind the CacheStore seam
    let cache_store = Arc::new(InMemoryCacheStore::new());
    let cache = Arc::new(CacheService::new(
        cache_store.clone(),
        Duration::from_secs(config.history_cache_ttl_secs),
        Duration::from_secs(config.faq_cache_ttl_secs),
    ));

    // Periodically evict expired cache entries
    {
        let store = cache_store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                store.cleanup_expired().await;
            }
        });
    }

    // Completion API client
    let llm = Arc::new(LlmClient::from_config(&config));

    // Verify completion API health on startup
    if llm.health_check().await {
        tracing::info!("Completion API reachable");
    } else {
        tracing::warn!("Completion API not reachable; chat turns will fail until it recovers");
    }

    // FAQ retrieval on top of the same repository
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

    // Create application state
    let state = AppState {
        config: config.clone(),
        orchestrator,
        faqs,
        repo: repo.clone(),
        cache,
        started_at: Instant::now(),
    };

    let app = routes::create_router(state);

    // Start server
    let addr_str = format!("127.0.0.1:{}", config.server_port);
    let addr: SocketAddr = addr_str.parse().expect("Invalid address");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Completion API: {} ({})", config.llm_api_url, config.llm_model);
    tracing::info!("Chat endpoint: POST /api/v1/chat/message");

    axum::serve(listener, app).await?;

    Ok(())
}
