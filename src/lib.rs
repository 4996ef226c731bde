//! Helpdesk Controller - Customer-Support Chat Backend

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;

// Re-export for convenience
pub use services::cache_service::CacheService;
pub use services::faq_retrieval::FaqRetrievalService;
pub use services::llm_client::LlmClient;
pub use services::prompt_builder::PromptBuilder;

// Re-export main types for convenience
pub use crate::api::dto::*;
pub use crate::api::routes::{create_router, AppState};
pub use crate::config::Config;
pub use crate::error::ServiceError;
pub use crate::models::internal::{
    Conversation, FaqEntry, Message, MessageRole, NewMessage, PromptSegment,
};
pub use crate::orchestrator::{ChatOrchestrator, TurnOutcome, TurnRequest};
pub use crate::storage::cache::{CacheStore, InMemoryCacheStore};
pub use crate::storage::db::init_db;
pub use crate::storage::repository::{ConversationRepository, FaqRepository, SeaOrmRepository};
