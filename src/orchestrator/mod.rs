//! Conversation orchestrator: coordinates retrieval, prompt assembly,
//! persistence and cache invalidation for a single chat turn.

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::internal::{Conversation, Message, MessageRole, NewMessage};
use crate::services::cache_service::CacheService;
use crate::services::faq_retrieval::FaqRetrievalService;
use crate::services::llm_client::LlmClient;
use crate::services::prompt_builder::PromptBuilder;
use crate::storage::repository::ConversationRepository;

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: Option<String>,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: String,
    pub message: Message,
    pub conversation_created: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationHistory {
    pub conversation: Conversation,
    pub message_count: u64,
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub next_cursor: Option<Uuid>,
}

pub struct ChatOrchestrator {
    repo: Arc<dyn ConversationRepository>,
    faqs: Arc<FaqRetrievalService>,
    cache: Arc<CacheService>,
    prompt_builder: PromptBuilder,
    llm: Arc<LlmClient>,
    history_limit: u64,
}

impl ChatOrchestrator {
    pub fn new(
        repo: Arc<dyn ConversationRepository>,
        faqs: Arc<FaqRetrievalService>,
        cache: Arc<CacheService>,
        prompt_builder: PromptBuilder,
        llm: Arc<LlmClient>,
        history_limit: u64,
    ) -> Self {
        Self {
            repo,
            faqs,
            cache,
            prompt_builder,
            llm,
            history_limit,
        }
    }

    /// Handle one chat turn. A failure before the completion call aborts
    /// the turn with at most the user message written; a completion failure
    /// leaves the user message durably persisted without an assistant reply,
    /// so the caller can resend.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnOutcome, ServiceError> {
        let started = Instant::now();
        let session_id = request
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let (conversation, created) = self
            .repo
            .get_or_create(&session_id, request.metadata.unwrap_or_else(|| json!({})))
            .await?;

        self.repo
            .append_message(NewMessage {
                conversation_id: conversation.id,
                role: MessageRole::User,
                content: request.message.clone(),
                tokens_used: None,
                metadata: json!({}),
            })
            .await?;

        let history = match self.cache.cached_history(conversation.id).await {
            Some(history) => history,
            None => {
                let history = self
                    .repo
                    .find_recent_messages(conversation.id, self.history_limit)
                    .await?;
                if !history.is_empty() {
                    self.cache.cache_history(conversation.id, &history).await;
                }
                history
            }
        };

        let faqs = self.faqs.retrieve_relevant(&request.message).await;

        let prompt = self.prompt_builder.build(&request.message, &faqs, &history);

        let completion = self.llm.generate(&prompt).await?;

        let assistant_message = self
            .repo
            .append_message(NewMessage {
                conversation_id: conversation.id,
                role: MessageRole::Assistant,
                content: completion.content,
                tokens_used: Some(completion.tokens_used as i32),
                metadata: json!({
                    "model": self.llm.model(),
                    "faqs_used": faqs.len(),
                    "latency_ms": started.elapsed().as_millis() as u64,
                }),
            })
            .await?;

        self.cache.invalidate_history(conversation.id).await;

        tracing::info!(
            session_id,
            conversation_id = %conversation.id,
            user_message_length = request.message.len(),
            response_length = assistant_message.content.len(),
            tokens_used = assistant_message.tokens_used,
            latency_ms = started.elapsed().as_millis() as u64,
            faqs_retrieved = faqs.len(),
            conversation_created = created,
            "Message handled successfully"
        );

        Ok(TurnOutcome {
            session_id: conversation.session_id,
            message: assistant_message,
            conversation_created: created,
        })
    }

    /// Cursor-paginated history for a session, newest page first. Fetches
    /// one row beyond `limit` to learn whether an older page exists; the
    /// cursor is the oldest returned message.
    pub async fn get_history(
        &self,
        session_id: &str,
        limit: u64,
        before: Option<Uuid>,
    ) -> Result<ConversationHistory, ServiceError> {
        let conversation = self.find_conversation(session_id).await?;

        let message_count = self.repo.count_messages(conversation.id).await?;

        let mut messages = self
            .repo
            .find_messages_before(conversation.id, before, limit + 1)
            .await?;

        let has_more = messages.len() as u64 > limit;
        if has_more {
            // Chronological page: the surplus row is the oldest one.
            messages.remove(0);
        }
        let next_cursor = if has_more {
            messages.first().map(|m| m.id)
        } else {
            None
        };

        Ok(ConversationHistory {
            conversation,
            message_count,
            messages,
            has_more,
            next_cursor,
        })
    }

    pub async fn get_conversation(&self, session_id: &str) -> Result<Conversation, ServiceError> {
        self.find_conversation(session_id).await
    }

    pub async fn delete_conversation(&self, session_id: &str) -> Result<(), ServiceError> {
        let conversation = self.find_conversation(session_id).await?;

        self.repo.delete_conversation(conversation.id).await?;
        self.cache.invalidate_history(conversation.id).await;

        tracing::info!(session_id, conversation_id = %conversation.id, "Conversation deleted");
        Ok(())
    }

    async fn find_conversation(&self, session_id: &str) -> Result<Conversation, ServiceError> {
        self.repo
            .find_by_session_id(session_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                resource: "Conversation",
                identifier: session_id.to_string(),
            })
    }
}
