use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::internal::{FaqEntry, Message};
use crate::orchestrator::{ConversationHistory, TurnOutcome};

// ==================== REQUEST DTOs ====================

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRequest {
    pub session_id: Option<String>,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HistoryQuery {
    pub limit: Option<u64>,
    pub before: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FaqListQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateFaqRequest {
    pub question: String,
    pub answer: String,
    pub category: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct UpdateFaqRequest {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub category: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

// ==================== RESPONSE DTOs ====================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl From<&Message> for MessageDto {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id,
            role: msg.role.to_string(),
            content: msg.content.clone(),
            created_at: msg.created_at.and_utc().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageResponse {
    pub session_id: String,
    pub message: MessageDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_created: Option<bool>,
}

impl From<&TurnOutcome> for ChatMessageResponse {
    fn from(outcome: &TurnOutcome) -> Self {
        Self {
            session_id: outcome.session_id.clone(),
            message: MessageDto::from(&outcome.message),
            conversation_created: outcome.conversation_created.then_some(true),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: Uuid,
    pub session_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginationDto {
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub conversation: ConversationDto,
    pub messages: Vec<MessageDto>,
    pub pagination: PaginationDto,
}

impl From<&ConversationHistory> for HistoryResponse {
    fn from(history: &ConversationHistory) -> Self {
        Self {
            conversation: ConversationDto {
                id: history.conversation.id,
                session_id: history.conversation.session_id.clone(),
                created_at: history.conversation.created_at.and_utc().to_rfc3339(),
                updated_at: history.conversation.updated_at.and_utc().to_rfc3339(),
                message_count: history.message_count,
            },
            messages: history.messages.iter().map(MessageDto::from).collect(),
            pagination: PaginationDto {
                has_more: history.has_more,
                next_cursor: history.next_cursor,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FaqResponse {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    pub category: Option<String>,
    pub keywords: Vec<String>,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: String,
}

impl From<&FaqEntry> for FaqResponse {
    fn from(faq: &FaqEntry) -> Self {
        Self {
            id: faq.id,
            question: faq.question.clone(),
            answer: faq.answer.clone(),
            category: faq.category.clone(),
            keywords: faq.keywords.clone(),
            priority: faq.priority,
            is_active: faq.is_active,
            created_at: faq.created_at.and_utc().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub services: ServiceHealth,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceHealth {
    pub database: String,
    pub cache: String,
    pub llm: String,
}
