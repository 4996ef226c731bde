use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    prelude::*, ConnectionTrait, DatabaseConnection, DbBackend, QueryOrder, QuerySelect, Set,
    Statement,
};
use serde_json::Value;
use uuid::Uuid;

use crate::models::internal::{
    Conversation, FaqEntry, FaqUpdate, Message, NewFaq, NewMessage,
};
use crate::storage::entities::{conversations, faqs, messages};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DbError(#[from] sea_orm::DbErr),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ============================================
// TRAIT DEFINITIONS - with Send + Sync bounds
// ============================================

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn ping(&self) -> Result<(), RepositoryError>;

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Returns the conversation for the session, creating it when absent.
    /// The bool is true when this call created the conversation.
    async fn get_or_create(
        &self,
        session_id: &str,
        metadata: Value,
    ) -> Result<(Conversation, bool), RepositoryError>;

    async fn append_message(&self, msg: NewMessage) -> Result<Message, RepositoryError>;

    /// Last `limit` messages for the conversation, in chronological order.
    async fn find_recent_messages(
        &self,
        conversation_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// Chronological page of messages older than the `before` cursor
    /// (all latest messages when no cursor). Unknown cursor yields an
    /// empty page rather than an error.
    async fn find_messages_before(
        &self,
        conversation_id: Uuid,
        before: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn count_messages(&self, conversation_id: Uuid) -> Result<u64, RepositoryError>;

    /// Sum of tokens_used across assistant messages in the conversation.
    async fn total_tokens_used(&self, conversation_id: Uuid) -> Result<i64, RepositoryError>;

    async fn count_conversations(&self) -> Result<u64, RepositoryError>;

    /// Deletes the conversation and its messages.
    async fn delete_conversation(&self, id: Uuid) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait FaqRepository: Send + Sync {
    async fn create_faq(&self, faq: NewFaq) -> Result<FaqEntry, RepositoryError>;
    async fn update_faq(&self, id: Uuid, update: FaqUpdate) -> Result<FaqEntry, RepositoryError>;
    async fn deactivate_faq(&self, id: Uuid) -> Result<(), RepositoryError>;
    async fn find_faq_by_id(&self, id: Uuid) -> Result<Option<FaqEntry>, RepositoryError>;

    async fn find_by_category(
        &self,
        category: &str,
        limit: u64,
    ) -> Result<Vec<FaqEntry>, RepositoryError>;

    async fn find_all_active(&self) -> Result<Vec<FaqEntry>, RepositoryError>;

    /// Active entries whose question+answer text matches the FTS query,
    /// paired with a relevance score (higher is better), ranked by
    /// relevance then priority.
    async fn search_full_text(
        &self,
        match_query: &str,
        limit: u64,
    ) -> Result<Vec<(FaqEntry, f32)>, RepositoryError>;

    /// Active entries whose keyword-tag set intersects `keywords`,
    /// ranked by priority then recency.
    async fn search_by_keywords(
        &self,
        keywords: &[String],
        limit: u64,
    ) -> Result<Vec<FaqEntry>, RepositoryError>;
}

// ============================================
// IMPLEMENTATION STRUCT
// ============================================

pub struct SeaOrmRepository {
    db: DatabaseConnection,
}

impl SeaOrmRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ============================================
// TRAIT IMPLEMENTATIONS
// ============================================

#[async_trait]
impl ConversationRepository for SeaOrmRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        self.db.ping().await?;
        Ok(())
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let model = conversations::Entity::find()
            .filter(conversations::Column::SessionId.eq(session_id))
            .one(&self.db)
            .await?;

        Ok(model.map(Conversation::from))
    }

    async fn get_or_create(
        &self,
        session_id: &str,
        metadata: Value,
    ) -> Result<(Conversation, bool), RepositoryError> {
        if let Some(existing) = self.find_by_session_id(session_id).await? {
            return Ok((existing, false));
        }

        let id = Uuid::new_v4();
        let now = chrono::Utc::now().naive_utc();

        let active = conversations::ActiveModel {
            id: Set(id.to_string()),
            session_id: Set(session_id.to_string()),
            user_identifier: Set(None),
            metadata: Set(metadata.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active.insert(&self.db).await?;
        tracing::info!(session_id, conversation_id = %id, "Created conversation");

        Ok((Conversation::from(model), true))
    }

    async fn append_message(&self, msg: NewMessage) -> Result<Message, RepositoryError> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now().naive_utc();

        let active = messages::ActiveModel {
            id: Set(id.to_string()),
            conversation_id: Set(msg.conversation_id.to_string()),
            role: Set(msg.role.to_string()),
            content: Set(msg.content),
            tokens_used: Set(msg.tokens_used),
            metadata: Set(msg.metadata.to_string()),
            created_at: Set(now),
        };

        let model = active.insert(&self.db).await?;
        tracing::debug!(
            conversation_id = %msg.conversation_id,
            role = %msg.role,
            message_id = %id,
            "Stored message"
        );

        Ok(Message::from(model))
    }

    async fn find_recent_messages(
        &self,
        conversation_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let models = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id.to_string()))
            .order_by_desc(messages::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        let mut result: Vec<Message> = models.into_iter().map(Message::from).collect();
        result.reverse();
        Ok(result)
    }

    async fn find_messages_before(
        &self,
        conversation_id: Uuid,
        before: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut query = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id.to_string()));

        if let Some(before_id) = before {
            let cursor = messages::Entity::find_by_id(before_id.to_string())
                .one(&self.db)
                .await?;

            let Some(cursor) = cursor else {
                return Ok(Vec::new());
            };
            query = query.filter(messages::Column::CreatedAt.lt(cursor.created_at));
        }

        let models = query
            .order_by_desc(messages::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        let mut result: Vec<Message> = models.into_iter().map(Message::from).collect();
        result.reverse();
        Ok(result)
    }

    async fn count_messages(&self, conversation_id: Uuid) -> Result<u64, RepositoryError> {
        let count = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation_id.to_string()))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn total_tokens_used(&self, conversation_id: Uuid) -> Result<i64, RepositoryError> {
        let total: Option<Option<i64>> = messages::Entity::find()
            .select_only()
            .column_as(
                Expr::col((messages::Entity, messages::Column::TokensUsed)).sum(),
                "total",
            )
            .filter(messages::Column::ConversationId.eq(conversation_id.to_string()))
            .filter(messages::Column::Role.eq("assistant"))
            .into_tuple()
            .one(&self.db)
            .await?;

        Ok(total.flatten().unwrap_or(0))
    }

    async fn count_conversations(&self) -> Result<u64, RepositoryError> {
        let count = conversations::Entity::find().count(&self.db).await?;
        Ok(count)
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<(), RepositoryError> {
        // Messages first: deletes must not rely on the connection having
        // foreign_keys enabled.
        messages::Entity::delete_many()
            .filter(messages::Column::ConversationId.eq(id.to_string()))
            .exec(&self.db)
            .await?;

        let result = conversations::Entity::delete_by_id(id.to_string())
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound(format!("Conversation {id}")));
        }

        tracing::info!(conversation_id = %id, "Conversation deleted");
        Ok(())
    }
}

#[async_trait]
impl FaqRepository for SeaOrmRepository {
    async fn create_faq(&self, faq: NewFaq) -> Result<FaqEntry, RepositoryError> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now().naive_utc();

        let keywords = serde_json::to_string(&faq.keywords)
            .map_err(|e| RepositoryError::InvalidInput(e.to_string()))?;

        let active = faqs::ActiveModel {
            id: Set(id.to_string()),
            question: Set(faq.question),
            answer: Set(faq.answer),
            category: Set(faq.category),
            keywords: Set(keywords),
            priority: Set(faq.priority),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = active.insert(&self.db).await?;
        tracing::info!(faq_id = %id, category = ?model.category, "FAQ created");

        Ok(FaqEntry::from(model))
    }

    async fn update_faq(&self, id: Uuid, update: FaqUpdate) -> Result<FaqEntry, RepositoryError> {
        let model = faqs::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("FAQ {id}")))?;

        let mut active: faqs::ActiveModel = model.into();

        if let Some(question) = update.question {
            active.question = Set(question);
        }
        if let Some(answer) = update.answer {
            active.answer = Set(answer);
        }
        if let Some(category) = update.category {
            active.category = Set(Some(category));
        }
        if let Some(keywords) = update.keywords {
            let encoded = serde_json::to_string(&keywords)
                .map_err(|e| RepositoryError::InvalidInput(e.to_string()))?;
            active.keywords = Set(encoded);
        }
        if let Some(priority) = update.priority {
            active.priority = Set(priority);
        }
        if let Some(is_active) = update.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());

        let model = active.update(&self.db).await?;
        tracing::info!(faq_id = %id, "FAQ updated");

        Ok(FaqEntry::from(model))
    }

    async fn deactivate_faq(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.update_faq(
            id,
            FaqUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;

        tracing::info!(faq_id = %id, "FAQ deactivated");
        Ok(())
    }

    async fn find_faq_by_id(&self, id: Uuid) -> Result<Option<FaqEntry>, RepositoryError> {
        let model = faqs::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;

        Ok(model.map(FaqEntry::from))
    }

    async fn find_by_category(
        &self,
        category: &str,
        limit: u64,
    ) -> Result<Vec<FaqEntry>, RepositoryError> {
        let models = faqs::Entity::find()
            .filter(faqs::Column::IsActive.eq(true))
            .filter(faqs::Column::Category.eq(category))
            .order_by_desc(faqs::Column::Priority)
            .order_by_desc(faqs::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(FaqEntry::from).collect())
    }

    async fn find_all_active(&self) -> Result<Vec<FaqEntry>, RepositoryError> {
        let models = faqs::Entity::find()
            .filter(faqs::Column::IsActive.eq(true))
            .order_by_desc(faqs::Column::Priority)
            .order_by_desc(faqs::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(FaqEntry::from).collect())
    }

    async fn search_full_text(
        &self,
        match_query: &str,
        limit: u64,
    ) -> Result<Vec<(FaqEntry, f32)>, RepositoryError> {
        let sql = r#"
            SELECT f.id, f.question, f.answer, f.category, f.keywords,
                   f.priority, f.is_active, f.created_at, f.updated_at,
                   -bm25(faqs_fts) AS relevance
            FROM faqs_fts
            JOIN faqs f ON f.id = faqs_fts.faq_id
            WHERE faqs_fts MATCH ? AND f.is_active = 1
            ORDER BY relevance DESC, f.priority DESC
            LIMIT ?
        "#;

        let rows = self
            .db
            .query_all(Statement::from_sql_and_values(
                DbBackend::Sqlite,
                sql,
                vec![match_query.into(), (limit as i64).into()],
            ))
            .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = faq_from_row(&row)?;
            let relevance: f64 = row.try_get("", "relevance")?;
            results.push((entry, relevance as f32));
        }

        tracing::debug!(match_query, results = results.len(), "Full-text search completed");
        Ok(results)
    }

    async fn search_by_keywords(
        &self,
        keywords: &[String],
        limit: u64,
    ) -> Result<Vec<FaqEntry>, RepositoryError> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; keywords.len()].join(", ");
        let sql = format!(
            r#"
            SELECT f.* FROM faqs f
            WHERE f.is_active = 1
              AND EXISTS (
                SELECT 1 FROM json_each(f.keywords) jk
                WHERE jk.value IN ({placeholders})
              )
            ORDER BY f.priority DESC, f.created_at DESC
            LIMIT ?
            "#
        );

        let mut values: Vec<sea_orm::Value> =
            keywords.iter().map(|k| k.as_str().into()).collect();
        values.push((limit as i64).into());

        let models = faqs::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Sqlite,
                &sql,
                values,
            ))
            .all(&self.db)
            .await?;

        tracing::debug!(?keywords, results = models.len(), "Keyword search completed");
        Ok(models.into_iter().map(FaqEntry::from).collect())
    }
}

// ============================================
// Conversions
// ============================================

fn parse_stored_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).expect("stored id is a valid UUID")
}

fn parse_stored_json(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|_| serde_json::json!({}))
}

fn faq_from_row(row: &sea_orm::QueryResult) -> Result<FaqEntry, RepositoryError> {
    let id: String = row.try_get("", "id")?;
    let keywords: String = row.try_get("", "keywords")?;

    Ok(FaqEntry {
        id: parse_stored_uuid(&id),
        question: row.try_get("", "question")?,
        answer: row.try_get("", "answer")?,
        category: row.try_get("", "category")?,
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        priority: row.try_get("", "priority")?,
        is_active: row.try_get("", "is_active")?,
        created_at: row.try_get("", "created_at")?,
        updated_at: row.try_get("", "updated_at")?,
    })
}

impl From<conversations::Model> for Conversation {
    fn from(model: conversations::Model) -> Self {
        Self {
            id: parse_stored_uuid(&model.id),
            session_id: model.session_id,
            user_identifier: model.user_identifier,
            metadata: parse_stored_json(&model.metadata),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<messages::Model> for Message {
    fn from(model: messages::Model) -> Self {
        Self {
            id: parse_stored_uuid(&model.id),
            conversation_id: parse_stored_uuid(&model.conversation_id),
            // The role column carries a CHECK constraint, so the parse
            // cannot fail for rows written through this repository.
            role: model.role.parse().unwrap_or_default(),
            content: model.content,
            tokens_used: model.tokens_used,
            metadata: parse_stored_json(&model.metadata),
            created_at: model.created_at,
        }
    }
}

impl From<faqs::Model> for FaqEntry {
    fn from(model: faqs::Model) -> Self {
        Self {
            id: parse_stored_uuid(&model.id),
            question: model.question,
            answer: model.answer,
            category: model.category,
            keywords: serde_json::from_str(&model.keywords).unwrap_or_default(),
            priority: model.priority,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
