use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::{
    api::dto::*,
    api::rate_limiter::{rate_limit_middleware, RateLimiter},
    config::Config,
    error::ServiceError,
    models::internal::{FaqUpdate, NewFaq},
    orchestrator::{ChatOrchestrator, TurnRequest},
    services::cache_service::CacheService,
    services::faq_retrieval::FaqRetrievalService,
    storage::repository::ConversationRepository,
};

const DEFAULT_HISTORY_PAGE: u64 = 50;
const MAX_HISTORY_PAGE: u64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub faqs: Arc<FaqRetrievalService>,
    pub repo: Arc<dyn ConversationRepository>,
    pub cache: Arc<CacheService>,
    pub started_at: Instant,
}

// ==================== Chat ====================

pub async fn post_chat_message(
    State(state): State<AppState>,
    Json(req): Json<ChatMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessageResponse>), ServiceError> {
    validate_chat_request(&req, &state.config)?;

    tracing::info!(
        session_id = ?req.session_id,
        message_length = req.message.len(),
        "Chat message received"
    );

    let outcome = state
        .orchestrator
        .handle_turn(TurnRequest {
            session_id: req.session_id,
            message: req.message,
            metadata: req.metadata,
        })
        .await?;

    let status = if outcome.conversation_created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(ChatMessageResponse::from(&outcome))))
}

fn validate_chat_request(req: &ChatMessageRequest, config: &Config) -> Result<(), ServiceError> {
    if req.message.trim().is_empty() {
        return Err(ServiceError::Validation(
            "message must not be empty".to_string(),
        ));
    }
    if req.message.chars().count() > config.max_message_length {
        return Err(ServiceError::Validation(format!(
            "message exceeds maximum length of {} characters",
            config.max_message_length
        )));
    }
    if let Some(session_id) = &req.session_id {
        if session_id.is_empty() || session_id.len() > 128 {
            return Err(ServiceError::Validation(
                "sessionId must be between 1 and 128 characters".to_string(),
            ));
        }
    }
    Ok(())
}

pub async fn get_conversation_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ServiceError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_PAGE)
        .clamp(1, MAX_HISTORY_PAGE);

    let history = state
        .orchestrator
        .get_history(&session_id, limit, query.before)
        .await?;

    Ok(Json(HistoryResponse::from(&history)))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.orchestrator.delete_conversation(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== FAQ management ====================

pub async fn create_faq(
    State(state): State<AppState>,
    Json(req): Json<CreateFaqRequest>,
) -> Result<(StatusCode, Json<FaqResponse>), ServiceError> {
    if req.question.trim().is_empty() || req.answer.trim().is_empty() {
        return Err(ServiceError::Validation(
            "question and answer must not be empty".to_string(),
        ));
    }

    let faq = state
        .faqs
        .create(NewFaq {
            question: req.question,
            answer: req.answer,
            category: req.category,
            keywords: req.keywords,
            priority: req.priority,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(FaqResponse::from(&faq))))
}

pub async fn update_faq(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFaqRequest>,
) -> Result<Json<FaqResponse>, ServiceError> {
    let faq = state
        .faqs
        .update(
            id,
            FaqUpdate {
                question: req.question,
                answer: req.answer,
                category: req.category,
                keywords: req.keywords,
                priority: req.priority,
                is_active: req.is_active,
            },
        )
        .await
        .map_err(not_found_or_storage("FAQ", id))?;

    Ok(Json(FaqResponse::from(&faq)))
}

pub async fn deactivate_faq(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .faqs
        .deactivate(id)
        .await
        .map_err(not_found_or_storage("FAQ", id))?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_faqs(
    State(state): State<AppState>,
    Query(query): Query<FaqListQuery>,
) -> Result<Json<Vec<FaqResponse>>, ServiceError> {
    let faqs = match query.category {
        Some(category) => state.faqs.get_by_category(&category).await?,
        None => state.faqs.get_all_active().await?,
    };

    Ok(Json(faqs.iter().map(FaqResponse::from).collect()))
}

fn not_found_or_storage(
    resource: &'static str,
    id: Uuid,
) -> impl FnOnce(crate::storage::repository::RepositoryError) -> ServiceError {
    move |err| match err {
        crate::storage::repository::RepositoryError::NotFound(_) => ServiceError::NotFound {
            resource,
            identifier: id.to_string(),
        },
        other => ServiceError::Storage(other),
    }
}

// ==================== Health & metrics ====================

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    // Probes run concurrently and independently.
    let (db_up, cache_up) = tokio::join!(
        async { state.repo.ping().await.is_ok() },
        state.cache.ping()
    );

    let status = if db_up && cache_up {
        "healthy"
    } else if db_up {
        "degraded"
    } else {
        "unhealthy"
    };

    if status != "healthy" {
        tracing::warn!(status, db_up, cache_up, "Health check returned degraded or unhealthy");
    }

    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let response = HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: ServiceHealth {
            database: up_or_down(db_up),
            cache: up_or_down(cache_up),
            llm: "up".to_string(),
        },
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    (status_code, Json(response))
}

fn up_or_down(up: bool) -> String {
    if up { "up" } else { "down" }.to_string()
}

pub async fn metrics(State(state): State<AppState>) -> String {
    let count = state.repo.count_conversations().await.unwrap_or(0);

    format!(
        "# HELP helpdesk_conversations_total Total number of conversations\n\
         # TYPE helpdesk_conversations_total gauge\n\
         helpdesk_conversations_total {}\n\
         # HELP helpdesk_up Whether the service is up\n\
         # TYPE helpdesk_up gauge\n\
         helpdesk_up 1\n",
        count
    )
}

// ==================== Router ====================

pub fn create_router(state: AppState) -> Router {
    let limiter = RateLimiter::new(
        state.config.rate_limit_per_minute,
        Duration::from_secs(60),
    );

    let chat_routes = Router::new()
        .route("/api/v1/chat/message", post(post_chat_message))
        .route(
            "/api/v1/chat/conversations/{session_id}",
            get(get_conversation_history).delete(delete_conversation),
        )
        .layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));

    let faq_routes = Router::new()
        .route("/api/v1/faqs", post(create_faq).get(list_faqs))
        .route("/api/v1/faqs/{id}", put(update_faq).delete(deactivate_faq));

    let mut router = Router::new()
        .merge(chat_routes)
        .merge(faq_routes)
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http());

    if state.config.cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}
