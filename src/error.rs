//! Service-level error taxonomy and its HTTP mapping.
//!
//! Cache failures never appear here: the cache layer swallows them. FAQ
//! retrieval failures degrade to empty results before reaching this type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::llm_client::LlmError;
use crate::storage::repository::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{resource} not found: {identifier}")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },

    #[error("rate limit exceeded, try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Completion API failure after retry handling. `retriable` tells the
    /// caller whether resending the request can reasonably succeed.
    #[error("{message}")]
    Llm { message: String, retriable: bool },

    #[error("storage operation failed")]
    Storage(#[source] RepositoryError),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::RateLimited { .. } => "rate_limit",
            ServiceError::Llm { .. } => "llm_service",
            ServiceError::Storage(_) => "storage",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Llm { .. } => StatusCode::BAD_GATEWAY,
            ServiceError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        ServiceError::Storage(err)
    }
}

impl From<LlmError> for ServiceError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Unavailable { message, retriable } => {
                ServiceError::Llm { message, retriable }
            }
            other => ServiceError::Llm {
                message: other.to_string(),
                retriable: false,
            },
        }
    }
}

// ==================== HTTP mapping ====================

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    #[schema(value_type = String)]
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retriable: Option<bool>,
    pub timestamp: String,
    /// Underlying failure chain; populated only in debug builds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ServiceError {
    fn details(&self) -> Option<String> {
        if !cfg!(debug_assertions) {
            return None;
        }
        match self {
            ServiceError::Storage(source) => Some(source.to_string()),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retriable = match &self {
            ServiceError::Llm { retriable, .. } => Some(*retriable),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
                retriable,
                timestamp: chrono::Utc::now().to_rfc3339(),
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}
