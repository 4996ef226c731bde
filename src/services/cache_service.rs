//! Domain-level caching on top of the [`CacheStore`] seam.
//!
//! The cache is an accelerator, never a source of truth: every failure is
//! logged and treated as a miss, so an unavailable backend can never fail
//! a chat turn.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::internal::{FaqEntry, Message};
use crate::storage::cache::CacheStore;

const FAQ_PREFIX: &str = "faq:";
const MESSAGE_HISTORY_PREFIX: &str = "messages:";

pub struct CacheService {
    store: Arc<dyn CacheStore>,
    history_ttl: Duration,
    faq_ttl: Duration,
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheStore>, history_ttl: Duration, faq_ttl: Duration) -> Self {
        Self {
            store,
            history_ttl,
            faq_ttl,
        }
    }

    pub async fn cached_history(&self, conversation_id: Uuid) -> Option<Vec<Message>> {
        let key = history_key(conversation_id);
        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(messages) => {
                    tracing::debug!(%conversation_id, count = messages.len(), "History cache hit");
                    Some(messages)
                }
                Err(e) => {
                    tracing::warn!(%conversation_id, error = %e, "Discarding undecodable cached history");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(%conversation_id, error = %e, "History cache read failed");
                None
            }
        }
    }

    pub async fn cache_history(&self, conversation_id: Uuid, messages: &[Message]) {
        let key = history_key(conversation_id);
        let value = match serde_json::to_string(messages) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(%conversation_id, error = %e, "Failed to encode history for cache");
                return;
            }
        };

        if let Err(e) = self.store.set(&key, &value, self.history_ttl).await {
            tracing::warn!(%conversation_id, error = %e, "History cache write failed");
        } else {
            tracing::debug!(%conversation_id, count = messages.len(), "History cached");
        }
    }

    pub async fn invalidate_history(&self, conversation_id: Uuid) {
        if let Err(e) = self.store.delete(&history_key(conversation_id)).await {
            tracing::warn!(%conversation_id, error = %e, "History cache invalidation failed");
        } else {
            tracing::debug!(%conversation_id, "History cache invalidated");
        }
    }

    pub async fn cached_faqs(&self, user_message: &str) -> Option<Vec<FaqEntry>> {
        let key = faq_key(user_message);
        match self.store.get(&key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "FAQ cache read failed");
                None
            }
        }
    }

    pub async fn cache_faqs(&self, user_message: &str, faqs: &[FaqEntry]) {
        let key = faq_key(user_message);
        let value = match serde_json::to_string(faqs) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to encode FAQs for cache");
                return;
            }
        };

        if let Err(e) = self.store.set(&key, &value, self.faq_ttl).await {
            tracing::warn!(key, error = %e, "FAQ cache write failed");
        } else {
            tracing::debug!(key, count = faqs.len(), "FAQs cached");
        }
    }

    /// Liveness probe for the health endpoint: any non-error answer counts.
    pub async fn ping(&self) -> bool {
        self.store.exists("healthcheck").await.is_ok()
    }
}

fn history_key(conversation_id: Uuid) -> String {
    format!("{MESSAGE_HISTORY_PREFIX}{conversation_id}")
}

/// FAQ results are keyed by a digest of the normalized message, so the same
/// question phrased with different spacing or casing shares one entry.
fn faq_key(user_message: &str) -> String {
    let normalized = user_message
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let digest = Sha256::digest(normalized.as_bytes());
    format!("{FAQ_PREFIX}{}", hex::encode(&digest[..16]))
}
