//! Hybrid FAQ retrieval: disjunctive full-text search over question+answer
//! unioned with keyword-tag intersection, ranked by text relevance then
//! priority. Retrieval is best-effort; failures degrade to empty results.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::internal::{FaqEntry, FaqUpdate, NewFaq};
use crate::services::cache_service::CacheService;
use crate::storage::repository::{FaqRepository, RepositoryError};

/// Tokens dropped during keyword extraction.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "a", "an", "the", "is", "are", "was", "were", "i", "you", "he", "she", "it", "we",
        "they", "my", "your", "how", "what", "when", "where", "do", "can", "to", "in", "on",
        "at", "for", "with", "of",
    ])
});

const MAX_KEYWORDS: usize = 10;

pub struct FaqRetrievalService {
    repo: Arc<dyn FaqRepository>,
    cache: Arc<CacheService>,
    max_results: u64,
}

impl FaqRetrievalService {
    pub fn new(repo: Arc<dyn FaqRepository>, cache: Arc<CacheService>, max_results: u64) -> Self {
        Self {
            repo,
            cache,
            max_results,
        }
    }

    /// Up to `max_results` active FAQ entries relevant to the user message,
    /// best first. Never fails: retrieval errors are logged and surfaced as
    /// an empty list so the chat turn can proceed without FAQ context.
    pub async fn retrieve_relevant(&self, user_message: &str) -> Vec<FaqEntry> {
        if let Some(cached) = self.cache.cached_faqs(user_message).await {
            tracing::debug!(count = cached.len(), "FAQs served from cache");
            return cached;
        }

        match self.search_hybrid(user_message).await {
            Ok(faqs) => {
                tracing::debug!(
                    message_length = user_message.len(),
                    faq_count = faqs.len(),
                    "FAQs retrieved for user message"
                );
                self.cache.cache_faqs(user_message, &faqs).await;
                faqs
            }
            Err(e) => {
                tracing::error!(error = %e, "Error retrieving relevant FAQs");
                Vec::new()
            }
        }
    }

    async fn search_hybrid(&self, user_message: &str) -> Result<Vec<FaqEntry>, RepositoryError> {
        let keywords = extract_keywords(user_message);
        if keywords.is_empty() {
            // Message was all stop words or punctuation.
            return Ok(Vec::new());
        }

        let match_query = build_match_query(&keywords);
        let text_matches = self
            .repo
            .search_full_text(&match_query, self.max_results)
            .await?;
        let keyword_matches = self
            .repo
            .search_by_keywords(&keywords, self.max_results)
            .await?;

        Ok(merge_ranked(
            text_matches,
            keyword_matches,
            self.max_results as usize,
        ))
    }

    // ---- management passthroughs ----

    pub async fn create(&self, faq: NewFaq) -> Result<FaqEntry, RepositoryError> {
        self.repo.create_faq(faq).await
    }

    pub async fn update(&self, id: Uuid, update: FaqUpdate) -> Result<FaqEntry, RepositoryError> {
        self.repo.update_faq(id, update).await
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.repo.deactivate_faq(id).await
    }

    pub async fn get_by_category(&self, category: &str) -> Result<Vec<FaqEntry>, RepositoryError> {
        self.repo.find_by_category(category, self.max_results).await
    }

    pub async fn get_all_active(&self) -> Result<Vec<FaqEntry>, RepositoryError> {
        self.repo.find_all_active().await
    }
}

/// Lowercase, strip punctuation, drop short tokens and stop words, cap the
/// set at [`MAX_KEYWORDS`].
pub fn extract_keywords(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|word| word.len() > 2 && !STOP_WORDS.contains(word))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

/// Disjunctive FTS5 query over the keyword set. Keywords are alphanumeric
/// after extraction, so no further escaping is needed.
fn build_match_query(keywords: &[String]) -> String {
    keywords.join(" OR ")
}

/// Union text and keyword matches, preferring the text-relevance score when
/// an entry appears in both sets. Keyword-only matches rank as zero
/// relevance, so ordering falls through to priority, then recency.
fn merge_ranked(
    text_matches: Vec<(FaqEntry, f32)>,
    keyword_matches: Vec<FaqEntry>,
    limit: usize,
) -> Vec<FaqEntry> {
    let mut seen: HashSet<Uuid> = text_matches.iter().map(|(f, _)| f.id).collect();
    let mut ranked: Vec<(FaqEntry, f32)> = text_matches;

    for entry in keyword_matches {
        if seen.insert(entry.id) {
            ranked.push((entry, 0.0));
        }
    }

    ranked.sort_by(|(a, ra), (b, rb)| {
        rb.total_cmp(ra)
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| b.created_at.cmp(&a.created_at))
    });

    ranked.truncate(limit);
    ranked.into_iter().map(|(entry, _)| entry).collect()
}
