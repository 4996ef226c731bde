use super::{json, test_context, Uuid};
use helpdesk_controller::models::internal::{FaqUpdate, MessageRole, NewFaq, NewMessage};
use helpdesk_controller::storage::repository::{
    ConversationRepository, FaqRepository, RepositoryError,
};

fn new_faq(question: &str, keywords: &[&str], priority: i32) -> NewFaq {
    NewFaq {
        question: question.to_string(),
        answer: format!("Answer for: {question}"),
        category: Some("account".to_string()),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        priority,
    }
}

fn user_message(conversation_id: Uuid, content: &str) -> NewMessage {
    NewMessage {
        conversation_id,
        role: MessageRole::User,
        content: content.to_string(),
        tokens_used: None,
        metadata: json!({}),
    }
}

// ============================================
// Conversations & messages
// ============================================

#[tokio::test]
async fn test_get_or_create_is_stable_per_session() {
    let ctx = test_context("http://localhost:0").await;

    let (first, created) = ctx.repo.get_or_create("session-1", json!({})).await.unwrap();
    assert!(created);

    let (second, created_again) = ctx.repo.get_or_create("session-1", json!({})).await.unwrap();
    assert!(!created_again);
    assert_eq!(first.id, second.id);
    assert_eq!(second.session_id, "session-1");
}

#[tokio::test]
async fn test_messages_are_ordered_chronologically() {
    let ctx = test_context("http://localhost:0").await;
    let (conv, _) = ctx.repo.get_or_create("session-2", json!({})).await.unwrap();

    for i in 0..5 {
        ctx.repo
            .append_message(user_message(conv.id, &format!("message {i}")))
            .await
            .unwrap();
    }

    let recent = ctx.repo.find_recent_messages(conv.id, 3).await.unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].content, "message 2");
    assert_eq!(recent[2].content, "message 4");
}

#[tokio::test]
async fn test_pagination_cursor_walks_backwards() {
    let ctx = test_context("http://localhost:0").await;
    let (conv, _) = ctx.repo.get_or_create("session-3", json!({})).await.unwrap();

    let mut ids = Vec::new();
    for i in 0..6 {
        let msg = ctx
            .repo
            .append_message(user_message(conv.id, &format!("m{i}")))
            .await
            .unwrap();
        ids.push(msg.id);
    }

    // Latest page.
    let page = ctx
        .repo
        .find_messages_before(conv.id, None, 3)
        .await
        .unwrap();
    assert_eq!(
        page.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        vec!["m3", "m4", "m5"]
    );

    // Older page, anchored before the oldest message of the previous page.
    let older = ctx
        .repo
        .find_messages_before(conv.id, Some(page[0].id), 3)
        .await
        .unwrap();
    assert_eq!(
        older.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        vec!["m0", "m1", "m2"]
    );

    // Unknown cursor yields an empty page.
    let empty = ctx
        .repo
        .find_messages_before(conv.id, Some(Uuid::new_v4()), 3)
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_token_totals_count_assistant_only() {
    let ctx = test_context("http://localhost:0").await;
    let (conv, _) = ctx.repo.get_or_create("session-4", json!({})).await.unwrap();

    ctx.repo
        .append_message(user_message(conv.id, "hello"))
        .await
        .unwrap();
    ctx.repo
        .append_message(NewMessage {
            conversation_id: conv.id,
            role: MessageRole::Assistant,
            content: "hi".to_string(),
            tokens_used: Some(25),
            metadata: json!({}),
        })
        .await
        .unwrap();
    ctx.repo
        .append_message(NewMessage {
            conversation_id: conv.id,
            role: MessageRole::Assistant,
            content: "more".to_string(),
            tokens_used: Some(17),
            metadata: json!({}),
        })
        .await
        .unwrap();

    assert_eq!(ctx.repo.count_messages(conv.id).await.unwrap(), 3);
    assert_eq!(ctx.repo.total_tokens_used(conv.id).await.unwrap(), 42);
}

#[tokio::test]
async fn test_delete_conversation_removes_messages() {
    let ctx = test_context("http://localhost:0").await;
    let (conv, _) = ctx.repo.get_or_create("session-5", json!({})).await.unwrap();
    ctx.repo
        .append_message(user_message(conv.id, "hello"))
        .await
        .unwrap();

    ctx.repo.delete_conversation(conv.id).await.unwrap();

    assert!(ctx
        .repo
        .find_by_session_id("session-5")
        .await
        .unwrap()
        .is_none());
    assert_eq!(ctx.repo.count_messages(conv.id).await.unwrap(), 0);

    // Deleting again reports not-found.
    let err = ctx.repo.delete_conversation(conv.id).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound(_)));
}

#[tokio::test]
async fn test_message_append_touches_conversation_updated_at() {
    let ctx = test_context("http://localhost:0").await;
    let (conv, _) = ctx.repo.get_or_create("session-6", json!({})).await.unwrap();

    ctx.repo
        .append_message(user_message(conv.id, "touch"))
        .await
        .unwrap();

    let reloaded = ctx
        .repo
        .find_by_session_id("session-6")
        .await
        .unwrap()
        .unwrap();
    assert!(reloaded.updated_at >= conv.updated_at);
}

// ============================================
// FAQ storage & search
// ============================================

#[tokio::test]
async fn test_faq_crud_and_soft_delete() {
    let ctx = test_context("http://localhost:0").await;

    let faq = ctx
        .repo
        .create_faq(new_faq("How do I reset my password?", &["password"], 5))
        .await
        .unwrap();
    assert!(faq.is_active);

    let updated = ctx
        .repo
        .update_faq(
            faq.id,
            FaqUpdate {
                answer: Some("Visit settings and click reset.".to_string()),
                priority: Some(9),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.priority, 9);
    assert_eq!(updated.answer, "Visit settings and click reset.");

    ctx.repo.deactivate_faq(faq.id).await.unwrap();
    let reloaded = ctx.repo.find_faq_by_id(faq.id).await.unwrap().unwrap();
    assert!(!reloaded.is_active);

    // Soft-deleted entries drop out of the active listing.
    assert!(ctx.repo.find_all_active().await.unwrap().is_empty());

    let missing = ctx
        .repo
        .update_faq(Uuid::new_v4(), FaqUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(missing, RepositoryError::NotFound(_)));
}

#[tokio::test]
async fn test_full_text_search_matches_and_ranks() {
    let ctx = test_context("http://localhost:0").await;

    ctx.repo
        .create_faq(new_faq("How do I reset my password?", &[], 1))
        .await
        .unwrap();
    ctx.repo
        .create_faq(new_faq("How do I change my billing plan?", &[], 1))
        .await
        .unwrap();
    let inactive = ctx
        .repo
        .create_faq(new_faq("Why was my password rejected?", &[], 1))
        .await
        .unwrap();
    ctx.repo.deactivate_faq(inactive.id).await.unwrap();

    let results = ctx.repo.search_full_text("password", 5).await.unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].0.question.contains("reset my password"));
    assert!(results[0].1 > 0.0);
}

#[tokio::test]
async fn test_keyword_search_orders_by_priority() {
    let ctx = test_context("http://localhost:0").await;

    ctx.repo
        .create_faq(new_faq("Low priority refunds", &["refund"], 1))
        .await
        .unwrap();
    ctx.repo
        .create_faq(new_faq("High priority refunds", &["refund", "billing"], 8))
        .await
        .unwrap();
    ctx.repo
        .create_faq(new_faq("Unrelated entry", &["shipping"], 9))
        .await
        .unwrap();

    let keywords = vec!["refund".to_string()];
    let results = ctx.repo.search_by_keywords(&keywords, 5).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].question, "High priority refunds");
    assert_eq!(results[1].question, "Low priority refunds");
}

#[tokio::test]
async fn test_keyword_search_respects_limit() {
    let ctx = test_context("http://localhost:0").await;

    for i in 0..4 {
        ctx.repo
            .create_faq(new_faq(&format!("Entry {i}"), &["invoice"], i))
            .await
            .unwrap();
    }

    let keywords = vec!["invoice".to_string()];
    let results = ctx.repo.search_by_keywords(&keywords, 2).await.unwrap();
    assert_eq!(results.len(), 2);
}

// ============================================
// Hybrid retrieval service
// ============================================

#[tokio::test]
async fn test_retrieval_returns_empty_for_stop_words() {
    let ctx = test_context("http://localhost:0").await;
    ctx.repo
        .create_faq(new_faq("How do I reset my password?", &["password"], 1))
        .await
        .unwrap();

    let results = ctx.state.faqs.retrieve_relevant("How do I do it?").await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_retrieval_is_idempotent_and_capped() {
    let ctx = test_context("http://localhost:0").await;

    for i in 0..8 {
        ctx.repo
            .create_faq(new_faq(
                &format!("Billing question {i} about invoices"),
                &["billing"],
                i,
            ))
            .await
            .unwrap();
    }

    let first = ctx
        .state
        .faqs
        .retrieve_relevant("A billing question about invoices")
        .await;
    let second = ctx
        .state
        .faqs
        .retrieve_relevant("A billing question about invoices")
        .await;

    assert!(!first.is_empty());
    assert!(first.len() <= 5);
    assert!(first.iter().all(|f| f.is_active));
    assert_eq!(
        first.iter().map(|f| f.id).collect::<Vec<_>>(),
        second.iter().map(|f| f.id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_retrieval_unions_text_and_keyword_matches() {
    let ctx = test_context("http://localhost:0").await;

    // Matched by full text only.
    ctx.repo
        .create_faq(new_faq("How do I reset my password?", &[], 1))
        .await
        .unwrap();
    // Matched by keyword tag only.
    ctx.repo
        .create_faq(NewFaq {
            question: "Trouble signing in".to_string(),
            answer: "Try the recovery flow.".to_string(),
            category: None,
            keywords: vec!["password".to_string()],
            priority: 3,
        })
        .await
        .unwrap();

    let results = ctx.state.faqs.retrieve_relevant("password help").await;

    assert_eq!(results.len(), 2);
}
