use super::{json, mount_completion, test_context};
use helpdesk_controller::error::ServiceError;
use helpdesk_controller::models::internal::{MessageRole, NewFaq};
use helpdesk_controller::orchestrator::TurnRequest;
use helpdesk_controller::storage::repository::ConversationRepository;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn turn(session_id: Option<&str>, message: &str) -> TurnRequest {
    TurnRequest {
        session_id: session_id.map(str::to_string),
        message: message.to_string(),
        metadata: None,
    }
}

#[tokio::test]
async fn test_first_turn_creates_conversation() {
    let server = MockServer::start().await;
    mount_completion(&server, "Happy to help!", 21).await;
    let ctx = test_context(&server.uri()).await;

    let outcome = ctx
        .orchestrator()
        .handle_turn(turn(None, "I need help with my invoice"))
        .await
        .unwrap();

    assert!(outcome.conversation_created);
    assert!(!outcome.session_id.is_empty());
    assert_eq!(outcome.message.role, MessageRole::Assistant);
    assert_eq!(outcome.message.content, "Happy to help!");
    assert_eq!(outcome.message.tokens_used, Some(21));

    // User and assistant messages are both durable.
    let conv = ctx
        .repo
        .find_by_session_id(&outcome.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ctx.repo.count_messages(conv.id).await.unwrap(), 2);

    // Assistant metadata records model, FAQ count and latency.
    let meta = &outcome.message.metadata;
    assert_eq!(meta["model"], "test-model");
    assert_eq!(meta["faqs_used"], 0);
    assert!(meta["latency_ms"].is_number());
}

#[tokio::test]
async fn test_second_turn_reuses_conversation() {
    let server = MockServer::start().await;
    mount_completion(&server, "Sure.", 5).await;
    let ctx = test_context(&server.uri()).await;

    let first = ctx
        .orchestrator()
        .handle_turn(turn(Some("session-a"), "hello"))
        .await
        .unwrap();
    assert!(first.conversation_created);

    let second = ctx
        .orchestrator()
        .handle_turn(turn(Some("session-a"), "another question"))
        .await
        .unwrap();

    assert!(!second.conversation_created);
    assert_eq!(second.session_id, "session-a");

    let conv = ctx
        .repo
        .find_by_session_id("session-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ctx.repo.count_messages(conv.id).await.unwrap(), 4);
}

#[tokio::test]
async fn test_turn_invalidates_history_cache() {
    let server = MockServer::start().await;
    mount_completion(&server, "Done.", 3).await;
    let ctx = test_context(&server.uri()).await;

    let outcome = ctx
        .orchestrator()
        .handle_turn(turn(Some("session-b"), "first"))
        .await
        .unwrap();

    let conv = ctx
        .repo
        .find_by_session_id(&outcome.session_id)
        .await
        .unwrap()
        .unwrap();

    // The turn ends by invalidating the history key it may have populated.
    assert!(ctx.cache.cached_history(conv.id).await.is_none());
}

#[tokio::test]
async fn test_llm_failure_keeps_user_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .expect(3)
        .mount(&server)
        .await;

    let ctx = test_context(&server.uri()).await;

    let error = ctx
        .orchestrator()
        .handle_turn(turn(Some("session-c"), "are you there?"))
        .await
        .unwrap_err();

    match error {
        ServiceError::Llm { retriable, .. } => assert!(retriable),
        other => panic!("expected Llm error, got {other:?}"),
    }

    // The user message was durably persisted; no assistant reply exists.
    let conv = ctx
        .repo
        .find_by_session_id("session-c")
        .await
        .unwrap()
        .unwrap();
    let messages = ctx.repo.find_recent_messages(conv.id, 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::User);
}

#[tokio::test]
async fn test_llm_auth_failure_is_not_retriable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = test_context(&server.uri()).await;

    let error = ctx
        .orchestrator()
        .handle_turn(turn(Some("session-d"), "hello"))
        .await
        .unwrap_err();

    match error {
        ServiceError::Llm { retriable, .. } => assert!(!retriable),
        other => panic!("expected Llm error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_turn_records_faqs_used() {
    let server = MockServer::start().await;
    mount_completion(&server, "See the reset link.", 12).await;
    let ctx = test_context(&server.uri()).await;

    use helpdesk_controller::storage::repository::FaqRepository;
    ctx.repo
        .create_faq(NewFaq {
            question: "How do I reset my password?".to_string(),
            answer: "Use the reset link in settings.".to_string(),
            category: Some("account".to_string()),
            keywords: vec!["password".to_string()],
            priority: 5,
        })
        .await
        .unwrap();

    let outcome = ctx
        .orchestrator()
        .handle_turn(turn(None, "I forgot my password"))
        .await
        .unwrap();

    assert_eq!(outcome.message.metadata["faqs_used"], 1);
}

#[tokio::test]
async fn test_get_history_unknown_session_is_not_found() {
    let server = MockServer::start().await;
    let ctx = test_context(&server.uri()).await;

    let error = ctx
        .orchestrator()
        .get_history("no-such-session", 10, None)
        .await
        .unwrap_err();

    assert!(matches!(error, ServiceError::NotFound { .. }));
}

#[tokio::test]
async fn test_get_history_paginates() {
    let server = MockServer::start().await;
    mount_completion(&server, "reply", 2).await;
    let ctx = test_context(&server.uri()).await;

    // Three turns -> six messages.
    for i in 0..3 {
        ctx.orchestrator()
            .handle_turn(turn(Some("session-e"), &format!("question {i}")))
            .await
            .unwrap();
    }

    let page = ctx
        .orchestrator()
        .get_history("session-e", 4, None)
        .await
        .unwrap();

    assert_eq!(page.message_count, 6);
    assert_eq!(page.messages.len(), 4);
    assert!(page.has_more);
    let cursor = page.next_cursor.unwrap();
    assert_eq!(cursor, page.messages[0].id);

    let older = ctx
        .orchestrator()
        .get_history("session-e", 4, Some(cursor))
        .await
        .unwrap();

    assert_eq!(older.messages.len(), 2);
    assert!(!older.has_more);
    assert!(older.next_cursor.is_none());

    // No overlap between pages, and together they cover all six messages.
    let mut all: Vec<_> = older
        .messages
        .iter()
        .chain(page.messages.iter())
        .map(|m| m.id)
        .collect();
    all.dedup();
    assert_eq!(all.len(), 6);
}

#[tokio::test]
async fn test_delete_conversation_then_history_is_gone() {
    let server = MockServer::start().await;
    mount_completion(&server, "ok", 1).await;
    let ctx = test_context(&server.uri()).await;

    ctx.orchestrator()
        .handle_turn(turn(Some("session-f"), "hello"))
        .await
        .unwrap();

    ctx.orchestrator()
        .delete_conversation("session-f")
        .await
        .unwrap();

    let error = ctx
        .orchestrator()
        .get_history("session-f", 10, None)
        .await
        .unwrap_err();
    assert!(matches!(error, ServiceError::NotFound { .. }));

    let error = ctx
        .orchestrator()
        .delete_conversation("session-f")
        .await
        .unwrap_err();
    assert!(matches!(error, ServiceError::NotFound { .. }));
}

#[tokio::test]
async fn test_metadata_stored_on_new_conversation() {
    let server = MockServer::start().await;
    mount_completion(&server, "hi", 1).await;
    let ctx = test_context(&server.uri()).await;

    ctx.orchestrator()
        .handle_turn(TurnRequest {
            session_id: Some("session-g".to_string()),
            message: "hello".to_string(),
            metadata: Some(json!({"channel": "web"})),
        })
        .await
        .unwrap();

    let conv = ctx
        .repo
        .find_by_session_id("session-g")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conv.metadata["channel"], "web");
}
