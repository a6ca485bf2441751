//! Chat sessions driven end to end with in-memory retrieval and scripted models.

use std::sync::Arc;
use std::time::Duration;

use ragchat_model::{ChatMessage, MockChatModel, MockThreadedModel, Role};
use ragchat_retrieval::{
    InMemoryVectorStore, IngestionPipeline, MockEmbeddingProvider, RagConfig, RetrievalPipeline,
    RetryPolicy,
};
use ragchat_session::{
    ChatRequest, ChatSession, ConversationState, Generator, SessionError, SessionManager,
    SessionPhase, SessionServices,
};

const ZOMATO: &str = "Zomato share price rose 5%";
const WEATHER: &str = "Weather forecast for tomorrow";
const QUESTION: &str = "How is Zomato stock doing?";

fn provider() -> MockEmbeddingProvider {
    MockEmbeddingProvider::new(3)
        .with_vector(ZOMATO, vec![0.9, 0.1, 0.0])
        .with_vector(WEATHER, vec![0.0, 0.1, 0.9])
        .with_vector(QUESTION, vec![0.85, 0.2, 0.05])
}

fn config() -> RagConfig {
    RagConfig::builder().retry(RetryPolicy::none()).build().unwrap()
}

struct Fixture {
    ingestion: Arc<IngestionPipeline>,
    retrieval: Arc<RetrievalPipeline>,
}

fn fixture(provider: MockEmbeddingProvider) -> Fixture {
    let provider = Arc::new(provider);
    let store = Arc::new(InMemoryVectorStore::new());
    let ingestion = IngestionPipeline::builder()
        .config(config())
        .embedding_provider(provider.clone())
        .vector_store(store.clone())
        .build()
        .unwrap();
    let retrieval = RetrievalPipeline::builder()
        .config(config())
        .embedding_provider(provider)
        .vector_store(store)
        .build()
        .unwrap();
    Fixture { ingestion: Arc::new(ingestion), retrieval: Arc::new(retrieval) }
}

async fn seeded() -> Fixture {
    let fixture = fixture(provider());
    fixture.ingestion.ingest(ZOMATO, "A").await.unwrap();
    fixture.ingestion.ingest(WEATHER, "B").await.unwrap();
    fixture
}

fn local_session(fixture: &Fixture, model: &MockChatModel) -> ChatSession {
    let services =
        SessionServices::new(fixture.retrieval.clone(), Generator::Local(Arc::new(model.clone())));
    ChatSession::new("s1", ConversationState::local(), services).unwrap()
}

#[tokio::test]
async fn answer_uses_the_top_document_and_extends_history() {
    let fixture = seeded().await;
    let model = MockChatModel::new().with_reply("Zomato is up 5%.");
    let mut session = local_session(&fixture, &model);

    let reply = session.respond(ChatRequest::new(QUESTION)).await.unwrap();
    assert_eq!(reply, "Zomato is up 5%.");

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    let sent = &prompts[0];
    assert_eq!(sent[0].role, Role::System);
    let user = sent.last().unwrap();
    assert_eq!(user.role, Role::User);
    assert!(user.content.contains("Context: Zomato share price rose 5%\n"));
    assert!(!user.content.contains(WEATHER));
    assert!(user.content.ends_with("Question: How is Zomato stock doing?\n\nAnswer:"));

    let turns = session.state().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0], *user);
    assert_eq!(turns[1], ChatMessage::assistant("Zomato is up 5%."));
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn second_turn_replays_the_first() {
    let fixture = seeded().await;
    let model = MockChatModel::new().with_reply("first").with_reply("second");
    let mut session = local_session(&fixture, &model);

    session.respond(ChatRequest::new(QUESTION)).await.unwrap();
    session.respond(ChatRequest::new("And the weather?")).await.unwrap();

    let prompts = model.prompts();
    let second = &prompts[1];
    let roles: Vec<Role> = second.iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
    assert_eq!(second[2].content, "first");
    assert_eq!(session.state().turns().len(), 4);
}

#[tokio::test]
async fn empty_index_falls_back_to_no_context() {
    let fixture = fixture(provider());
    let model = MockChatModel::new();
    let mut session = local_session(&fixture, &model);

    session.respond(ChatRequest::new(QUESTION)).await.unwrap();

    let user = model.prompts()[0].last().cloned().unwrap();
    assert!(user.content.contains("Context: No relevant context found.\n"));
}

#[tokio::test]
async fn generation_failure_leaves_history_untouched() {
    let fixture = seeded().await;
    let model = MockChatModel::new().with_failure("provider down").with_reply("recovered");
    let mut session = local_session(&fixture, &model);

    let err = session.respond(ChatRequest::new(QUESTION)).await.unwrap_err();
    assert_eq!(err.kind(), "generation_unavailable");
    assert!(session.state().turns().is_empty());
    assert_eq!(session.phase(), SessionPhase::Idle);

    let reply = session.respond(ChatRequest::new(QUESTION)).await.unwrap();
    assert_eq!(reply, "recovered");
    assert_eq!(session.state().turns().len(), 2);
}

#[tokio::test]
async fn embedding_failure_never_reaches_the_model() {
    let fixture = fixture(provider().fail_on(QUESTION));
    let model = MockChatModel::new();
    let mut session = local_session(&fixture, &model);

    let err = session.respond(ChatRequest::new(QUESTION)).await.unwrap_err();
    assert!(matches!(err, SessionError::Retrieval(_)));
    assert_eq!(err.kind(), "embedding_unavailable");
    assert!(model.prompts().is_empty());
    assert!(session.state().turns().is_empty());
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let fixture = seeded().await;
    let model = MockChatModel::new();
    let mut session = local_session(&fixture, &model);

    let err = session.respond(ChatRequest::new("   ")).await.unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert!(model.prompts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_generation_times_out() {
    let fixture = seeded().await;
    let model = MockChatModel::new().with_delay(Duration::from_secs(5));
    let services =
        SessionServices::new(fixture.retrieval.clone(), Generator::Local(Arc::new(model)))
            .with_generation_timeout(Duration::from_millis(100));
    let mut session = ChatSession::new("s1", ConversationState::local(), services).unwrap();

    let err = session.respond(ChatRequest::new(QUESTION)).await.unwrap_err();
    assert_eq!(err.kind(), "generation_unavailable");
    assert!(err.to_string().contains("no response within"));
    assert!(session.state().turns().is_empty());
}

#[tokio::test]
async fn request_sources_are_ingested_before_retrieval() {
    let fixture = fixture(provider());
    let model = MockChatModel::new();
    let services =
        SessionServices::new(fixture.retrieval.clone(), Generator::Local(Arc::new(model.clone())))
            .with_ingestion(fixture.ingestion.clone());
    let mut session = ChatSession::new("s1", ConversationState::local(), services).unwrap();

    let request = ChatRequest::new(QUESTION).with_sources([ZOMATO, " "]);
    session.respond(request).await.unwrap();

    let user = model.prompts()[0].last().cloned().unwrap();
    assert!(user.content.contains("Context: Zomato share price rose 5%\n"));
}

#[test]
fn state_must_match_the_generator() {
    let fixture = fixture(provider());
    let services = SessionServices::new(
        fixture.retrieval.clone(),
        Generator::Local(Arc::new(MockChatModel::new())),
    );
    let err = ChatSession::new("s1", ConversationState::remote("thread_1"), services).unwrap_err();
    assert_eq!(err.kind(), "mode_mismatch");
}

#[tokio::test(start_paused = true)]
async fn phases_advance_and_concurrent_requests_are_rejected() {
    let fixture = seeded().await;
    let model = MockChatModel::new().with_delay(Duration::from_secs(1)).with_reply("done");
    let manager = SessionManager::new(SessionServices::new(
        fixture.retrieval.clone(),
        Generator::Local(Arc::new(model)),
    ));
    let id = manager.create_session().await.unwrap();
    assert_eq!(manager.phase(&id).await, Some(SessionPhase::Idle));

    let first = tokio::spawn({
        let manager = manager.clone();
        let id = id.clone();
        async move { manager.respond(Some(id.as_str()), ChatRequest::new(QUESTION)).await }
    });

    while manager.phase(&id).await != Some(SessionPhase::AwaitingGeneration) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let err = manager.respond(Some(id.as_str()), ChatRequest::new(QUESTION)).await.unwrap_err();
    match err {
        SessionError::Busy { session_id } => assert_eq!(session_id, id),
        other => panic!("unexpected error: {other:?}"),
    }

    let reply = first.await.unwrap().unwrap();
    assert_eq!(reply.thread_id, id);
    assert_eq!(reply.reply, "done");
    assert_eq!(manager.phase(&id).await, Some(SessionPhase::Idle));
    assert_eq!(manager.state(&id).await.unwrap().turns().len(), 2);
}

#[tokio::test]
async fn manager_creates_sessions_on_demand() {
    let fixture = seeded().await;
    let manager = SessionManager::new(SessionServices::new(
        fixture.retrieval.clone(),
        Generator::Local(Arc::new(MockChatModel::new())),
    ));
    assert!(manager.is_empty().await);

    let fresh = manager.respond(None, ChatRequest::new(QUESTION)).await.unwrap();
    assert!(manager.contains(&fresh.thread_id).await);

    let named = manager.respond(Some("client-42"), ChatRequest::new(QUESTION)).await.unwrap();
    assert_eq!(named.thread_id, "client-42");
    manager.respond(Some("client-42"), ChatRequest::new("again")).await.unwrap();

    assert_eq!(manager.len().await, 2);
    assert_eq!(manager.state("client-42").await.unwrap().turns().len(), 4);
    assert!(manager.phase("missing").await.is_none());
}

#[tokio::test]
async fn thread_mode_sends_the_templated_prompt_to_the_thread() {
    let fixture = seeded().await;
    let model = MockThreadedModel::new().with_reply("one").with_reply("two");
    let manager = SessionManager::new(SessionServices::new(
        fixture.retrieval.clone(),
        Generator::Remote(Arc::new(model.clone())),
    ));

    let first = manager.respond(None, ChatRequest::new(QUESTION)).await.unwrap();
    assert_eq!(first.thread_id, "thread_mock_1");
    assert_eq!(first.reply, "one");

    let second =
        manager.respond(Some(first.thread_id.as_str()), ChatRequest::new(QUESTION)).await.unwrap();
    assert_eq!(second.thread_id, first.thread_id);
    assert_eq!(second.reply, "two");

    assert_eq!(model.thread_count(), 1);
    let sent = model.messages("thread_mock_1");
    assert_eq!(sent.len(), 2);
    assert!(sent[0].starts_with("You are an AI assistant."));
    assert!(sent[0].contains("Context: Zomato share price rose 5%\n"));

    let state = manager.state("thread_mock_1").await.unwrap();
    assert_eq!(state.thread_id(), Some("thread_mock_1"));
    assert!(state.turns().is_empty());
}

#[tokio::test]
async fn thread_mode_adopts_client_thread_ids() {
    let fixture = seeded().await;
    let model = MockThreadedModel::new();
    let manager = SessionManager::new(SessionServices::new(
        fixture.retrieval.clone(),
        Generator::Remote(Arc::new(model.clone())),
    ));

    let err = manager.respond(Some("thread_elsewhere"), ChatRequest::new(QUESTION)).await;
    assert_eq!(err.unwrap_err().kind(), "generation_unavailable");
    let state = manager.state("thread_elsewhere").await.unwrap();
    assert_eq!(state.thread_id(), Some("thread_elsewhere"));
    assert_eq!(model.thread_count(), 0);
}

#[tokio::test]
async fn blank_message_creates_no_session() {
    let fixture = seeded().await;
    let model = MockThreadedModel::new();
    let manager = SessionManager::new(SessionServices::new(
        fixture.retrieval.clone(),
        Generator::Remote(Arc::new(model.clone())),
    ));

    let err = manager.respond(None, ChatRequest::new("")).await.unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert!(manager.is_empty().await);
    assert_eq!(model.thread_count(), 0);
}

#[tokio::test]
async fn malformed_thread_ids_are_rejected_before_the_provider() {
    let fixture = seeded().await;
    let model = MockThreadedModel::new();
    let manager = SessionManager::new(SessionServices::new(
        fixture.retrieval.clone(),
        Generator::Remote(Arc::new(model.clone())),
    ));

    let long = "t".repeat(200);
    let ids = ["../assistants/asst_1?x=", "thread_1/runs", "thread 1", "thread_1#x", long.as_str()];
    for id in ids {
        let err = manager.respond(Some(id), ChatRequest::new(QUESTION)).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)), "{id:?} accepted");
        assert!(!manager.contains(id).await);
    }
    assert!(manager.is_empty().await);
    assert_eq!(model.thread_count(), 0);
    assert!(model.messages("../assistants/asst_1?x=").is_empty());
}

#[tokio::test]
async fn capacity_evicts_the_least_recently_used_session() {
    let fixture = seeded().await;
    let evicted = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let recorder = evicted.clone();
    let manager = SessionManager::new(SessionServices::new(
        fixture.retrieval.clone(),
        Generator::Local(Arc::new(MockChatModel::new())),
    ))
    .with_capacity(2)
    .with_eviction_listener(move |id| recorder.lock().unwrap().push(id.to_string()));

    manager.respond(Some("a"), ChatRequest::new(QUESTION)).await.unwrap();
    manager.respond(Some("b"), ChatRequest::new(QUESTION)).await.unwrap();
    // "a" becomes the most recent, so "b" goes first.
    manager.respond(Some("a"), ChatRequest::new(QUESTION)).await.unwrap();
    manager.respond(Some("c"), ChatRequest::new(QUESTION)).await.unwrap();

    assert_eq!(manager.len().await, 2);
    assert!(manager.contains("a").await);
    assert!(!manager.contains("b").await);
    assert!(manager.contains("c").await);
    assert_eq!(*evicted.lock().unwrap(), ["b"]);

    for i in 0..50 {
        let id = format!("client-{i}");
        manager.respond(Some(id.as_str()), ChatRequest::new(QUESTION)).await.unwrap();
    }
    assert_eq!(manager.len().await, 2);
    assert_eq!(evicted.lock().unwrap().len(), 51);

    assert!(manager.remove("client-49").await);
    assert!(!manager.remove("client-49").await);
    assert_eq!(evicted.lock().unwrap().last().map(String::as_str), Some("client-49"));
}
