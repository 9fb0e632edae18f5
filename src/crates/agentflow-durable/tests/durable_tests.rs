//! Integration tests for durable session entities.
//!
//! Time is driven by a manual clock and eviction checks are dispatched
//! explicitly, the way a durable-task backend would deliver self-signals.

use agentflow_agents::{ChatAgent, ChatClient, ChatMessage, ChatOptions, ChatResponse};
use agentflow_durable::{
    Clock, DurableError, DurableSessionHost, DurableSessionOptions, DurableStateStore,
    InMemoryDurableStateStore, ManualClock, RunRequest, SessionEntityId,
};
use agentflow_host::{AgentCatalog, HostEnvironment, HostError};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Client that answers with the size of the conversation it was shown.
struct CountingClient;

#[async_trait]
impl ChatClient for CountingClient {
    async fn respond(
        &self,
        messages: Vec<ChatMessage>,
        _options: &ChatOptions,
    ) -> agentflow_agents::Result<ChatResponse> {
        Ok(ChatResponse::from_text(format!("saw {}", messages.len())))
    }
}

struct Fixture {
    host: DurableSessionHost,
    store: Arc<InMemoryDurableStateStore>,
    clock: Arc<ManualClock>,
}

async fn fixture(options: DurableSessionOptions) -> Fixture {
    let environment = HostEnvironment::new(Arc::new(CountingClient));
    let catalog = Arc::new(AgentCatalog::new());
    catalog
        .register(
            "scribe",
            Arc::new(|environment: &HostEnvironment| {
                ChatAgent::builder("scribe", environment.chat_client())
                    .build()
                    .map_err(HostError::Agent)
            }),
            &environment,
        )
        .await
        .unwrap();

    let store = Arc::new(InMemoryDurableStateStore::new());
    let clock = Arc::new(ManualClock::starting_at(
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
    ));
    let host = DurableSessionHost::with_clock(
        store.clone(),
        catalog,
        environment,
        options,
        clock.clone(),
    );
    Fixture { host, store, clock }
}

fn minute_ttl_options() -> DurableSessionOptions {
    DurableSessionOptions::new()
        .with_default_time_to_live(Some(Duration::from_secs(60)))
        .with_min_signal_delay(Duration::ZERO)
        .unwrap()
}

#[tokio::test]
async fn ttl_eviction_deletes_state_after_expiry() {
    let Fixture { host, store, clock } = fixture(minute_ttl_options()).await;
    let id = SessionEntityId::new("scribe", "user-1");
    let started_at = clock.now();

    let response = host
        .run(&id, RunRequest::new("c1", vec![ChatMessage::user("hello")]))
        .await
        .unwrap();
    assert_eq!(response.messages[0].text(), "saw 1");

    let state = store.load(&id).await.unwrap().unwrap();
    assert_eq!(state.log.len(), 2);
    assert_eq!(
        state.expiration_time_utc.unwrap(),
        started_at + chrono::Duration::seconds(60)
    );

    // Before expiry the check keeps the state.
    clock.advance(Duration::from_secs(30));
    host.check_and_delete_if_expired(&id).await.unwrap();
    assert!(store.contains(&id).await);

    // 90 seconds past the start the session is gone, atomically.
    clock.advance(Duration::from_secs(60));
    host.check_and_delete_if_expired(&id).await.unwrap();
    assert!(!store.contains(&id).await);

    // A post-expiration run starts a clean state; nothing from before
    // expiration is retrievable.
    let response = host
        .run(&id, RunRequest::new("c2", vec![ChatMessage::user("again")]))
        .await
        .unwrap();
    assert_eq!(response.messages[0].text(), "saw 1");
    assert_eq!(store.load(&id).await.unwrap().unwrap().log.len(), 2);
}

#[tokio::test]
async fn unregistered_agents_fail_by_name() {
    let Fixture { host, store, .. } = fixture(minute_ttl_options()).await;
    let id = SessionEntityId::new("ghost", "user-1");

    let err = host
        .run(&id, RunRequest::new("c1", vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    assert!(matches!(err, DurableError::AgentNotRegistered { name } if name == "ghost"));
    let _ = store;
}

#[tokio::test]
async fn runs_are_idempotent_per_correlation_id() {
    let Fixture { host, store, .. } = fixture(minute_ttl_options()).await;
    let id = SessionEntityId::new("scribe", "user-1");
    let request = RunRequest::new("c1", vec![ChatMessage::user("hello")]);

    let first = host.run(&id, request.clone()).await.unwrap();
    let second = host.run(&id, request).await.unwrap();

    assert_eq!(first.messages, second.messages);
    assert_eq!(store.load(&id).await.unwrap().unwrap().log.len(), 2);
}

#[tokio::test]
async fn empty_requests_change_nothing() {
    let Fixture { host, store, .. } = fixture(minute_ttl_options()).await;
    let id = SessionEntityId::new("scribe", "user-1");

    let response = host.run(&id, RunRequest::new("c1", vec![])).await.unwrap();
    assert!(response.messages.is_empty());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn each_run_sees_the_concatenated_history() {
    let Fixture { host, .. } = fixture(minute_ttl_options()).await;
    let id = SessionEntityId::new("scribe", "user-1");

    host.run(&id, RunRequest::new("c1", vec![ChatMessage::user("one")]))
        .await
        .unwrap();
    let second = host
        .run(&id, RunRequest::new("c2", vec![ChatMessage::user("two")]))
        .await
        .unwrap();

    // user(one) + reply + user(two)
    assert_eq!(second.messages[0].text(), "saw 3");
}

#[tokio::test]
async fn disabled_ttl_leaves_no_expiration() {
    let options = DurableSessionOptions::new().with_default_time_to_live(None);
    let Fixture { host, store, .. } = fixture(options).await;
    let id = SessionEntityId::new("scribe", "user-1");

    host.run(&id, RunRequest::new("c1", vec![ChatMessage::user("hi")]))
        .await
        .unwrap();
    assert!(store.load(&id).await.unwrap().unwrap().expiration_time_utc.is_none());
}

#[tokio::test]
async fn refreshing_runs_push_the_expiration_forward() {
    let Fixture { host, store, clock } = fixture(minute_ttl_options()).await;
    let id = SessionEntityId::new("scribe", "user-1");

    host.run(&id, RunRequest::new("c1", vec![ChatMessage::user("one")]))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(45));
    host.run(&id, RunRequest::new("c2", vec![ChatMessage::user("two")]))
        .await
        .unwrap();

    // 75 seconds after the first run the refreshed TTL still holds.
    clock.advance(Duration::from_secs(30));
    host.check_and_delete_if_expired(&id).await.unwrap();
    assert!(store.contains(&id).await);

    clock.advance(Duration::from_secs(60));
    host.check_and_delete_if_expired(&id).await.unwrap();
    assert!(!store.contains(&id).await);
}
