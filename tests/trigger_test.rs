//! Trigger adapters: permanent vs transient failures, and the push transport
//! over a real socket.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use stage_advance::bus::MemoryBus;
use stage_advance::engine::{ClaimEngine, EngineConfig};
use stage_advance::model::{Article, ItemStatus};
use stage_advance::store::MemoryStore;
use stage_advance::trigger::{Disposition, decode_push, decode_queue_message, dispatch, push};
use tokio::sync::Notify;

const CHANNEL: &str = "integration";

fn envelope(data: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "message": {"data": STANDARD.encode(data), "messageId": "1234"},
        "subscription": "projects/demo/subscriptions/staged-articles"
    }))
    .unwrap()
}

fn healthy() -> (Arc<MemoryStore>, Arc<MemoryBus>, ClaimEngine) {
    let store = Arc::new(MemoryStore::with_items([Article::received("A1", "hello")]));
    let bus = Arc::new(MemoryBus::new());
    let engine = ClaimEngine::new(store.clone(), bus.clone(), EngineConfig::new(CHANNEL));
    (store, bus, engine)
}

#[tokio::test]
async fn malformed_payload_is_rejected_even_when_everything_is_healthy() {
    let (store, bus, engine) = healthy();

    let disposition = dispatch(&engine, decode_push(b"{\"message\": {}}")).await;

    assert_eq!(disposition, Disposition::Reject);
    assert_eq!(store.snapshot()[0].status, ItemStatus::Received);
    assert_eq!(bus.attempts(), 0);
}

#[tokio::test]
async fn healthy_payload_with_unavailable_store_is_retried() {
    let (store, _bus, engine) = healthy();
    store.set_unavailable(true);

    let disposition = dispatch(&engine, decode_push(&envelope("A1"))).await;

    assert_eq!(disposition, Disposition::Nack);
}

#[tokio::test]
async fn publish_failure_is_retried() {
    let (_store, bus, engine) = healthy();
    bus.set_failing(true);

    let disposition = dispatch(&engine, decode_push(&envelope(""))).await;

    assert_eq!(disposition, Disposition::Nack);
}

#[tokio::test]
async fn nothing_to_do_is_acknowledged() {
    let store = Arc::new(MemoryStore::new());
    let engine = ClaimEngine::new(store, Arc::new(MemoryBus::new()), EngineConfig::new(CHANNEL));

    assert_eq!(
        dispatch(&engine, decode_push(&envelope(""))).await,
        Disposition::Ack
    );
    assert_eq!(
        dispatch(&engine, decode_queue_message(&json!("missing-id"))).await,
        Disposition::Ack
    );
}

#[tokio::test]
async fn queue_message_naming_an_article_advances_it() {
    let (store, bus, engine) = healthy();

    let disposition = dispatch(&engine, decode_queue_message(&json!({"id": "A1"}))).await;

    assert_eq!(disposition, Disposition::Ack);
    assert_eq!(
        store.snapshot()[0].status,
        ItemStatus::ProcessedForIntegration
    );
    assert_eq!(bus.messages(CHANNEL), ["A1"]);
}

// ---------------------------------------------------------------------------
// Push transport over HTTP
// ---------------------------------------------------------------------------

async fn spawn_push(engine: ClaimEngine) -> (String, Arc<Notify>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(Notify::new());
    tokio::spawn(push::serve(listener, Arc::new(engine), shutdown.clone()));
    (format!("http://{addr}"), shutdown)
}

#[tokio::test]
async fn push_transport_maps_outcomes_to_status_codes() {
    let (store, bus, engine) = healthy();
    let (base, shutdown) = spawn_push(engine).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(health.status(), 200);

    let advanced = client
        .post(&base)
        .body(envelope("A1"))
        .send()
        .await
        .unwrap();
    assert_eq!(advanced.status(), 204);
    assert_eq!(bus.messages(CHANNEL), ["A1"]);

    let again = client
        .post(&base)
        .body(envelope("A1"))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 204);
    assert_eq!(bus.messages(CHANNEL), ["A1"]);

    let malformed = client
        .post(&base)
        .body("not an envelope")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);

    store.set_unavailable(true);
    let unavailable = client
        .post(&base)
        .body(envelope(""))
        .send()
        .await
        .unwrap();
    assert_eq!(unavailable.status(), 500);

    let unhealthy = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(unhealthy.status(), 503);

    store.set_unavailable(false);
    let recovered = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(recovered.status(), 200);

    shutdown.notify_one();
}
