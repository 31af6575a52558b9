// tests/notify_webhook.rs
//
// Webhook sink against a loopback receiver, plus fan-out behaviour of the mux.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

use listing_monitor::notify::{NewItemEvent, NewItemSink, NotifierMux, RecentItems, WebhookSink};

mod common;

#[derive(Clone, Default)]
struct Receiver {
    attempts: Arc<AtomicUsize>,
    fail_first: usize,
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn hook(State(rx): State<Receiver>, Json(body): Json<Value>) -> StatusCode {
    let n = rx.attempts.fetch_add(1, Ordering::SeqCst);
    if n < rx.fail_first {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    rx.bodies.lock().push(body);
    StatusCode::NO_CONTENT
}

async fn spawn_receiver(fail_first: usize) -> (String, Receiver) {
    let rx = Receiver {
        fail_first,
        ..Default::default()
    };
    let app = Router::new().route("/hook", post(hook)).with_state(rx.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), rx)
}

fn event(id: &str) -> NewItemEvent {
    NewItemEvent {
        scope: "akiba".into(),
        record: common::record(id, Utc::now()),
    }
}

#[tokio::test]
async fn webhook_retries_then_delivers() {
    let (url, rx) = spawn_receiver(1).await;
    let sink = WebhookSink::new(url).with_retries(3).with_timeout(2);

    sink.notify(&event("X1")).await.unwrap();

    assert_eq!(rx.attempts.load(Ordering::SeqCst), 2);
    let bodies = rx.bodies.lock();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["item"]["item_id"], "X1");
    assert_eq!(bodies[0]["item"]["scope"], "akiba");
    assert_eq!(bodies[0]["embeds"][0]["title"], "card X1");
}

#[tokio::test]
async fn webhook_gives_up_after_max_retries() {
    let (url, rx) = spawn_receiver(usize::MAX).await;
    let sink = WebhookSink::new(url).with_retries(2).with_timeout(2);

    assert!(sink.notify(&event("X1")).await.is_err());
    assert_eq!(rx.attempts.load(Ordering::SeqCst), 2);
}

struct Broken;

#[async_trait]
impl NewItemSink for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn notify(&self, _event: &NewItemEvent) -> anyhow::Result<()> {
        anyhow::bail!("sink offline")
    }
}

#[tokio::test]
async fn failing_sink_does_not_block_the_rest() {
    let recent = Arc::new(RecentItems::with_capacity(10));
    let mux = NotifierMux::new()
        .with(Arc::new(Broken))
        .with(recent.clone());
    assert_eq!(mux.len(), 2);

    mux.notify(&event("X1")).await;
    mux.notify(&event("X2")).await;

    let ids: Vec<String> = recent
        .snapshot_last_n(10)
        .into_iter()
        .map(|e| e.record.item_id)
        .collect();
    assert_eq!(ids, vec!["X1", "X2"]);
}
