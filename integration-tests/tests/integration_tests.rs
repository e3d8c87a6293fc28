// Integration tests for the scene broadcast engine
// These tests drive the public engine facade across cache, delivery and scheduling

use async_trait::async_trait;
use chrono_tz::Tz;
use common::cache::{CacheStore, MemoryCacheStore};
use common::clock::{Clock, SystemClock, TokioClock};
use common::db::{BroadcastStore, MemoryStore};
use common::errors::{BoxError, ConfigurationError, EngineError};
use common::models::{
    BroadcastSummary, DeliveryResult, PushTarget, Scene, Subscription, SubscriptionId, TargetAuth,
    TargetType,
};
use common::push::Pusher;
use common::retry::ExponentialBackoff;
use common::scene::DataSource;
use common::Engine;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Data source counting its invocations
struct HotList {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl DataSource for HotList {
    async fn fetch(&self) -> Result<Value, BoxError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "fetch": n, "top": { "title": "rust 2026", "hot": 9001 } }))
    }
}

/// Pusher reporting every delivery on a channel
struct ChannelPusher {
    tx: mpsc::UnboundedSender<(String, Value)>,
}

#[async_trait]
impl Pusher for ChannelPusher {
    async fn push(
        &self,
        target: &PushTarget,
        payload: &Value,
        _template: Option<&str>,
        _timeout: Duration,
    ) -> DeliveryResult {
        let _ = self.tx.send((target.url.clone(), payload.clone()));
        DeliveryResult {
            ok: true,
            status: 200,
            body: "ok".to_string(),
            duration: Duration::from_millis(1),
        }
    }
}

/// Engine with real HTTP delivery and a fast backoff
async fn http_engine(store: Arc<MemoryStore>) -> (Engine, Arc<AtomicUsize>) {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Engine::builder(store, Arc::new(MemoryCacheStore::new(clock.clone())))
        .clock(clock)
        .retry_strategy(Arc::new(ExponentialBackoff::with_config(10, 50, 0.0)))
        .timezone(Tz::UTC)
        .build()
        .expect("engine builds");

    let calls = Arc::new(AtomicUsize::new(0));
    engine
        .register_data_source_handler("weibo_hot", Arc::new(HotList { calls: calls.clone() }))
        .await;
    (engine, calls)
}

/// Engine on simulated time with a recording pusher
async fn simulated_engine(
    store: Arc<MemoryStore>,
) -> (Engine, Arc<AtomicUsize>, mpsc::UnboundedReceiver<(String, Value)>) {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = Engine::builder(store, Arc::new(MemoryCacheStore::new(clock.clone())))
        .clock(clock)
        .pusher(Arc::new(ChannelPusher { tx }))
        .timezone(Tz::UTC)
        .build()
        .expect("engine builds");

    let calls = Arc::new(AtomicUsize::new(0));
    engine
        .register_data_source_handler("weibo_hot", Arc::new(HotList { calls: calls.clone() }))
        .await;
    (engine, calls, rx)
}

fn subscription(id: SubscriptionId, target_type: TargetType, url: String) -> Subscription {
    Subscription::new(id, "weibo", format!("subscriber-{}", id), target_type, url)
}

#[tokio::test]
async fn test_broadcast_to_mixed_channels_with_partial_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
        .expect(3)
        .mount(&server)
        .await;
    // two failing subscribers, three attempts each
    Mock::given(method("POST"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(6)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.upsert_scene(Scene::new("weibo", "weibo_hot", 300)).await;

    let ok_url = format!("{}/ok", server.uri());
    let down_url = format!("{}/down", server.uri());
    let subscribers = [
        subscription(1, TargetType::Dingtalk, ok_url.clone()),
        subscription(2, TargetType::Feishu, ok_url.clone()),
        subscription(3, TargetType::Slack, ok_url),
        subscription(4, TargetType::Webhook, down_url.clone()),
        subscription(5, TargetType::Dingtalk, down_url),
    ];
    for mut sub in subscribers {
        sub.retry_count = 2;
        store.upsert_subscription(sub).await;
    }

    let (engine, calls) = http_engine(store.clone()).await;
    let summary = engine.broadcast_to_scene("weibo").await.unwrap();

    assert_eq!(
        summary,
        BroadcastSummary {
            total: 5,
            success: 3,
            failed: 2
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let requests = server.received_requests().await.unwrap();
    let dingtalk: Value = requests
        .iter()
        .filter(|r| r.url.path() == "/ok")
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
        .find(|body| body.get("msgtype").is_some())
        .expect("dingtalk request");
    assert_eq!(dingtalk["msgtype"], "text");
    assert!(dingtalk["text"]["content"]
        .as_str()
        .unwrap()
        .contains("rust 2026"));

    for id in [1, 2, 3] {
        let sub = store.find_subscription(id).await.unwrap().unwrap();
        assert!(sub.last_triggered_at.is_some());
    }
    for id in [4, 5] {
        let sub = store.find_subscription(id).await.unwrap().unwrap();
        assert!(sub.last_triggered_at.is_none());
    }
}

#[tokio::test]
async fn test_trigger_applies_template_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("authorization", "Bearer s3cret"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.upsert_scene(Scene::new("weibo", "weibo_hot", 0)).await;
    let mut sub = subscription(10, TargetType::Webhook, format!("{}/hook", server.uri()));
    sub.target_auth = Some(TargetAuth::Bearer {
        token: "s3cret".to_string(),
    });
    sub.template = Some(r#"{"title": {{top.title}}, "score": {{top.hot}}, "extra": "{{missing.path}}"}"#.to_string());
    store.upsert_subscription(sub).await;

    let (engine, _) = http_engine(store.clone()).await;
    let result = engine.trigger_subscription(10).await.unwrap();
    assert!(result.ok);
    assert_eq!(result.status, 200);

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body,
        json!({"title": "rust 2026", "score": 9001, "extra": "{{missing.path}}"})
    );
}

#[tokio::test]
async fn test_trigger_disabled_subscription_makes_no_network_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.upsert_scene(Scene::new("weibo", "weibo_hot", 0)).await;
    let mut sub = subscription(20, TargetType::Webhook, server.uri());
    sub.enabled = false;
    store.upsert_subscription(sub).await;

    let (engine, calls) = http_engine(store).await;
    let err = engine.trigger_subscription(20).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::Configuration(ConfigurationError::SubscriptionDisabled(20))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_trigger_records_failure_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(4)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.upsert_scene(Scene::new("weibo", "weibo_hot", 0)).await;
    let mut sub = subscription(30, TargetType::Slack, server.uri());
    sub.retry_count = 3;
    store.upsert_subscription(sub).await;

    let (engine, _) = http_engine(store.clone()).await;
    let result = engine.trigger_subscription(30).await.unwrap();

    assert!(!result.ok);
    assert_eq!(result.status, 500);
    assert_eq!(result.body, "upstream exploded");
    let stored = store.find_subscription(30).await.unwrap().unwrap();
    assert!(stored.last_triggered_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_weibo_scene_cache_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_scene(Scene::new("weibo", "weibo_hot", 300)).await;
    let (engine, calls, _rx) = simulated_engine(store).await;

    engine.fetch_scene_data("weibo").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(100)).await;
    let cached = engine.fetch_scene_data("weibo").await.unwrap();
    assert_eq!(cached["fetch"], 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(201)).await;
    let fresh = engine.fetch_scene_data("weibo").await.unwrap();
    assert_eq!(fresh["fetch"], 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    engine.clear_scene_cache("weibo").await.unwrap();
    engine.fetch_scene_data("weibo").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_subscription_delivers_until_deleted() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_scene(Scene::new("weibo", "weibo_hot", 0)).await;
    store
        .upsert_subscription(
            subscription(40, TargetType::Feishu, "http://feishu.invalid/hook".to_string())
                .with_cron("*/30 * * * * *"),
        )
        .await;
    let (engine, _calls, mut rx) = simulated_engine(store.clone()).await;

    assert_eq!(engine.init_scheduler().await.unwrap(), 1);
    assert!(engine.scheduler().is_scheduled(40).await);
    assert!(store
        .find_subscription(40)
        .await
        .unwrap()
        .unwrap()
        .next_trigger_at
        .is_some());

    for _ in 0..2 {
        let (url, payload) = rx.recv().await.unwrap();
        assert_eq!(url, "http://feishu.invalid/hook");
        assert_eq!(payload["top"]["title"], "rust 2026");
    }

    store.remove_subscription(40).await;
    engine.on_subscription_deleted(40).await;
    assert!(engine.scheduler().active_jobs().await.is_empty());

    let quiet = tokio::time::timeout(Duration::from_secs(120), rx.recv()).await;
    assert!(quiet.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_subscription_edits_reschedule() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_scene(Scene::new("weibo", "weibo_hot", 0)).await;
    let (engine, _calls, _rx) = simulated_engine(store.clone()).await;

    store
        .upsert_subscription(
            subscription(50, TargetType::Webhook, "http://a.invalid".to_string())
                .with_cron("0 9 * * 1-5"),
        )
        .await;
    assert!(engine.on_subscription_changed(50).await.unwrap());

    store
        .upsert_subscription(
            subscription(50, TargetType::Webhook, "http://a.invalid".to_string()).with_cron("* * *"),
        )
        .await;
    let err = engine.on_subscription_changed(50).await.unwrap_err();
    assert!(err.is_configuration());
    assert!(!engine.scheduler().is_scheduled(50).await);

    assert_eq!(engine.reload_all_jobs().await.unwrap(), 0);
}

#[tokio::test]
async fn test_pull_subscription_returns_templated_payload() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_scene(Scene::new("weibo", "weibo_hot", 60)).await;
    let mut sub = subscription(60, TargetType::Webhook, "http://unused.invalid".to_string());
    sub.trigger_type = common::models::TriggerType::Passive;
    sub.template = Some(r#"{"headline": {{top.title}}}"#.to_string());
    store.upsert_subscription(sub).await;

    let (engine, _) = http_engine(store).await;
    assert_eq!(
        engine.pull_subscription(60).await.unwrap(),
        json!({"headline": "rust 2026"})
    );
}

#[tokio::test]
#[ignore] // Requires PostgreSQL and Redis to be running
async fn test_postgres_and_redis_end_to_end() {
    let mut settings = common::config::Settings::default();
    if let Ok(url) = std::env::var("DATABASE_URL") {
        settings.database.url = url;
    }
    if let Ok(url) = std::env::var("REDIS_URL") {
        settings.redis.url = url;
    }

    let db_pool = common::bootstrap::init_database_pool(&settings).await.unwrap();
    let cache = common::bootstrap::init_cache_store(&settings).await.unwrap();

    sqlx::query(
        "INSERT INTO scenes (name, handler, cache_ttl, enabled) VALUES ('it-weibo', 'weibo_hot', 300, true) \
         ON CONFLICT (name) DO UPDATE SET enabled = true",
    )
    .execute(db_pool.pool())
    .await
    .unwrap();

    cache.delete("fsf:scene:it-weibo").await.unwrap();
    let engine = common::bootstrap::build_engine(&settings, db_pool.clone(), cache.clone()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    engine
        .register_data_source_handler("weibo_hot", Arc::new(HotList { calls: calls.clone() }))
        .await;

    engine.fetch_scene_data("it-weibo").await.unwrap();
    engine.fetch_scene_data("it-weibo").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.get("fsf:scene:it-weibo").await.unwrap().is_some());

    engine.on_scene_changed("it-weibo").await.unwrap();
    assert!(cache.get("fsf:scene:it-weibo").await.unwrap().is_none());

    db_pool.close().await;
}
