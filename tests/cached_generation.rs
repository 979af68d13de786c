//! End-to-end behaviour of the cached generation flow with an in-process model

use aion_generation::cache::{CacheBackend, CacheConfig, CacheParams, FileCache, MemoryCache};
use aion_generation::generation::PracticeDetail;
use aion_generation::structured::{Field, ResponseSchema};
use aion_generation::telemetry::{GenerationEvent, InMemoryObserver};
use aion_generation::transport::{Completion, CompletionClient, CompletionRequest};
use aion_generation::{Error, GenerationService, Kind, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BOX_BREATHING: &str = r#"<json>{"title":"Box Breathing","body":"...","bullets":["a","b"],"coach_prompts":["c"],"safety_reminders":["d"],"est_time_min":5}</json>"#;

/// Always answers with the same text and counts calls.
struct FixedModel {
    reply: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FixedModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for FixedModel {
    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Completion::text(self.reply.clone()))
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

fn breathwork() -> CacheParams {
    CacheParams::new()
        .with("moduleId", "breathwork")
        .with("level", "Beginner")
}

#[tokio::test]
async fn test_practice_detail_is_generated_once() {
    let model = FixedModel::new(BOX_BREATHING);
    let service = GenerationService::builder(model.clone()).build();

    let first = service
        .generate_kind(Kind::PracticeDetail, &breathwork())
        .await
        .unwrap();
    assert_eq!(
        first,
        json!({
            "title": "Box Breathing",
            "body": "...",
            "bullets": ["a", "b"],
            "coach_prompts": ["c"],
            "safety_reminders": ["d"],
            "est_time_min": 5
        })
    );

    // Parameter order does not matter.
    let reordered = CacheParams::new()
        .with("level", "Beginner")
        .with("moduleId", "breathwork");
    let second = service
        .generate_kind(Kind::PracticeDetail, &reordered)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_typed_practice_detail() {
    let model = FixedModel::new(BOX_BREATHING);
    let service = GenerationService::builder(model).build();
    let kind = Kind::PracticeDetail;

    let detail: PracticeDetail = service
        .generate_typed(kind.as_str(), &breathwork(), &kind.schema(), &kind.prompt(&breathwork()))
        .await
        .unwrap();
    assert_eq!(detail.title, "Box Breathing");
    assert_eq!(detail.est_time_min, 5);
}

#[tokio::test]
async fn test_reply_without_json_is_malformed() {
    let model = FixedModel::new("I would rather not answer in a structured format today.");
    let service = GenerationService::builder(model.clone()).build();

    let err = service
        .generate_kind(Kind::PracticeDetail, &breathwork())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedGeneration { .. }), "got {err}");
    assert_eq!(service.cache().len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_truncated_reply_is_malformed() {
    let model = FixedModel::new(r#"<json>{"title":"Box Breathing","bullets":["a","#);
    let service = GenerationService::builder(model).build();

    let err = service
        .generate_kind(Kind::PracticeDetail, &breathwork())
        .await
        .unwrap_err();
    assert_eq!(err.class(), "malformed_generation");
}

#[tokio::test]
async fn test_schema_failure_is_not_cached() {
    let model = FixedModel::new(r#"{"title":"Box Breathing","est_time_min":"five"}"#);
    let service = GenerationService::builder(model.clone()).build();

    for _ in 0..2 {
        let err = service
            .generate_kind(Kind::PracticeDetail, &breathwork())
            .await
            .unwrap_err();
        match err {
            Error::SchemaViolation { kind, fields, .. } => {
                assert_eq!(kind, "practice_detail");
                assert!(fields.contains(&"est_time_min".to_string()));
                assert!(fields.contains(&"bullets".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    // Both calls reached the model.
    assert_eq!(model.calls(), 2);
}

#[derive(schemars::JsonSchema)]
#[allow(dead_code)]
struct Step {
    label: String,
    minutes: u32,
}

#[derive(schemars::JsonSchema)]
#[allow(dead_code)]
struct Routine {
    title: String,
    steps: Vec<Step>,
}

#[tokio::test]
async fn test_nested_type_violation_is_not_cached() {
    let model = FixedModel::new(r#"<json>{"title":"Evening","steps":[{"label":"inhale","minutes":"two"}]}</json>"#);
    let service = GenerationService::builder(model.clone()).build();
    let schema = ResponseSchema::from_type::<Routine>("routine").unwrap();
    let params = CacheParams::new().with("slot", "evening");

    for _ in 0..2 {
        let err = service
            .generate("routine", &params, &schema, "Plan an evening routine")
            .await
            .unwrap_err();
        match err {
            Error::SchemaViolation { fields, details, .. } => {
                assert_eq!(fields, vec!["steps".to_string()]);
                assert!(details.iter().any(|d| d.starts_with(".steps[0].minutes")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(model.calls(), 2);
    assert_eq!(service.cache().len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_payload_among_prose_with_invisible_characters() {
    let reply = format!(
        "Sure!\u{00A0}Here you go:\n\u{FEFF}{}\u{200B}\nEnjoy.",
        r#"{"philosopher":"Seneca","reply":"Begin at once to live."}"#
    );
    let model = FixedModel::new(&reply);
    let service = GenerationService::builder(model).build();

    let payload = service
        .generate_kind(
            Kind::PhilosopherReply,
            &CacheParams::new().with("philosopher", "Seneca").with("message", "hi"),
        )
        .await
        .unwrap();
    assert_eq!(payload["reply"], "Begin at once to live.");
}

#[tokio::test]
async fn test_fallback_is_served_and_observed() {
    let model = FixedModel::new("no json here");
    let observer = Arc::new(InMemoryObserver::new(32));
    let service = GenerationService::builder(model)
        .observer(observer.clone())
        .build();

    let payload = service
        .generate_kind_or_fallback(Kind::HiddenWisdom, &CacheParams::new().with("date", "2024-05-01"))
        .await
        .unwrap();
    assert_eq!(payload, Kind::HiddenWisdom.fallback());

    let events = observer.events_for_kind("hidden_wisdom");
    assert!(events.iter().any(|e| matches!(
        e,
        GenerationEvent::Rejected {
            error_class: "malformed_generation",
            ..
        }
    )));
    assert!(matches!(
        events.last(),
        Some(GenerationEvent::FallbackServed { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_identical_keys_keep_first_write() {
    let model = FixedModel::slow(BOX_BREATHING, Duration::from_millis(50));
    let service = Arc::new(GenerationService::builder(model.clone()).build());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .generate_kind(Kind::PracticeDetail, &breathwork())
                    .await
            })
        })
        .collect();

    let mut payloads = Vec::new();
    for handle in handles {
        payloads.push(handle.await.unwrap().unwrap());
    }

    assert!(payloads.windows(2).all(|w| w[0] == w[1]));
    assert!(model.calls() >= 1);
    assert_eq!(service.cache().len().await.unwrap(), 1);
    let stats = service.cache().stats();
    assert_eq!(stats.inserts, 1);
    assert_eq!(stats.inserts + stats.duplicates, model.calls() as u64);
}

#[tokio::test]
async fn test_file_cache_survives_service_restart() {
    let dir = tempfile::tempdir().unwrap();
    let model = FixedModel::new(BOX_BREATHING);

    let backend: Arc<dyn CacheBackend> = Arc::new(FileCache::new(dir.path()));
    let first = GenerationService::builder(model.clone())
        .cache_backend(backend)
        .build();
    first
        .generate_kind(Kind::PracticeDetail, &breathwork())
        .await
        .unwrap();

    let backend: Arc<dyn CacheBackend> = Arc::new(FileCache::new(dir.path()));
    let second = GenerationService::builder(model.clone())
        .cache_backend(backend)
        .build();
    second
        .generate_kind(Kind::PracticeDetail, &breathwork())
        .await
        .unwrap();

    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_expired_entry_is_regenerated() {
    let model = FixedModel::new(r#"{"text":"fresh"}"#);
    let schema = ResponseSchema::new("note", vec![Field::string("text")]);
    let backend = Arc::new(MemoryCache::new());
    let service = GenerationService::builder(model.clone())
        .cache_backend(backend)
        .cache_config(CacheConfig::new().with_kind_ttl("note", Duration::from_millis(20)))
        .build();
    let params = CacheParams::new().with("id", 1);

    service.generate("note", &params, &schema, "p").await.unwrap();
    service.generate("note", &params, &schema, "p").await.unwrap();
    assert_eq!(model.calls(), 1);

    tokio::time::sleep(Duration::from_millis(40)).await;
    service.generate("note", &params, &schema, "p").await.unwrap();
    assert_eq!(model.calls(), 2);
    assert_eq!(service.cache().stats().expired, 1);
}
