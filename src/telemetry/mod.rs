//! Observability for generation calls.
//!
//! The service reports what happened on each call to an injected
//! [`GenerationObserver`]; nothing is buffered in process-wide state.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`GenerationEvent`] | Typed event emitted by the service |
//! | [`GenerationObserver`] | Trait for event destinations |
//! | [`NoopObserver`] | Default, discards events |
//! | [`TracingObserver`] | Forwards events to `tracing` |
//! | [`InMemoryObserver`] | Bounded in-memory buffer for tests and diagnostics pages |
//! | [`CompositeObserver`] | Fans out to several observers |
//!
//! [`init_tracing`] installs the process's `tracing` subscriber exactly once.

use crate::cache::InsertOutcome;
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    CacheHit {
        kind: String,
        key: String,
    },
    CacheMiss {
        kind: String,
        key: String,
    },
    Generated {
        kind: String,
        key: String,
        outcome: InsertOutcome,
        elapsed_ms: u64,
    },
    /// The call failed with one of the generation errors.
    Rejected {
        kind: String,
        key: String,
        error_class: &'static str,
        message: String,
    },
    FallbackServed {
        kind: String,
        error_class: &'static str,
    },
}

impl GenerationEvent {
    pub fn kind(&self) -> &str {
        match self {
            GenerationEvent::CacheHit { kind, .. }
            | GenerationEvent::CacheMiss { kind, .. }
            | GenerationEvent::Generated { kind, .. }
            | GenerationEvent::Rejected { kind, .. }
            | GenerationEvent::FallbackServed { kind, .. } => kind,
        }
    }
}

#[async_trait]
pub trait GenerationObserver: Send + Sync {
    async fn report(&self, event: GenerationEvent) -> Result<()>;
}

pub struct NoopObserver;

#[async_trait]
impl GenerationObserver for NoopObserver {
    async fn report(&self, _event: GenerationEvent) -> Result<()> {
        Ok(())
    }
}

pub fn noop_observer() -> Arc<dyn GenerationObserver> {
    Arc::new(NoopObserver)
}

/// Emits each event as a structured `tracing` record.
#[derive(Debug, Default)]
pub struct TracingObserver;

#[async_trait]
impl GenerationObserver for TracingObserver {
    async fn report(&self, event: GenerationEvent) -> Result<()> {
        match &event {
            GenerationEvent::CacheHit { kind, key } => {
                tracing::debug!(%kind, %key, "generation cache hit")
            }
            GenerationEvent::CacheMiss { kind, key } => {
                tracing::debug!(%kind, %key, "generation cache miss")
            }
            GenerationEvent::Generated {
                kind,
                key,
                outcome,
                elapsed_ms,
            } => tracing::info!(%kind, %key, ?outcome, elapsed_ms, "generated payload"),
            GenerationEvent::Rejected {
                kind,
                key,
                error_class,
                message,
            } if *error_class == "upstream_unavailable" => {
                tracing::error!(%kind, %key, error_class, %message, "generation failed")
            }
            GenerationEvent::Rejected {
                kind,
                key,
                error_class,
                message,
            } => tracing::warn!(%kind, %key, error_class, %message, "generation rejected"),
            GenerationEvent::FallbackServed { kind, error_class } => {
                tracing::warn!(%kind, error_class, "served static fallback")
            }
        }
        Ok(())
    }
}

/// Keeps the most recent `capacity` events.
pub struct InMemoryObserver {
    events: Mutex<VecDeque<GenerationEvent>>,
    capacity: usize,
}

impl InMemoryObserver {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn events(&self) -> Vec<GenerationEvent> {
        self.events
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn events_for_kind(&self, kind: &str) -> Vec<GenerationEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl GenerationObserver for InMemoryObserver {
    async fn report(&self, event: GenerationEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            if events.len() == self.capacity {
                events.pop_front();
            }
            events.push_back(event);
        }
        Ok(())
    }
}

/// Forwards every event to each inner observer.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn GenerationObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn GenerationObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

#[async_trait]
impl GenerationObserver for CompositeObserver {
    async fn report(&self, event: GenerationEvent) -> Result<()> {
        let results = futures::future::join_all(
            self.observers.iter().map(|o| o.report(event.clone())),
        )
        .await;
        results.into_iter().collect()
    }
}

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Install a `fmt` subscriber filtered by `RUST_LOG`, or `default_filter`
/// when the variable is unset. Returns `true` only for the call that
/// installed it; later calls (or a subscriber set elsewhere) are no-ops.
pub fn init_tracing(default_filter: &str) -> bool {
    let mut installed = false;
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .is_ok();
    });
    installed
}
