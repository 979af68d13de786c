use super::service::GenerationService;
use crate::cache::{CacheBackend, CacheConfig, CacheKeyGenerator, CacheManager, MemoryCache};
use crate::config::GenerationConfig;
use crate::telemetry::GenerationObserver;
use crate::transport::{CompletionClient, HttpCompletionClient};
use crate::Result;
use std::sync::Arc;

/// Builder for [`GenerationService`].
///
/// Only the completion client is required. Defaults: unbounded in-memory
/// store, no expiry, unsalted keys, no-op observer.
pub struct GenerationServiceBuilder {
    client: Arc<dyn CompletionClient>,
    backend: Option<Arc<dyn CacheBackend>>,
    cache_config: CacheConfig,
    key_salt: Option<String>,
    observer: Arc<dyn GenerationObserver>,
    system_prompt: Option<String>,
}

impl GenerationServiceBuilder {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            backend: None,
            cache_config: CacheConfig::default(),
            key_salt: None,
            observer: crate::telemetry::noop_observer(),
            system_prompt: None,
        }
    }

    /// HTTP client, store, expiry and key salt as described by `config`.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(HttpCompletionClient::new(config)?);
        let mut builder = Self::new(client)
            .cache_backend(config.cache_backend())
            .cache_config(config.cache_config());
        if let Some(salt) = &config.key_salt {
            builder = builder.key_salt(salt.clone());
        }
        Ok(builder)
    }

    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Mix `salt` into every key so a template change starts a fresh cache.
    pub fn key_salt(mut self, salt: impl Into<String>) -> Self {
        self.key_salt = Some(salt.into());
        self
    }

    pub fn observer(mut self, observer: Arc<dyn GenerationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// System message sent ahead of every prompt.
    pub fn system_prompt(mut self, text: impl Into<String>) -> Self {
        self.system_prompt = Some(text.into());
        self
    }

    pub fn build(self) -> GenerationService {
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryCache::new()));
        let keys = match self.key_salt {
            Some(salt) => CacheKeyGenerator::new().with_salt(salt),
            None => CacheKeyGenerator::new(),
        };
        GenerationService::from_parts(
            self.client,
            CacheManager::new(self.cache_config, backend),
            keys,
            self.observer,
            self.system_prompt,
        )
    }
}
