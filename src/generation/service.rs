//! Cached, schema-validated generation.

use super::builder::GenerationServiceBuilder;
use super::kinds::Kind;
use crate::cache::{CacheKey, CacheKeyGenerator, CacheManager, CacheParams};
use crate::config::GenerationConfig;
use crate::structured::{extract_payload, ResponseSchema};
use crate::telemetry::{GenerationEvent, GenerationObserver};
use crate::transport::{CompletionClient, CompletionRequest};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Turns `(kind, params, schema, prompt)` into a validated payload, calling
/// the model only when no live entry exists for the derived key.
///
/// Extraction and schema failures are terminal for the call and are never
/// cached; a later identical call goes back to the model.
pub struct GenerationService {
    client: Arc<dyn CompletionClient>,
    cache: CacheManager,
    keys: CacheKeyGenerator,
    observer: Arc<dyn GenerationObserver>,
    system_prompt: Option<String>,
}

impl GenerationService {
    pub fn builder(client: Arc<dyn CompletionClient>) -> GenerationServiceBuilder {
        GenerationServiceBuilder::new(client)
    }

    /// HTTP client, store, expiry and key salt as described by `config`.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        Ok(GenerationServiceBuilder::from_config(config)?.build())
    }

    pub(crate) fn from_parts(
        client: Arc<dyn CompletionClient>,
        cache: CacheManager,
        keys: CacheKeyGenerator,
        observer: Arc<dyn GenerationObserver>,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            client,
            cache,
            keys,
            observer,
            system_prompt,
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn key_for(&self, kind: &str, params: &CacheParams) -> CacheKey {
        self.keys.generate(kind, params)
    }

    pub async fn generate(
        &self,
        kind: &str,
        params: &CacheParams,
        schema: &ResponseSchema,
        prompt: &str,
    ) -> Result<Value> {
        let key = self.key_for(kind, params);

        if let Some(entry) = self.cache.lookup(&key).await? {
            self.report(GenerationEvent::CacheHit {
                kind: kind.to_string(),
                key: key.hash.clone(),
            })
            .await;
            return Ok(entry.payload);
        }
        self.report(GenerationEvent::CacheMiss {
            kind: kind.to_string(),
            key: key.hash.clone(),
        })
        .await;

        let started = Instant::now();
        let payload = match self.produce(kind, schema, prompt).await {
            Ok(payload) => payload,
            Err(e) => {
                if e.is_generation_failure() {
                    self.report(GenerationEvent::Rejected {
                        kind: kind.to_string(),
                        key: key.hash.clone(),
                        error_class: e.class(),
                        message: e.to_string(),
                    })
                    .await;
                }
                return Err(e);
            }
        };

        let hash = key.hash.clone();
        let outcome = self.cache.store(key, payload.clone()).await?;
        self.report(GenerationEvent::Generated {
            kind: kind.to_string(),
            key: hash,
            outcome,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
        .await;
        Ok(payload)
    }

    /// [`generate`](Self::generate), then deserialize the payload into `T`.
    pub async fn generate_typed<T: DeserializeOwned>(
        &self,
        kind: &str,
        params: &CacheParams,
        schema: &ResponseSchema,
        prompt: &str,
    ) -> Result<T> {
        let payload = self.generate(kind, params, schema, prompt).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Generate a catalog kind with its own schema and prompt template.
    pub async fn generate_kind(&self, kind: Kind, params: &CacheParams) -> Result<Value> {
        self.generate(kind.as_str(), params, &kind.schema(), &kind.prompt(params))
            .await
    }

    /// Like [`generate`](Self::generate), but any generation failure yields
    /// `fallback` instead. The fallback is never cached. Store and
    /// configuration errors still propagate.
    pub async fn generate_or_fallback(
        &self,
        kind: &str,
        params: &CacheParams,
        schema: &ResponseSchema,
        prompt: &str,
        fallback: Value,
    ) -> Result<Value> {
        match self.generate(kind, params, schema, prompt).await {
            Ok(payload) => Ok(payload),
            Err(e) if e.is_generation_failure() => {
                self.report(GenerationEvent::FallbackServed {
                    kind: kind.to_string(),
                    error_class: e.class(),
                })
                .await;
                Ok(fallback)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn generate_kind_or_fallback(&self, kind: Kind, params: &CacheParams) -> Result<Value> {
        self.generate_or_fallback(
            kind.as_str(),
            params,
            &kind.schema(),
            &kind.prompt(params),
            kind.fallback(),
        )
        .await
    }

    async fn produce(&self, kind: &str, schema: &ResponseSchema, prompt: &str) -> Result<Value> {
        let mut request = CompletionRequest::from_prompt(prompt);
        if let Some(system) = &self.system_prompt {
            request = request.system(system.clone());
        }

        let completion = self.client.complete(&request).await?;
        let extracted =
            extract_payload(&completion.text).map_err(|e| Error::malformed(&e, &completion.text))?;
        debug!(%kind, source = ?extracted.source, "extracted payload");

        let result = schema.validate(&extracted.value);
        if !result.is_valid() {
            return Err(Error::SchemaViolation {
                kind: kind.to_string(),
                fields: result.offending_fields(),
                details: result.error_messages(),
            });
        }
        Ok(extracted.value)
    }

    async fn report(&self, event: GenerationEvent) {
        if let Err(e) = self.observer.report(event).await {
            debug!(error = %e, "generation observer failed");
        }
    }
}
