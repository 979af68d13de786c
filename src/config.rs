//! Runtime configuration.
//!
//! Settings come from an optional YAML file, then `AION_*` environment
//! variables override individual keys:
//!
//! | Variable | Key |
//! |----------|-----|
//! | `AION_BASE_URL` | `base_url` |
//! | `AION_MODEL` | `model` |
//! | `AION_TEMPERATURE` | `temperature` |
//! | `AION_MAX_TOKENS` | `max_tokens` |
//! | `AION_HTTP_TIMEOUT_SECS` | `timeout_secs` |
//! | `AION_CACHE_ENABLED` | `cache_enabled` |
//! | `AION_CACHE_DIR` | `cache_dir` |
//! | `AION_CACHE_CAPACITY` | `cache_capacity` |
//! | `AION_CACHE_TTL_SECS` | `default_ttl_secs` |
//! | `AION_CACHE_KEY_SALT` | `key_salt` |

use crate::cache::{CacheBackend, CacheConfig, FileCache, MemoryCache};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    pub cache_enabled: bool,
    /// File-backed store root; the in-memory store is used when unset.
    pub cache_dir: Option<PathBuf>,
    /// LRU bound for the in-memory store.
    pub cache_capacity: Option<usize>,
    pub default_ttl_secs: Option<u64>,
    pub kind_ttl_secs: HashMap<String, u64>,
    /// Mixed into every cache key; bump when prompt templates change.
    pub key_salt: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: Some(0.7),
            max_tokens: Some(1200),
            timeout_secs: 30,
            cache_enabled: true,
            cache_dir: None,
            cache_capacity: None,
            default_ttl_secs: None,
            kind_ttl_secs: HashMap::new(),
            key_salt: None,
        }
    }
}

impl GenerationConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                "invalid YAML configuration",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                "cannot read configuration file",
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// YAML file when given, else defaults; then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        base.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `AION_*` overrides resolved through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AION_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("AION_MODEL") {
            self.model = v;
        }
        if let Some(v) = lookup("AION_TEMPERATURE") {
            self.temperature = Some(parse_var("AION_TEMPERATURE", &v)?);
        }
        if let Some(v) = lookup("AION_MAX_TOKENS") {
            self.max_tokens = Some(parse_var("AION_MAX_TOKENS", &v)?);
        }
        if let Some(v) = lookup("AION_HTTP_TIMEOUT_SECS") {
            self.timeout_secs = parse_var("AION_HTTP_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("AION_CACHE_ENABLED") {
            self.cache_enabled = parse_var("AION_CACHE_ENABLED", &v)?;
        }
        if let Some(v) = lookup("AION_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("AION_CACHE_CAPACITY") {
            self.cache_capacity = Some(parse_var("AION_CACHE_CAPACITY", &v)?);
        }
        if let Some(v) = lookup("AION_CACHE_TTL_SECS") {
            self.default_ttl_secs = Some(parse_var("AION_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("AION_CACHE_KEY_SALT") {
            self.key_salt = Some(v);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            Error::configuration_with_context(
                "invalid base URL",
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_details(e.to_string()),
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::configuration_with_context(
                format!("unsupported URL scheme '{}'", parsed.scheme()),
                ErrorContext::new().with_field_path("base_url"),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::configuration_with_context(
                "timeout must be positive",
                ErrorContext::new().with_field_path("timeout_secs"),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "model must not be empty",
                ErrorContext::new().with_field_path("model"),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::new().with_enabled(self.cache_enabled);
        if let Some(secs) = self.default_ttl_secs {
            config = config.with_default_ttl(Duration::from_secs(secs));
        }
        for (kind, secs) in &self.kind_ttl_secs {
            config = config.with_kind_ttl(kind.clone(), Duration::from_secs(*secs));
        }
        config
    }

    /// Store selected by `cache_dir` / `cache_capacity`.
    pub fn cache_backend(&self) -> Arc<dyn CacheBackend> {
        match (&self.cache_dir, self.cache_capacity) {
            (Some(dir), _) => Arc::new(FileCache::new(dir.clone())),
            (None, Some(cap)) => Arc::new(MemoryCache::with_capacity(cap)),
            (None, None) => Arc::new(MemoryCache::new()),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        Error::configuration_with_context(
            format!("invalid value {:?}", raw),
            ErrorContext::new()
                .with_field_path(name)
                .with_details(e.to_string())
                .with_source("env"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = GenerationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let config = GenerationConfig::default()
            .with_overrides(lookup(&[
                ("AION_MODEL", "gpt-4o"),
                ("AION_HTTP_TIMEOUT_SECS", "5"),
                ("AION_CACHE_TTL_SECS", "3600"),
                ("AION_CACHE_ENABLED", "false"),
            ]))
            .unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.default_ttl_secs, Some(3600));
        assert!(!config.cache_enabled);
    }

    #[test]
    fn test_bad_env_value_is_error() {
        let err = GenerationConfig::default()
            .with_overrides(lookup(&[("AION_MAX_TOKENS", "lots")]))
            .unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("AION_MAX_TOKENS")
        );
    }

    #[test]
    fn test_yaml_with_kind_ttls() {
        let config = GenerationConfig::from_yaml_str(
            r#"
base_url: "http://localhost:8080/v1"
model: "local-model"
cache_dir: "/var/cache/aion"
kind_ttl_secs:
  hidden_wisdom: 86400
"#,
        )
        .unwrap();
        assert_eq!(config.model, "local-model");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.cache_backend().name(), "file");
        assert_eq!(
            config.cache_config().ttl_for("hidden_wisdom"),
            Some(Duration::from_secs(86_400))
        );
        assert_eq!(config.cache_config().ttl_for("practice_detail"), None);
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(GenerationConfig::from_yaml_str("base_url: \"ftp://example.com\"").is_err());
        assert!(GenerationConfig::from_yaml_str("base_url: \"not a url\"").is_err());
    }
}
