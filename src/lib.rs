//! # aion-generation
//!
//! Cached, schema-validated generation for the Aion coaching app.
//!
//! ## Overview
//!
//! Content such as practice guides, daily quotations and philosopher replies
//! is produced by an external text model. The model is slow, costs money and
//! does not always answer in well-formed JSON. This crate puts a cache and a
//! validation gate in front of it: a `(kind, parameters)` pair is generated
//! at most once, and only payloads that pass the kind's schema are stored.
//!
//! ## Key Features
//!
//! - **Deterministic keys**: canonical parameter encoding hashed with SHA-256
//! - **Write-once store**: first write wins, in memory or on disk
//! - **Tolerant extraction**: `<json>` tags, code fences or JSON among prose
//! - **Schema gate**: named offending fields on violation
//! - **Observers**: per-call events instead of process-wide log buffers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aion_generation::cache::CacheParams;
//! use aion_generation::generation::Kind;
//! use aion_generation::{GenerationConfig, GenerationService};
//!
//! #[tokio::main]
//! async fn main() -> aion_generation::Result<()> {
//!     let service = GenerationService::from_config(&GenerationConfig::from_env()?)?;
//!     let params = CacheParams::new().with("philosopher", "Seneca").with("message", "I feel stuck");
//!     let reply = service.generate_kind(Kind::PhilosopherReply, &params).await?;
//!     println!("{}", reply["reply"]);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`generation`] | The cached generation service, prompts and kind catalog |
//! | [`cache`] | Keys, stores and expiry |
//! | [`structured`] | Payload extraction and schema validation |
//! | [`transport`] | Completion client trait and HTTP implementation |
//! | [`telemetry`] | Generation observers and tracing setup |
//! | [`config`] | YAML and environment configuration |
//! | [`types`] | Chat message types |

pub mod cache;
pub mod config;
pub mod generation;
pub mod structured;
pub mod telemetry;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::GenerationConfig;
pub use generation::{GenerationService, GenerationServiceBuilder, Kind};
pub use telemetry::{GenerationEvent, GenerationObserver};
pub use types::message::{Message, MessageRole};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
