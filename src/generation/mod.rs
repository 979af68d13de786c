//! Cached generation service and the built-in kind catalog.
//!
//! ## Example
//!
//! ```rust,no_run
//! use aion_generation::cache::CacheParams;
//! use aion_generation::generation::{GenerationService, Kind};
//! use aion_generation::GenerationConfig;
//!
//! #[tokio::main]
//! async fn main() -> aion_generation::Result<()> {
//!     let service = GenerationService::from_config(&GenerationConfig::from_env()?)?;
//!     let params = CacheParams::new()
//!         .with("moduleId", "breathwork")
//!         .with("level", "Beginner");
//!     let detail = service.generate_kind_or_fallback(Kind::PracticeDetail, &params).await?;
//!     println!("{}", detail["title"]);
//!     Ok(())
//! }
//! ```

mod builder;
pub mod kinds;
pub mod prompt;
mod service;

pub use builder::GenerationServiceBuilder;
pub use kinds::{HiddenWisdom, Kind, PhilosopherReply, PracticeDetail};
pub use prompt::PromptBuilder;
pub use service::GenerationService;
