//! Structured output: extraction, response schemas, and validation.
//!
//! - [`extract_payload`]: recover a JSON payload from raw completion text
//! - [`ResponseSchema`]: declarative shape of a kind's payload
//! - [`PayloadValidator`]: recursive JSON Schema subset validator
//!
//! # Examples
//!
//! ```
//! use aion_generation::structured::{extract_payload, Field, ResponseSchema};
//!
//! let schema = ResponseSchema::new(
//!     "quote",
//!     vec![Field::string("text"), Field::string("author").optional()],
//! );
//!
//! let extracted = extract_payload("Here: <json>{\"text\": \"Know thyself\"}</json>").unwrap();
//! assert!(schema.validate(&extracted.value).is_valid());
//! ```

pub mod error;
pub mod extract;
pub mod schema;
pub mod validator;

pub use error::{ValidationError, ValidationResult};
pub use extract::{extract_payload, sanitize, ExtractedPayload, ExtractionError, PayloadSource};
pub use schema::{Field, FieldSummary, FieldType, ResponseSchema};
pub use validator::PayloadValidator;
