//! Error types for payload validation.

use std::fmt;

/// A single validation failure with location information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// What went wrong
    pub message: String,
    /// JSON path to the failure (e.g., ".title", ".bullets[2]"); empty for the root
    pub path: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Top-level field this error belongs to, or `None` when it concerns the root value.
    ///
    /// `.bullets[2]` and `.meta.author` yield `bullets` and `meta`.
    pub fn field(&self) -> Option<&str> {
        let trimmed = self.path.strip_prefix('.').unwrap_or(&self.path);
        let end = trimmed.find(['.', '[']).unwrap_or(trimmed.len());
        let name = &trimmed[..end];
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

/// Outcome of validating a payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn failure(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    /// Distinct top-level field names, in first-seen order. A root-level
    /// failure (wrong payload type) is reported as `$`.
    pub fn offending_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for error in &self.errors {
            let name = error.field().unwrap_or("$");
            if !fields.iter().any(|f| f == name) {
                fields.push(name.to_string());
            }
        }
        fields
    }
}

impl From<Vec<ValidationError>> for ValidationResult {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::failure(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_and_without_path() {
        assert_eq!(ValidationError::new("Invalid type", "").to_string(), "Invalid type");
        assert_eq!(
            ValidationError::new("Invalid type", ".title").to_string(),
            ".title: Invalid type"
        );
    }

    #[test]
    fn test_field_extraction() {
        assert_eq!(ValidationError::new("x", ".bullets[2]").field(), Some("bullets"));
        assert_eq!(ValidationError::new("x", ".meta.author").field(), Some("meta"));
        assert_eq!(ValidationError::new("x", "").field(), None);
    }

    #[test]
    fn test_offending_fields_dedup() {
        let result = ValidationResult::failure(vec![
            ValidationError::new("too short", ".bullets[0]"),
            ValidationError::new("wrong type", ".bullets[1]"),
            ValidationError::new("missing", ".title"),
        ]);
        assert!(!result.is_valid());
        assert_eq!(result.offending_fields(), vec!["bullets", "title"]);
    }

    #[test]
    fn test_root_failure_reported_as_dollar() {
        let result = ValidationResult::failure(vec![ValidationError::new(
            "Expected type 'object', got 'array'",
            "",
        )]);
        assert_eq!(result.offending_fields(), vec!["$"]);
    }
}
