//! Payload validator for generated content.
//!
//! Validates JSON data against a JSON Schema subset covering both the
//! documents lowered by [`ResponseSchema`](super::ResponseSchema) and those
//! derived from Rust types with schemars:
//! - Basic type validation (string, integer, number, boolean, array, object, null)
//! - Field constraints (minLength, maxLength, minimum, maximum, pattern, enum)
//! - Array constraints (minItems, maxItems, items schema)
//! - Nested validation (recursive object and array validation)
//! - Local references (`#/definitions/...`) and `allOf` / `anyOf` / `oneOf`
//! - Additional properties control
//!
//! Patterns are compiled and references checked once, when the validator is
//! built; a bad schema is a configuration error, never a payload error.

use crate::structured::error::{ValidationError, ValidationResult};
use crate::{Error, ErrorContext, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Longest `$ref` chain followed before a schema is considered cyclic.
const MAX_REF_HOPS: usize = 32;

/// Keywords whose values are data, not subschemas.
const DATA_KEYWORDS: [&str; 4] = ["enum", "const", "default", "examples"];

/// Validator for generated payloads.
#[derive(Debug, Clone)]
pub struct PayloadValidator {
    schema: Value,
    /// Reject properties not named in the schema unless `additionalProperties` says otherwise
    strict: bool,
    patterns: Arc<HashMap<String, Regex>>,
}

impl PartialEq for PayloadValidator {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.strict == other.strict
    }
}

impl PayloadValidator {
    /// Compile every `pattern` and check every `$ref` in `schema`.
    pub fn new(schema: Value, strict: bool) -> Result<Self> {
        let mut patterns = HashMap::new();
        collect_patterns(&schema, &mut patterns)?;
        check_refs(&schema, &schema)?;
        Ok(Self {
            schema,
            strict,
            patterns: Arc::new(patterns),
        })
    }

    /// Validator that rejects undeclared properties.
    pub fn strict(schema: Value) -> Result<Self> {
        Self::new(schema, true)
    }

    /// Validator that ignores undeclared properties.
    pub fn lenient(schema: Value) -> Result<Self> {
        Self::new(schema, false)
    }

    /// Wrap a document lowered from [`Field`](super::Field)s. Lowering only
    /// emits type, length, item and range keywords, so there is nothing to
    /// compile or resolve.
    pub(crate) fn from_lowered(schema: Value) -> Self {
        Self {
            schema,
            strict: false,
            patterns: Arc::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate `data`, collecting every failure rather than stopping at the first.
    pub fn validate(&self, data: &Value) -> ValidationResult {
        let mut errors = Vec::new();
        self.validate_node(data, &self.schema, "", &mut errors);
        ValidationResult::failure(errors)
    }

    /// Follow `$ref` links to the schema they name.
    fn resolve<'a>(&'a self, mut schema: &'a Value) -> &'a Value {
        for _ in 0..MAX_REF_HOPS {
            match schema
                .get("$ref")
                .and_then(|r| r.as_str())
                .and_then(|r| lookup_ref(&self.schema, r))
            {
                Some(target) => schema = target,
                None => break,
            }
        }
        schema
    }

    fn errors_for(&self, data: &Value, schema: &Value, path: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.validate_node(data, schema, path, &mut errors);
        errors
    }

    fn validate_node(
        &self,
        data: &Value,
        schema: &Value,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        let schema = self.resolve(schema);

        let nullable = schema
            .get("nullable")
            .and_then(|n| n.as_bool())
            .unwrap_or(false);
        if nullable && data.is_null() {
            return;
        }

        if let Some(all) = schema.get("allOf").and_then(|a| a.as_array()) {
            for sub in all {
                self.validate_node(data, sub, path, errors);
            }
        }

        if let Some(any) = schema.get("anyOf").and_then(|a| a.as_array()) {
            if !any.iter().any(|sub| self.errors_for(data, sub, path).is_empty()) {
                errors.push(ValidationError::new(
                    "Value does not match any allowed schema",
                    path,
                ));
            }
        }

        if let Some(one) = schema.get("oneOf").and_then(|a| a.as_array()) {
            let matching = one
                .iter()
                .filter(|sub| self.errors_for(data, sub, path).is_empty())
                .count();
            if matching != 1 {
                errors.push(ValidationError::new(
                    format!("Value matches {} schemas, expected exactly one", matching),
                    path,
                ));
            }
        }

        let types = declared_types(schema);
        if !types.is_empty() && !types.iter().any(|t| type_matches(data, t)) {
            errors.push(ValidationError::new(
                format!(
                    "Expected type '{}', got '{}'",
                    types.join("|"),
                    type_name(data)
                ),
                path,
            ));
            return;
        }

        match data {
            Value::String(s) => self.validate_string(s, schema, path, errors),
            Value::Number(_) => {
                if let Some(num) = data.as_f64() {
                    self.validate_number(num, schema, path, errors);
                }
            }
            Value::Array(items) => self.validate_array(items, schema, path, errors),
            Value::Object(obj) => self.validate_object(obj, schema, path, errors),
            _ => {}
        }

        if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
            if !allowed.contains(data) {
                let listed: Vec<String> = allowed
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => format!("\"{}\"", s),
                        _ => v.to_string(),
                    })
                    .collect();
                errors.push(ValidationError::new(
                    format!("Value not in allowed enum values: {}", listed.join(", ")),
                    path,
                ));
            }
        }
    }

    fn validate_string(
        &self,
        s: &str,
        schema: &Value,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        let len = s.chars().count() as u64;

        if let Some(min_length) = schema.get("minLength").and_then(|m| m.as_u64()) {
            if len < min_length {
                errors.push(ValidationError::new(
                    format!("String too short (minimum {} characters)", min_length),
                    path,
                ));
            }
        }

        if let Some(max_length) = schema.get("maxLength").and_then(|m| m.as_u64()) {
            if len > max_length {
                errors.push(ValidationError::new(
                    format!("String too long (maximum {} characters)", max_length),
                    path,
                ));
            }
        }

        if let Some(pattern) = schema.get("pattern").and_then(|p| p.as_str()) {
            if let Some(re) = self.patterns.get(pattern) {
                if !re.is_match(s) {
                    errors.push(ValidationError::new(
                        format!("String does not match pattern '{}'", pattern),
                        path,
                    ));
                }
            }
        }
    }

    fn validate_number(
        &self,
        value: f64,
        schema: &Value,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        if let Some(minimum) = schema.get("minimum").and_then(|m| m.as_f64()) {
            if value < minimum {
                errors.push(ValidationError::new(
                    format!("Value below minimum ({})", minimum),
                    path,
                ));
            }
        }

        if let Some(maximum) = schema.get("maximum").and_then(|m| m.as_f64()) {
            if value > maximum {
                errors.push(ValidationError::new(
                    format!("Value above maximum ({})", maximum),
                    path,
                ));
            }
        }
    }

    fn validate_array(
        &self,
        items: &[Value],
        schema: &Value,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        if let Some(min_items) = schema.get("minItems").and_then(|m| m.as_u64()) {
            if (items.len() as u64) < min_items {
                errors.push(ValidationError::new(
                    format!("Array too short (minimum {} items)", min_items),
                    path,
                ));
            }
        }

        if let Some(max_items) = schema.get("maxItems").and_then(|m| m.as_u64()) {
            if items.len() as u64 > max_items {
                errors.push(ValidationError::new(
                    format!("Array too long (maximum {} items)", max_items),
                    path,
                ));
            }
        }

        if let Some(items_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                self.validate_node(item, items_schema, &item_path, errors);
            }
        }
    }

    fn validate_object(
        &self,
        obj: &serde_json::Map<String, Value>,
        schema: &Value,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for name in required.iter().filter_map(|v| v.as_str()) {
                if !obj.contains_key(name) {
                    errors.push(ValidationError::new(
                        format!("Missing required property: {}", name),
                        format!("{}.{}", path, name),
                    ));
                }
            }
        }

        let properties = schema.get("properties").and_then(|p| p.as_object());
        if let Some(properties) = properties {
            for (name, prop_schema) in properties {
                if let Some(value) = obj.get(name) {
                    let prop_path = format!("{}.{}", path, name);
                    self.validate_node(value, prop_schema, &prop_path, errors);
                }
            }
        }

        let declared: HashSet<&str> = properties
            .map(|p| p.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default();
        let undeclared = obj.iter().filter(|(k, _)| !declared.contains(k.as_str()));

        match schema.get("additionalProperties") {
            Some(Value::Bool(true)) => {}
            Some(Value::Bool(false)) => reject_undeclared(undeclared, path, errors),
            Some(extra_schema) if extra_schema.is_object() => {
                for (key, value) in undeclared {
                    let prop_path = format!("{}.{}", path, key);
                    self.validate_node(value, extra_schema, &prop_path, errors);
                }
            }
            _ if self.strict => reject_undeclared(undeclared, path, errors),
            _ => {}
        }
    }
}

fn reject_undeclared<'a>(
    undeclared: impl Iterator<Item = (&'a String, &'a Value)>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    for (key, _) in undeclared {
        errors.push(ValidationError::new(
            format!("Additional property not allowed: {}", key),
            format!("{}.{}", path, key),
        ));
    }
}

fn schema_error(message: impl Into<String>, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_details(details)
            .with_source("payload_validator"),
    )
}

/// Keywords whose values map names to subschemas.
const SCHEMA_MAPS: [&str; 4] = ["properties", "definitions", "$defs", "patternProperties"];

/// Direct subschemas of `schema`, skipping keywords that hold data.
fn subschemas(schema: &Value) -> Vec<&Value> {
    let mut found = Vec::new();
    match schema {
        Value::Object(map) => {
            for (key, value) in map {
                if DATA_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                match value {
                    Value::Object(named) if SCHEMA_MAPS.contains(&key.as_str()) => {
                        found.extend(named.values())
                    }
                    Value::Array(items) => found.extend(items.iter()),
                    Value::Object(_) => found.push(value),
                    _ => {}
                }
            }
        }
        Value::Array(items) => found.extend(items.iter()),
        _ => {}
    }
    found
}

fn collect_patterns(schema: &Value, patterns: &mut HashMap<String, Regex>) -> Result<()> {
    if let Some(pattern) = schema.get("pattern").and_then(|p| p.as_str()) {
        if !patterns.contains_key(pattern) {
            let re = Regex::new(pattern)
                .map_err(|e| schema_error(format!("invalid pattern '{}'", pattern), e.to_string()))?;
            patterns.insert(pattern.to_string(), re);
        }
    }
    for sub in subschemas(schema) {
        collect_patterns(sub, patterns)?;
    }
    Ok(())
}

/// Resolve a local JSON pointer reference (`#/definitions/Step`).
fn lookup_ref<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    match reference.strip_prefix('#') {
        Some("") => Some(root),
        Some(pointer) => root.pointer(pointer),
        None => None,
    }
}

fn check_refs(root: &Value, schema: &Value) -> Result<()> {
    if let Some(reference) = schema.get("$ref").and_then(|r| r.as_str()) {
        let mut current = reference;
        let mut hops = 0;
        loop {
            let target = lookup_ref(root, current).ok_or_else(|| {
                schema_error(
                    format!("unresolvable schema reference '{}'", current),
                    "only local '#/...' references are supported",
                )
            })?;
            match target.get("$ref").and_then(|r| r.as_str()) {
                Some(next) => {
                    hops += 1;
                    if hops >= MAX_REF_HOPS {
                        return Err(schema_error(
                            format!("cyclic schema reference '{}'", reference),
                            format!("more than {} chained references", MAX_REF_HOPS),
                        ));
                    }
                    current = next;
                }
                None => break,
            }
        }
    }
    for sub in subschemas(schema) {
        check_refs(root, sub)?;
    }
    Ok(())
}

/// `type` may be a single name or a list of names.
fn declared_types(schema: &Value) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(|t| t.as_str()).collect(),
        _ => Vec::new(),
    }
}

fn type_matches(data: &Value, expected: &str) -> bool {
    match expected {
        "string" => data.is_string(),
        "integer" => data.is_i64() || data.is_u64(),
        "number" => data.is_number(),
        "boolean" => data.is_boolean(),
        "array" => data.is_array(),
        "object" => data.is_object(),
        "null" => data.is_null(),
        _ => true,
    }
}

fn type_name(data: &Value) -> &'static str {
    match data {
        Value::String(_) => "string",
        Value::Number(_) if data.is_i64() || data.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "null",
    }
}
