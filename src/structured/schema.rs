//! Declarative response schemas.
//!
//! A [`ResponseSchema`] describes the shape every generated payload of one kind
//! must satisfy. It lowers to a JSON Schema document, which drives both the
//! [`PayloadValidator`] and the field listing embedded in prompts.

use crate::structured::error::ValidationResult;
use crate::structured::validator::PayloadValidator;
use crate::{Error, Result};
use serde_json::{json, Map, Value};

/// Type of a single schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    List(Box<FieldType>),
    Object(Vec<Field>),
    /// A string restricted to the listed values.
    OneOf(Vec<String>),
}

impl FieldType {
    fn to_schema(&self) -> Value {
        match self {
            FieldType::String => json!({"type": "string"}),
            FieldType::Integer => json!({"type": "integer"}),
            FieldType::Number => json!({"type": "number"}),
            FieldType::Boolean => json!({"type": "boolean"}),
            FieldType::List(item) => json!({"type": "array", "items": item.to_schema()}),
            FieldType::Object(fields) => object_schema(fields, false),
            FieldType::OneOf(values) => json!({"type": "string", "enum": values}),
        }
    }
}

/// A named field with optionality and constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: Option<String>,
    constraints: Map<String, Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            description: None,
            constraints: Map::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn string_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::List(Box::new(FieldType::String)))
    }

    pub fn object(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self::new(name, FieldType::Object(fields))
    }

    pub fn one_of(name: impl Into<String>, values: &[&str]) -> Self {
        Self::new(
            name,
            FieldType::OneOf(values.iter().map(|v| v.to_string()).collect()),
        )
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn min_length(self, n: u64) -> Self {
        self.constraint("minLength", json!(n))
    }

    pub fn max_length(self, n: u64) -> Self {
        self.constraint("maxLength", json!(n))
    }

    pub fn min_items(self, n: u64) -> Self {
        self.constraint("minItems", json!(n))
    }

    pub fn max_items(self, n: u64) -> Self {
        self.constraint("maxItems", json!(n))
    }

    pub fn range(self, min: f64, max: f64) -> Self {
        self.constraint("minimum", json!(min))
            .constraint("maximum", json!(max))
    }

    fn constraint(mut self, key: &str, value: Value) -> Self {
        self.constraints.insert(key.to_string(), value);
        self
    }

    fn to_schema(&self) -> Value {
        let mut schema = self.field_type.to_schema();
        if let Value::Object(map) = &mut schema {
            for (k, v) in &self.constraints {
                map.insert(k.clone(), v.clone());
            }
            if let Some(desc) = &self.description {
                map.insert("description".into(), desc.clone().into());
            }
        }
        schema
    }
}

fn object_schema(fields: &[Field], strict: bool) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in fields {
        properties.insert(field.name.clone(), field.to_schema());
        if field.required {
            required.push(Value::String(field.name.clone()));
        }
    }

    let mut map = Map::new();
    map.insert("type".into(), json!("object"));
    map.insert("properties".into(), properties.into());
    if !required.is_empty() {
        map.insert("required".into(), required.into());
    }
    if strict {
        map.insert("additionalProperties".into(), json!(false));
    }
    map.into()
}

/// One line of a schema's field listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSummary {
    pub name: String,
    pub type_label: String,
    pub required: bool,
    pub description: Option<String>,
}

/// Shape every generated payload of one kind must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    name: String,
    validator: PayloadValidator,
}

impl ResponseSchema {
    /// Object schema from declared fields; undeclared properties are ignored.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            validator: PayloadValidator::from_lowered(object_schema(&fields, false)),
        }
    }

    /// Object schema from declared fields; undeclared properties are rejected.
    pub fn strict(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            validator: PayloadValidator::from_lowered(object_schema(&fields, true)),
        }
    }

    /// Wrap an existing JSON Schema document. Fails when a `pattern` does not
    /// compile or a `$ref` does not resolve inside the document.
    pub fn from_json_schema(name: impl Into<String>, document: Value) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            validator: PayloadValidator::lenient(document)?,
        })
    }

    /// Derive the schema from a Rust type. Nested types land in
    /// `definitions` and are reached through `$ref`.
    pub fn from_type<T: schemars::JsonSchema>(name: impl Into<String>) -> Result<Self> {
        let root = schemars::schema_for!(T);
        let document = serde_json::to_value(&root).map_err(Error::Serialization)?;
        Self::from_json_schema(name, document)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lowered JSON Schema document.
    pub fn document(&self) -> &Value {
        self.validator.schema()
    }

    pub fn validate(&self, payload: &Value) -> ValidationResult {
        self.validator.validate(payload)
    }

    /// Top-level fields, sorted by name.
    pub fn field_summaries(&self) -> Vec<FieldSummary> {
        let document = self.document();
        let required: Vec<&str> = document
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        document
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| {
                props
                    .iter()
                    .map(|(name, schema)| FieldSummary {
                        name: name.clone(),
                        type_label: type_label(schema),
                        required: required.contains(&name.as_str()),
                        description: schema
                            .get("description")
                            .and_then(|d| d.as_str())
                            .map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn type_label(schema: &Value) -> String {
    if let Some(reference) = schema.get("$ref").and_then(|r| r.as_str()) {
        return reference.rsplit('/').next().unwrap_or(reference).to_string();
    }
    for combinator in ["anyOf", "oneOf", "allOf"] {
        if let Some(branches) = schema.get(combinator).and_then(|b| b.as_array()) {
            return branches.iter().map(type_label).collect::<Vec<_>>().join("|");
        }
    }
    if let Some(values) = schema.get("enum").and_then(|e| e.as_array()) {
        let listed: Vec<String> = values
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect();
        return format!("one of {}", listed.join("|"));
    }
    match schema.get("type") {
        Some(Value::String(t)) if t == "array" => {
            let item = schema.get("items").map(type_label).unwrap_or_else(|| "any".into());
            format!("array<{}>", item)
        }
        Some(Value::String(t)) => t.clone(),
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join("|"),
        _ => "any".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_schema_lowering() {
        let schema = ResponseSchema::new(
            "demo",
            vec![
                Field::string("title").min_length(1),
                Field::string_list("bullets").min_items(1),
                Field::integer("minutes").optional(),
            ],
        );
        let doc = schema.document();
        assert_eq!(doc["type"], "object");
        assert_eq!(doc["properties"]["title"]["minLength"], 1);
        assert_eq!(doc["properties"]["bullets"]["items"]["type"], "string");
        assert_eq!(doc["required"], json!(["title", "bullets"]));
        assert!(doc.get("additionalProperties").is_none());
    }

    #[test]
    fn test_strict_schema_rejects_extras() {
        let schema = ResponseSchema::strict("demo", vec![Field::string("title")]);
        assert_eq!(schema.document()["additionalProperties"], false);
        assert!(!schema.validate(&json!({"title": "t", "x": 1})).is_valid());
    }

    #[test]
    fn test_nested_object_and_one_of() {
        let schema = ResponseSchema::new(
            "demo",
            vec![
                Field::object("meta", vec![Field::string("author")]),
                Field::one_of("level", &["Beginner", "Advanced"]),
            ],
        );
        let result = schema.validate(&json!({"meta": {}, "level": "Expert"}));
        assert_eq!(result.offending_fields(), vec!["level", "meta"]);
    }

    #[test]
    fn test_field_summaries() {
        let schema = ResponseSchema::new(
            "demo",
            vec![
                Field::string("title").describe("Short heading"),
                Field::string_list("bullets").optional(),
                Field::one_of("level", &["Beginner", "Advanced"]),
            ],
        );
        let summaries = schema.field_summaries();
        let bullets = summaries.iter().find(|s| s.name == "bullets").unwrap();
        assert_eq!(bullets.type_label, "array<string>");
        assert!(!bullets.required);
        let title = summaries.iter().find(|s| s.name == "title").unwrap();
        assert_eq!(title.description.as_deref(), Some("Short heading"));
        let level = summaries.iter().find(|s| s.name == "level").unwrap();
        assert_eq!(level.type_label, "one of Beginner|Advanced");
    }

    #[derive(schemars::JsonSchema)]
    #[allow(dead_code)]
    struct Quote {
        text: String,
        author: Option<String>,
    }

    #[test]
    fn test_from_type() {
        let schema = ResponseSchema::from_type::<Quote>("quote").unwrap();
        assert_eq!(schema.document()["properties"]["text"]["type"], "string");
        assert!(schema.validate(&json!({"text": "Know thyself"})).is_valid());
        assert!(!schema.validate(&json!({"author": "Socrates"})).is_valid());
    }

    #[derive(schemars::JsonSchema)]
    #[allow(dead_code)]
    struct Step {
        label: String,
        minutes: u32,
    }

    #[derive(schemars::JsonSchema)]
    #[allow(dead_code)]
    struct Plan {
        title: String,
        steps: Vec<Step>,
        warmup: Option<Step>,
    }

    #[test]
    fn test_from_type_validates_nested_types() {
        let schema = ResponseSchema::from_type::<Plan>("plan").unwrap();
        let valid = json!({
            "title": "Evening",
            "steps": [{"label": "inhale", "minutes": 2}],
            "warmup": null
        });
        assert!(schema.validate(&valid).is_valid());

        let result = schema.validate(&json!({
            "title": "Evening",
            "steps": [{"label": 7, "minutes": 2}],
            "warmup": {"label": "stretch"}
        }));
        assert_eq!(result.offending_fields(), vec!["steps", "warmup"]);
        assert!(result
            .errors
            .iter()
            .any(|e| e.path == ".steps[0].label"));

        let summaries = schema.field_summaries();
        let steps = summaries.iter().find(|s| s.name == "steps").unwrap();
        assert_eq!(steps.type_label, "array<Step>");
        let warmup = summaries.iter().find(|s| s.name == "warmup").unwrap();
        assert_eq!(warmup.type_label, "Step|null");
    }

    #[test]
    fn test_from_json_schema_rejects_invalid_pattern() {
        let err = ResponseSchema::from_json_schema(
            "code",
            json!({"type": "object", "properties": {"code": {"type": "string", "pattern": "[a-z"}}}),
        )
        .unwrap_err();
        assert_eq!(err.class(), "configuration");
    }
}
