//! Prompt construction.

use crate::cache::CacheParams;
use crate::structured::{FieldSummary, ResponseSchema};

/// Composes a generation prompt: persona, task, context lines, and the
/// output contract (field listing plus `<json>` delimiter instruction).
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    persona: Option<String>,
    task: String,
    context: Vec<(String, String)>,
    fields: Vec<FieldSummary>,
}

impl PromptBuilder {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn context(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.context.push((name.into(), value.to_string()));
        self
    }

    pub fn context_params(mut self, params: &CacheParams) -> Self {
        for (name, value) in params.iter() {
            self.context.push((name.clone(), value.to_string()));
        }
        self
    }

    pub fn schema(mut self, schema: &ResponseSchema) -> Self {
        self.fields = schema.field_summaries();
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::new();
        if let Some(persona) = &self.persona {
            out.push_str(persona.trim());
            out.push_str("\n\n");
        }
        out.push_str(self.task.trim());
        out.push_str("\n\n");

        if !self.context.is_empty() {
            out.push_str("Context:\n");
            for (name, value) in &self.context {
                out.push_str(&format!("- {}: {}\n", name, value));
            }
            out.push('\n');
        }

        out.push_str("Respond with a single JSON object wrapped in <json></json> tags");
        if self.fields.is_empty() {
            out.push_str(".\n");
        } else {
            out.push_str(" with these fields:\n");
            for field in &self.fields {
                let necessity = if field.required { "required" } else { "optional" };
                match &field.description {
                    Some(desc) => out.push_str(&format!(
                        "- {} ({}, {}): {}\n",
                        field.name, field.type_label, necessity, desc
                    )),
                    None => out.push_str(&format!(
                        "- {} ({}, {})\n",
                        field.name, field.type_label, necessity
                    )),
                }
            }
        }
        out.push_str("Do not write anything outside the tags.");
        out
    }
}
