//! Built-in content kinds.
//!
//! Each kind bundles its response schema, a prompt template over its key
//! parameters, and a static fallback payload that satisfies the schema.

use super::prompt::PromptBuilder;
use crate::cache::CacheParams;
use crate::structured::{Field, ResponseSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Step-by-step guide for one practice module at a given level.
    PracticeDetail,
    /// A daily quotation with interpretation.
    HiddenWisdom,
    /// A philosopher's answer to a user message.
    PhilosopherReply,
}

impl Kind {
    pub const ALL: [Kind; 3] = [Kind::PracticeDetail, Kind::HiddenWisdom, Kind::PhilosopherReply];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::PracticeDetail => "practice_detail",
            Kind::HiddenWisdom => "hidden_wisdom",
            Kind::PhilosopherReply => "philosopher_reply",
        }
    }

    pub fn schema(&self) -> ResponseSchema {
        match self {
            Kind::PracticeDetail => ResponseSchema::new(
                self.as_str(),
                vec![
                    Field::string("title").min_length(1).describe("Name of the practice"),
                    Field::string("body").min_length(1).describe("Guidance in a few short paragraphs"),
                    Field::string_list("bullets").min_items(1).describe("Concrete steps"),
                    Field::string_list("coach_prompts").describe("Questions the coach can ask"),
                    Field::string_list("safety_reminders"),
                    Field::integer("est_time_min").range(1.0, 180.0).describe("Estimated minutes"),
                ],
            ),
            Kind::HiddenWisdom => ResponseSchema::new(
                self.as_str(),
                vec![
                    Field::string("quote").min_length(1),
                    Field::string("philosopher").min_length(1),
                    Field::string("interpretation").describe("What the quote means for daily life"),
                    Field::string("reflection_question"),
                    Field::string("source").optional().describe("Work the quote comes from"),
                ],
            ),
            Kind::PhilosopherReply => ResponseSchema::new(
                self.as_str(),
                vec![
                    Field::string("philosopher").min_length(1),
                    Field::string("reply").min_length(1).max_length(4000),
                    Field::string_list("follow_up_questions").max_items(3).optional(),
                ],
            ),
        }
    }

    /// Prompt for this kind, filled from its key parameters.
    pub fn prompt(&self, params: &CacheParams) -> String {
        let builder = match self {
            Kind::PracticeDetail => PromptBuilder::new(
                "Write a practice guide for the module below, pitched at the given level. \
                 Keep steps concrete and safe for a general audience.",
            )
            .persona("You are a calm, practical coach grounded in Stoic and contemplative traditions."),
            Kind::HiddenWisdom => PromptBuilder::new(
                "Choose one authentic quotation from a classical philosopher and explain it \
                 plainly. Do not invent quotations.",
            )
            .persona("You are a historian of philosophy."),
            Kind::PhilosopherReply => {
                let philosopher = params
                    .get("philosopher")
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "Seneca".to_string());
                PromptBuilder::new(
                    "Answer the user's message in your own voice, in at most three short \
                     paragraphs, then suggest follow-up questions.",
                )
                .persona(format!("You are {}. Speak as they wrote.", philosopher))
            }
        };
        builder.context_params(params).schema(&self.schema()).build()
    }

    /// Static payload served when generation fails.
    pub fn fallback(&self) -> Value {
        match self {
            Kind::PracticeDetail => json!({
                "title": "Three Mindful Breaths",
                "body": "Pause wherever you are. Let your attention rest on the breath for three slow cycles, then return to your day.",
                "bullets": [
                    "Sit or stand comfortably",
                    "Breathe in slowly through the nose",
                    "Breathe out a little longer than you breathed in",
                    "Repeat three times"
                ],
                "coach_prompts": ["What did you notice in your body?"],
                "safety_reminders": ["Stop if you feel dizzy and breathe normally."],
                "est_time_min": 2
            }),
            Kind::HiddenWisdom => json!({
                "quote": "We suffer more often in imagination than in reality.",
                "philosopher": "Seneca",
                "interpretation": "Much of our distress comes from anticipating troubles that never arrive.",
                "reflection_question": "What worry today belongs to imagination rather than fact?",
                "source": "Letters to Lucilius, 13"
            }),
            Kind::PhilosopherReply => json!({
                "philosopher": "Epictetus",
                "reply": "I cannot answer at length just now. Consider in the meantime what is within your power and what is not.",
                "follow_up_questions": ["What part of this is within your control?"]
            }),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Unknown kind: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeDetail {
    pub title: String,
    pub body: String,
    pub bullets: Vec<String>,
    pub coach_prompts: Vec<String>,
    pub safety_reminders: Vec<String>,
    pub est_time_min: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenWisdom {
    pub quote: String,
    pub philosopher: String,
    pub interpretation: String,
    pub reflection_question: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhilosopherReply {
    pub philosopher: String,
    pub reply: String,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
}
