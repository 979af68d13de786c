//! Payload extraction from raw completion text.
//!
//! Models wrap their JSON in many ways: a `<json>` block, a fenced code block,
//! or a bare object surrounded by prose. Extraction runs in two stages, and
//! every candidate is handed to `serde_json` unmodified (strict parsing):
//!
//! 1. Delimiter scan: each `<json>…</json>` block in order, then each fenced
//!    ```` ``` ```` block, then the whole text as prose. A region without a
//!    usable payload (an echoed empty `<json></json>` for instance) is skipped.
//! 2. Balanced scan within a region: a string-aware depth scan over `{` and
//!    `[`. The first balanced object that parses wins; a parsed array is only
//!    returned when the region holds no object.
//!
//! An unbalanced span stops extraction outright, so a truncated completion is
//! never mined for an inner fragment.
//!
//! Byte-order marks and zero-width characters are removed and non-breaking
//! spaces become plain spaces before either stage runs.

use serde_json::Value;
use std::borrow::Cow;
use thiserror::Error;

const OPEN_TAG: &str = "<json>";
const CLOSE_TAG: &str = "</json>";
const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("no JSON object found in completion")]
    NoPayload,

    #[error("unbalanced JSON starting at byte {start}")]
    Unbalanced { start: usize },

    #[error("invalid JSON: {message}")]
    Parse { message: String },
}

/// Where a payload was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    TaggedBlock,
    FencedBlock,
    Prose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPayload {
    pub value: Value,
    pub source: PayloadSource,
}

/// Remove BOMs and zero-width characters; normalise non-breaking spaces.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if !text.chars().any(needs_cleaning) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .filter_map(|c| match c {
                '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' => None,
                '\u{00A0}' | '\u{2007}' | '\u{202F}' => Some(' '),
                other => Some(other),
            })
            .collect(),
    )
}

fn needs_cleaning(c: char) -> bool {
    matches!(
        c,
        '\u{FEFF}'
            | '\u{200B}'
            | '\u{200C}'
            | '\u{200D}'
            | '\u{2060}'
            | '\u{00A0}'
            | '\u{2007}'
            | '\u{202F}'
    )
}

/// Extract and strictly parse the JSON payload from `raw`.
pub fn extract_payload(raw: &str) -> Result<ExtractedPayload, ExtractionError> {
    let text = sanitize(raw);
    let mut first_parse_error: Option<ExtractionError> = None;

    for region in candidate_regions(&text) {
        match parse_region(&region) {
            Ok(value) => {
                return Ok(ExtractedPayload {
                    value,
                    source: region.source,
                })
            }
            Err(e @ ExtractionError::Unbalanced { .. }) => return Err(e),
            Err(e @ ExtractionError::Parse { .. }) => {
                first_parse_error.get_or_insert(e);
            }
            Err(ExtractionError::NoPayload) => {}
        }
    }

    Err(first_parse_error.unwrap_or(ExtractionError::NoPayload))
}

/// A slice of the sanitised text and its byte offset within it.
struct Region<'a> {
    body: &'a str,
    offset: usize,
    source: PayloadSource,
}

/// Stage 1: tagged blocks, fenced blocks, then the whole text.
fn candidate_regions(text: &str) -> Vec<Region<'_>> {
    let mut regions = tagged_regions(text);
    regions.extend(fenced_regions(text));
    regions.push(Region {
        body: text,
        offset: 0,
        source: PayloadSource::Prose,
    });
    regions
}

fn tagged_regions(text: &str) -> Vec<Region<'_>> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let mut regions = Vec::new();
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find(OPEN_TAG) {
        let body_start = pos + rel + OPEN_TAG.len();
        // An unclosed tag runs to the end of the text.
        let (body_end, next) = match lower[body_start..].find(CLOSE_TAG) {
            Some(rel) => (body_start + rel, body_start + rel + CLOSE_TAG.len()),
            None => (text.len(), text.len()),
        };
        regions.push(Region {
            body: &text[body_start..body_end],
            offset: body_start,
            source: PayloadSource::TaggedBlock,
        });
        pos = next;
    }
    regions
}

fn fenced_regions(text: &str) -> Vec<Region<'_>> {
    let mut regions = Vec::new();
    let mut pos = 0;

    while let Some(rel) = text[pos..].find(FENCE) {
        let after_fence = pos + rel + FENCE.len();
        // Skip the info string (e.g. "json") up to the end of the line.
        let body_start = text[after_fence..]
            .find('\n')
            .map(|rel| after_fence + rel + 1)
            .unwrap_or(after_fence);
        let Some(rel) = text[body_start..].find(FENCE) else {
            break;
        };
        regions.push(Region {
            body: &text[body_start..body_start + rel],
            offset: body_start,
            source: PayloadSource::FencedBlock,
        });
        pos = body_start + rel + FENCE.len();
    }
    regions
}

fn parse_region(region: &Region<'_>) -> Result<Value, ExtractionError> {
    let trimmed = region.body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Ok(value);
        }
    }
    scan_balanced(region.body, region.offset)
}

/// Stage 2: the first balanced object that parses strictly, else the first
/// balanced array that does.
///
/// A balanced span that fails to parse (prose like `{this}` or `[sic]`) is
/// skipped whole and scanning resumes after it, so nothing nested inside a
/// rejected span is ever returned. An unbalanced span ends the scan, since
/// every later bracket lies inside it.
fn scan_balanced(region: &str, offset: usize) -> Result<Value, ExtractionError> {
    let mut pos = 0;
    let mut first_array: Option<Value> = None;
    let mut first_parse_error: Option<String> = None;

    while let Some(rel) = region[pos..].find(['{', '[']) {
        let start = pos + rel;
        let end = balanced_end(region, start).ok_or(ExtractionError::Unbalanced {
            start: offset + start,
        })?;
        match serde_json::from_str::<Value>(&region[start..end]) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(value) => {
                first_array.get_or_insert(value);
            }
            Err(e) => {
                first_parse_error.get_or_insert_with(|| e.to_string());
            }
        }
        pos = end;
    }

    if let Some(array) = first_array {
        return Ok(array);
    }
    Err(match first_parse_error {
        Some(message) => ExtractionError::Parse { message },
        None => ExtractionError::NoPayload,
    })
}

/// Byte offset just past the bracket closing the one at `start`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
