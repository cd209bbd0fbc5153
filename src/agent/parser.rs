//! Multi-tier parser for free-form model replies.
//!
//! Replies are rarely clean JSON. Extraction degrades through four tiers
//! and only reports a parse error once every tier has failed:
//!
//! 1. take the first fenced code block (```json or unlabeled), else the
//!    full reply text
//! 2. strict JSON parse of the extracted text (object or array)
//! 3. repair: insert missing separators between adjacent object literals
//!    ("}{"  → "},{"), wrap the bare sequence in an array, retry
//! 4. scan for top-level brace-delimited substrings and keep whichever
//!    parse individually
//!
//! Each tier is a pure function over strings; no protocol-level fixes.

use std::sync::OnceLock;

use regex::Regex;

use crate::agent::action::ActionRecord;
use crate::errors::{EyeHandError, EyeHandResult};

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence regex"))
}

fn missing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\}\s*\{").expect("separator regex"))
}

/// Run the tiered extraction and return the decoded JSON values.
/// Shared by action parsing, plan parsing, and verification parsing.
pub fn extract_json(raw: &str) -> EyeHandResult<Vec<serde_json::Value>> {
    let candidate = fenced_block(raw).unwrap_or(raw).trim();
    if candidate.is_empty() {
        return Err(EyeHandError::Parse("empty reply".into()));
    }

    // Tier 2: strict parse.
    if let Ok(values) = strict(candidate) {
        return Ok(values);
    }

    // Tier 3: separator repair.
    let repaired = repair(candidate);
    if let Ok(values) = strict(&repaired) {
        tracing::debug!("reply parsed after separator repair");
        return Ok(values);
    }

    // Tier 4: salvage whatever brace-delimited spans decode on their own.
    let salvaged: Vec<serde_json::Value> = brace_spans(candidate)
        .iter()
        .filter_map(|span| serde_json::from_str(span).ok())
        .collect();
    if !salvaged.is_empty() {
        tracing::debug!(count = salvaged.len(), "reply parsed via brace scan");
        return Ok(salvaged);
    }

    Err(EyeHandError::Parse(format!(
        "no JSON found in reply ({} chars)",
        raw.len()
    )))
}

/// Parse a model reply into normalized action records.
///
/// Records whose `action` is missing or unknown are dropped; a reply that
/// yields nothing usable is a parse error.
pub fn parse_actions(raw: &str) -> EyeHandResult<Vec<ActionRecord>> {
    let values = extract_json(raw)?;
    let total = values.len();
    let records: Vec<ActionRecord> = values.iter().filter_map(ActionRecord::from_value).collect();

    if records.is_empty() {
        return Err(EyeHandError::Parse(format!(
            "no usable action records ({total} object(s) decoded, none with a known action)"
        )));
    }
    if records.len() < total {
        tracing::warn!(
            dropped = total - records.len(),
            kept = records.len(),
            "records with unknown actions dropped"
        );
    }
    Ok(records)
}

fn fenced_block(raw: &str) -> Option<&str> {
    fence_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn strict(text: &str) -> Result<Vec<serde_json::Value>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    Ok(match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    })
}

fn repair(text: &str) -> String {
    let joined = missing_comma_re().replace_all(text, "},{").to_string();
    if joined.trim_start().starts_with('{') && joined.contains("},{") {
        format!("[{joined}]")
    } else {
        joined
    }
}

/// Collect top-level `{...}` spans. Tracks string literals so braces inside
/// quoted text do not confuse the depth count.
fn brace_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}
