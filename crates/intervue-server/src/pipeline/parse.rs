//! Parsing of model output.
//!
//! Models often wrap JSON in a Markdown fence or add a sentence around it,
//! so the JSON body is located first and decoded leniently afterwards. Only
//! the fields the pipeline cannot do without are strict.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::{Difficulty, FeedbackResult, PracticeType};

static FENCED_JSON: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").ok());

/// Why model output could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// No JSON could be decoded.
    #[error("Model response is not valid JSON: {0}")]
    InvalidJson(String),

    /// The required score is absent.
    #[error("Model response is missing required field 'overall_score'")]
    MissingScore,

    /// The score is not a number in `[0, 100]`.
    #[error("overall_score must be a number between 0 and 100, got {0}")]
    ScoreOutOfRange(String),

    /// The JSON has the wrong overall shape.
    #[error("Unexpected model response shape: {0}")]
    Shape(String),

    /// No usable practice item was returned.
    #[error("Model response contains no practice items")]
    NoPractices,
}

/// A practice item as the model described it, before ids and order are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticeDraft {
    /// Kind of drill.
    pub practice_type: PracticeType,
    /// Difficulty, when the model gave a recognisable one.
    pub difficulty: Option<Difficulty>,
    /// Weakness the drill addresses.
    pub target_weakness: String,
    /// What the candidate is asked to do.
    pub prompt: String,
    /// Model answer.
    pub expected_answer: Option<String>,
    /// Progressive hints.
    pub hints: Vec<String>,
    /// Position the model asked for.
    pub sequence_order: Option<u32>,
}

/// Returns the JSON text inside `content`: a fenced block if present,
/// otherwise the span from the first `{`/`[` to the matching last bracket.
#[must_use]
pub fn extract_json(content: &str) -> &str {
    if let Some(body) = FENCED_JSON
        .as_ref()
        .and_then(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
    {
        return body.as_str().trim();
    }

    let trimmed = content.trim();
    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

fn decode(content: &str) -> Result<Value, ParseError> {
    serde_json::from_str(extract_json(content)).map_err(|e| ParseError::InvalidJson(e.to_string()))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Parses a feedback evaluation.
///
/// `overall_score` must be present and a number in `[0, 100]`; every other
/// field degrades to empty when missing or mistyped.
pub fn parse_feedback(content: &str) -> Result<FeedbackResult, ParseError> {
    let value = decode(content)?;
    let Value::Object(body) = value else {
        return Err(ParseError::Shape("expected a JSON object".to_string()));
    };

    let overall_score = match body.get("overall_score") {
        None | Some(Value::Null) => return Err(ParseError::MissingScore),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|s| (0.0..=100.0).contains(s))
            .ok_or_else(|| ParseError::ScoreOutOfRange(n.to_string()))?,
        Some(other) => return Err(ParseError::ScoreOutOfRange(other.to_string())),
    };

    let criterion_scores: BTreeMap<String, f64> = body
        .get("criterion_scores")
        .and_then(Value::as_object)
        .map(|scores| {
            scores
                .iter()
                .filter_map(|(name, score)| score.as_f64().map(|s| (name.clone(), s)))
                .collect()
        })
        .unwrap_or_default();

    Ok(FeedbackResult {
        overall_score,
        criterion_scores,
        strengths: string_list(body.get("strengths")),
        weaknesses: string_list(body.get("weaknesses")),
        suggestions: string_list(body.get("suggestions")),
        detailed_feedback: text(body.get("detailed_feedback")).unwrap_or_default(),
        safety_flags: string_list(body.get("safety_flags")),
    })
}

/// Parses up to `count` practice items from `{"practices": [...]}` or a
/// bare array. Items without a prompt are skipped.
pub fn parse_practices(content: &str, count: usize) -> Result<Vec<PracticeDraft>, ParseError> {
    let items = match decode(content)? {
        Value::Array(items) => items,
        Value::Object(mut body) => match body.remove("practices") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ParseError::Shape(
                    "expected a \"practices\" array".to_string(),
                ))
            }
        },
        _ => return Err(ParseError::Shape("expected a JSON object or array".to_string())),
    };

    let drafts: Vec<PracticeDraft> = items
        .iter()
        .filter_map(|item| {
            let item = item.as_object()?;
            let prompt = text(item.get("prompt"))?;
            let practice_type = text(item.get("type").or_else(|| item.get("practice_type")))
                .and_then(|t| PracticeType::from_str_case_insensitive(&t))
                .unwrap_or_default();
            Some(PracticeDraft {
                practice_type,
                difficulty: text(item.get("difficulty"))
                    .and_then(|d| Difficulty::from_str_case_insensitive(&d)),
                target_weakness: text(item.get("target_weakness")).unwrap_or_default(),
                prompt,
                expected_answer: text(item.get("expected_answer")),
                hints: string_list(item.get("hints")),
                sequence_order: item
                    .get("sequence_order")
                    .and_then(Value::as_u64)
                    .and_then(|o| u32::try_from(o).ok()),
            })
        })
        .take(count)
        .collect();

    if drafts.is_empty() {
        return Err(ParseError::NoPractices);
    }
    Ok(drafts)
}

/// Positions for a parsed batch: the model's own `sequence_order` values
/// when they form a permutation of `0..N-1`, otherwise list positions.
#[must_use]
pub fn sequence_orders(drafts: &[PracticeDraft]) -> Vec<u32> {
    let explicit: Option<Vec<u32>> = drafts.iter().map(|d| d.sequence_order).collect();
    if let Some(explicit) = explicit {
        let mut sorted = explicit.clone();
        sorted.sort_unstable();
        if sorted.iter().zip(0u32..).all(|(&order, expected)| order == expected) {
            return explicit;
        }
    }
    (0u32..).take(drafts.len()).collect()
}
