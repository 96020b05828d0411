//! Parsing of decomposition responses into step definitions.
//!
//! The model is asked for a bare JSON object `{ "steps": [...] }`, but replies
//! often wrap it in prose or code fences. The parser locates the first
//! brace-delimited block mentioning `"steps"`, checks its top-level shape, and
//! then coerces each entry field by field.

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::core::task::StepSpec;

const RESPONSE_SCHEMA: &str = include_str!("../../schemas/decomposition_response.schema.json");

pub const UNTITLED_STEP: &str = "Untitled step";

static STEPS_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)\{.*"steps".*\}"#).expect("steps block regex is valid"));

static RESPONSE_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(RESPONSE_SCHEMA).expect("decomposition response schema is valid JSON");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("decomposition response schema compiles")
});

/// Why a decomposition response could not be turned into steps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecompositionError {
    #[error("no JSON object containing \"steps\" found in response")]
    NoJsonBlock,
    #[error("invalid JSON in decomposition response: {0}")]
    InvalidJson(String),
    #[error("decomposition response has the wrong shape: {0}")]
    Schema(String),
    #[error("decomposition response contains no steps")]
    NoSteps,
}

/// Parse a decomposition response, reporting why parsing failed.
///
/// An empty `steps` array is an error: a plan with no steps is never a
/// successful decomposition.
pub fn parse_decomposition_response(text: &str) -> Result<Vec<StepSpec>, DecompositionError> {
    let block = STEPS_BLOCK_RE
        .find(text)
        .ok_or(DecompositionError::NoJsonBlock)?;
    let value: Value = serde_json::from_str(block.as_str())
        .map_err(|err| DecompositionError::InvalidJson(err.to_string()))?;
    check_shape(&value)?;

    let entries = value
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| DecompositionError::Schema("\"steps\" is not an array".to_string()))?;
    if entries.is_empty() {
        return Err(DecompositionError::NoSteps);
    }
    Ok(entries.iter().map(coerce_step).collect())
}

/// Lenient form: any failure yields an empty list.
///
/// Callers must treat an empty list as a failed decomposition.
pub fn parse_decomposition_steps(text: &str) -> Vec<StepSpec> {
    parse_decomposition_response(text).unwrap_or_default()
}

fn check_shape(value: &Value) -> Result<(), DecompositionError> {
    let messages: Vec<String> = RESPONSE_VALIDATOR
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(DecompositionError::Schema(messages.join("; ")));
    }
    Ok(())
}

fn coerce_step(entry: &Value) -> StepSpec {
    let title = match entry.get("title") {
        None | Some(Value::Null) => UNTITLED_STEP.to_string(),
        Some(value) => match stringify(value) {
            s if s.is_empty() => UNTITLED_STEP.to_string(),
            s => s,
        },
    };
    let description = match entry.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(value) => stringify(value),
    };
    let files_affected = entry
        .get("filesAffected")
        .and_then(Value::as_array)
        .map(|files| files.iter().map(stringify).collect())
        .unwrap_or_default();

    StepSpec {
        title,
        description,
        files_affected,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_exact_json_response() {
        let text = json!({
            "steps": [{"title": "A", "description": "d", "filesAffected": ["x.html"]}]
        })
        .to_string();

        let steps = parse_decomposition_steps(&text);
        assert_eq!(
            steps,
            vec![StepSpec {
                title: "A".to_string(),
                description: "d".to_string(),
                files_affected: vec!["x.html".to_string()],
            }]
        );
    }

    #[test]
    fn text_without_json_yields_empty_list() {
        assert!(parse_decomposition_steps("no json here").is_empty());
        assert_eq!(
            parse_decomposition_response("no json here"),
            Err(DecompositionError::NoJsonBlock)
        );
    }

    #[test]
    fn finds_block_inside_prose_and_fences() {
        let text = "Here is the plan:\n```json\n{\"steps\": [{\"title\": \"Scaffold\"}]}\n```\nGood luck.";
        let steps = parse_decomposition_response(text).expect("parse");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].title, "Scaffold");
        assert_eq!(steps[0].description, "");
        assert!(steps[0].files_affected.is_empty());
    }

    #[test]
    fn coerces_missing_and_non_string_fields() {
        let text = json!({
            "steps": [
                {"description": 42, "filesAffected": "index.html"},
                {"title": 7, "filesAffected": ["a.js", 3, true]},
                "not an object"
            ]
        })
        .to_string();

        let steps = parse_decomposition_response(&text).expect("parse");
        assert_eq!(steps[0].title, UNTITLED_STEP);
        assert_eq!(steps[0].description, "42");
        assert!(steps[0].files_affected.is_empty());
        assert_eq!(steps[1].title, "7");
        assert_eq!(steps[1].files_affected, vec!["a.js", "3", "true"]);
        assert_eq!(steps[2].title, UNTITLED_STEP);
    }

    #[test]
    fn invalid_json_reports_reason() {
        let err = parse_decomposition_response("{\"steps\": [ {\"title\": }").expect_err("invalid");
        assert!(matches!(err, DecompositionError::InvalidJson(_)));
        assert!(parse_decomposition_steps("{\"steps\": [ {\"title\": }").is_empty());
    }

    #[test]
    fn steps_must_be_an_array() {
        let err = parse_decomposition_response("{\"steps\": \"later\"}").expect_err("shape");
        assert!(matches!(err, DecompositionError::Schema(_)));
    }

    #[test]
    fn embedded_schema_requires_steps_key() {
        assert!(RESPONSE_VALIDATOR.is_valid(&json!({"steps": []})));
        assert!(!RESPONSE_VALIDATOR.is_valid(&json!({"plan": []})));
    }

    #[test]
    fn empty_steps_is_distinguishable_from_parse_failure() {
        assert_eq!(
            parse_decomposition_response("{\"steps\": []}"),
            Err(DecompositionError::NoSteps)
        );
        assert!(parse_decomposition_steps("{\"steps\": []}").is_empty());
    }
}
