//! Best-effort verdict extraction from free-form reviewer output.
//!
//! Reviewers are asked for bare JSON but routinely wrap it in prose or code
//! fences. Extraction takes the text between the first `{` and the last `}`,
//! checks it against the embedded verdict schema, and maps it onto [`Verdict`].
//! Every failure collapses into a synthetic NONPASS; nothing escapes as an error.

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde::Deserialize;
use serde_json::Value;

use crate::core::types::{IterationFailure, Outcome, Verdict};

const VERDICT_SCHEMA: &str = include_str!("../../schemas/verdict.schema.json");

static VERDICT_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(VERDICT_SCHEMA).expect("verdict schema should be valid json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("verdict schema should compile")
});

/// Verdict extracted from reviewer text, plus the reason extraction failed (if it did).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVerdict {
    pub verdict: Verdict,
    pub parse_error: Option<String>,
}

impl ParsedVerdict {
    pub fn parse_failed(&self) -> bool {
        self.parse_error.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    verdict: Option<String>,
    outcome: Option<String>,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default, alias = "requiredChanges")]
    required_changes: Vec<String>,
}

/// Extract a verdict from raw reviewer output. Always yields a well-formed verdict.
pub fn extract_verdict(raw: &str) -> ParsedVerdict {
    match try_extract(raw) {
        Ok(verdict) => ParsedVerdict {
            verdict,
            parse_error: None,
        },
        Err(err) => ParsedVerdict {
            verdict: IterationFailure::ReviewUnparseable.verdict(None),
            parse_error: Some(err),
        },
    }
}

fn try_extract(raw: &str) -> Result<Verdict, String> {
    let candidate = braced_object(raw).ok_or_else(|| "no JSON object found".to_string())?;
    let value: Value =
        serde_json::from_str(candidate).map_err(|err| format!("invalid JSON: {err}"))?;

    let violations: Vec<String> = VERDICT_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !violations.is_empty() {
        return Err(format!("schema violations: {}", violations.join("; ")));
    }

    let parsed: RawVerdict =
        serde_json::from_value(value).map_err(|err| format!("unexpected shape: {err}"))?;
    let label = parsed
        .verdict
        .as_deref()
        .or(parsed.outcome.as_deref())
        .unwrap_or_default();
    let outcome = parse_outcome(label).ok_or_else(|| format!("unknown verdict '{label}'"))?;

    Ok(Verdict {
        outcome,
        reasons: parsed.reasons,
        required_changes: parsed.required_changes,
    })
}

/// Slice from the first `{` through the last `}`.
fn braced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

fn parse_outcome(label: &str) -> Option<Outcome> {
    let normalized: String = label
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .collect::<String>()
        .to_ascii_uppercase();
    match normalized.as_str() {
        "PASS" | "PASSED" => Some(Outcome::Pass),
        "NONPASS" | "FAIL" | "FAILED" => Some(Outcome::Nonpass),
        _ => None,
    }
}
