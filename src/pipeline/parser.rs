//! Defensive parsing of model output.
//!
//! Recovery order: direct parse, then markdown fences stripped, then the
//! outermost `[..]` or `{..}` span. Array items that fail to deserialize are
//! skipped, not fatal.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::types::{
    Confidence, ExclusionType, OnsetStage, Progression, Recommendation, TimingRecord,
};

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("No JSON found in model output")]
    NoJson,

    #[error("Expected a JSON {expected}, found {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid recommendation: {0}")]
    InvalidRecommendation(String),
}

/// Best-effort extraction of a JSON value from free-form model output.
pub fn extract_json(text: &str) -> Result<Value, ParseError> {
    let text = text.trim();

    if let Ok(v) = serde_json::from_str(text) {
        return Ok(v);
    }

    let cleaned = strip_fences(text);
    if let Ok(v) = serde_json::from_str(cleaned) {
        return Ok(v);
    }

    // Outermost span; earliest start first, then widest.
    let mut spans: Vec<(usize, usize)> = [('[', ']'), ('{', '}')]
        .iter()
        .filter_map(|(open, close)| {
            let start = cleaned.find(*open)?;
            let end = cleaned.rfind(*close)?;
            (end > start).then_some((start, end))
        })
        .collect();
    spans.sort_by_key(|(start, end)| (*start, std::cmp::Reverse(end - start)));

    spans
        .into_iter()
        .find_map(|(start, end)| serde_json::from_str(&cleaned[start..=end]).ok())
        .ok_or(ParseError::NoJson)
}

fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest.strip_prefix("json").unwrap_or(rest);
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Deserialize each item independently, skipping failures.
pub fn parse_array_lenient<T: for<'de> Deserialize<'de>>(items: &[Value]) -> Vec<T> {
    let parsed: Vec<T> = items
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect();
    let skipped = items.len() - parsed.len();
    if skipped > 0 {
        tracing::warn!(skipped, kept = parsed.len(), "Skipped malformed items in model output");
    }
    parsed
}

fn expect_array(text: &str) -> Result<Vec<Value>, ParseError> {
    match extract_json(text)? {
        Value::Array(items) => Ok(items),
        // Some models wrap the list in a single-key object.
        Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
            Some((_, Value::Array(items))) => Ok(items),
            Some((_, other)) => Err(ParseError::UnexpectedShape {
                expected: "array",
                found: shape(&other),
            }),
            None => Err(ParseError::NoJson),
        },
        other => Err(ParseError::UnexpectedShape {
            expected: "array",
            found: shape(&other),
        }),
    }
}

// ── Exclusions ─────────────────────────────────────────────

/// Exclusion item as emitted by the extractor, before code mapping.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawExclusion {
    #[serde(default)]
    pub raw_text: String,
    pub finding: String,
    #[serde(default)]
    pub exclusion_type: ExclusionType,
    #[serde(default)]
    pub confidence: Confidence,
}

pub fn parse_exclusions(text: &str) -> Result<Vec<RawExclusion>, ParseError> {
    let items = expect_array(text)?;
    Ok(parse_array_lenient::<RawExclusion>(&items)
        .into_iter()
        .filter(|e| !e.finding.trim().is_empty())
        .collect())
}

// ── Timing ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawTiming {
    phenotype_ref: String,
    #[serde(default)]
    onset: Option<String>,
    #[serde(default, alias = "onset_normalized_years")]
    onset_normalized: Option<f64>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default, alias = "ongoing")]
    is_ongoing: Option<bool>,
    #[serde(default)]
    progression: Progression,
    #[serde(default, alias = "evidence")]
    raw_evidence: String,
    #[serde(default)]
    confidence: Confidence,
}

impl From<RawTiming> for TimingRecord {
    fn from(raw: RawTiming) -> Self {
        let years = raw.onset_normalized.unwrap_or(0.0);
        TimingRecord {
            phenotype_ref: raw.phenotype_ref,
            onset: raw.onset.unwrap_or_else(|| "unknown".to_string()),
            onset_normalized: years,
            onset_stage: OnsetStage::from_years(years),
            resolution: raw.resolution,
            is_ongoing: raw.is_ongoing.unwrap_or(true),
            progression: raw.progression,
            raw_evidence: raw.raw_evidence,
            confidence: raw.confidence,
        }
    }
}

pub fn parse_timing(text: &str) -> Result<Vec<TimingRecord>, ParseError> {
    let items = expect_array(text)?;
    Ok(parse_array_lenient::<RawTiming>(&items)
        .into_iter()
        .filter(|t| !t.phenotype_ref.trim().is_empty())
        .map(TimingRecord::from)
        .collect())
}

// ── Recommendation ─────────────────────────────────────────

pub fn parse_recommendation(text: &str) -> Result<Recommendation, ParseError> {
    let value = extract_json(text)?;
    let Value::Object(mut map) = value else {
        return Err(ParseError::UnexpectedShape {
            expected: "object",
            found: shape(&value),
        });
    };

    // Entries are parsed leniently; the envelope must still look like a
    // recommendation.
    let differential = take_array(&mut map, &["differential"]);
    let next_steps = take_array(&mut map, &["next_steps", "next_best_steps"]);
    if differential.is_none() && next_steps.is_none() {
        return Err(ParseError::InvalidRecommendation(
            "neither differential nor next steps present".into(),
        ));
    }

    let what_would_change = map
        .remove("what_would_change")
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let uncertainty = map
        .remove("uncertainty")
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    Ok(Recommendation {
        differential: parse_array_lenient(&differential.unwrap_or_default()),
        next_steps: parse_array_lenient(&next_steps.unwrap_or_default()),
        what_would_change,
        uncertainty,
        degraded: false,
    })
}

fn take_array(map: &mut serde_json::Map<String, Value>, keys: &[&str]) -> Option<Vec<Value>> {
    keys.iter().find_map(|k| match map.remove(*k) {
        Some(Value::Array(items)) => Some(items),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ActionType;

    #[test]
    fn direct_json() {
        assert_eq!(extract_json("[1, 2]").unwrap(), serde_json::json!([1, 2]));
    }

    #[test]
    fn fenced_json() {
        let text = "```json\n[{\"a\": 1}]\n```";
        assert_eq!(extract_json(text).unwrap(), serde_json::json!([{"a": 1}]));
    }

    #[test]
    fn json_embedded_in_prose() {
        let text = "Here you go:\n{\"differential\": []}\nHope this helps.";
        assert_eq!(
            extract_json(text).unwrap(),
            serde_json::json!({"differential": []})
        );
    }

    #[test]
    fn array_preferred_when_it_starts_first() {
        let text = "Result: [{\"x\": 1}, {\"x\": 2}] done";
        assert!(extract_json(text).unwrap().is_array());
    }

    #[test]
    fn no_json_is_error() {
        assert_eq!(extract_json("no structure here"), Err(ParseError::NoJson));
        assert_eq!(extract_json(""), Err(ParseError::NoJson));
    }

    #[test]
    fn exclusions_parse_with_defaults_and_skip_bad_items() {
        let text = r#"[
            {"raw_text": "no seizures", "finding": "seizures", "exclusion_type": "explicit", "confidence": "high"},
            {"raw_text": "hearing normal", "finding": "hearing loss"},
            {"raw_text": "bad", "finding": 42},
            {"raw_text": "empty", "finding": "  "}
        ]"#;
        let parsed = parse_exclusions(text).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].confidence, Confidence::High);
        assert_eq!(parsed[1].exclusion_type, ExclusionType::Explicit);
        assert_eq!(parsed[1].confidence, Confidence::Medium);
    }

    #[test]
    fn exclusions_wrapped_in_object() {
        let parsed =
            parse_exclusions(r#"{"exclusions": [{"finding": "ataxia"}]}"#).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn exclusions_wrong_shape() {
        let err = parse_exclusions(r#""just a string""#).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedShape { expected: "array", .. }));
    }

    #[test]
    fn timing_derives_stage() {
        let text = r#"[{"phenotype_ref": "Seizure", "onset": "age 4 months",
            "onset_normalized": 0.33, "progression": "progressive",
            "raw_evidence": "seizures began at 4 months", "confidence": "high"}]"#;
        let parsed = parse_timing(text).unwrap();
        assert_eq!(parsed.len(), 1);
        let t = &parsed[0];
        assert_eq!(t.onset_stage, OnsetStage::Infantile);
        assert_eq!(t.progression, Progression::Progressive);
        assert!(t.is_ongoing);
    }

    #[test]
    fn timing_accepts_alternate_field_names() {
        let text = r#"[{"phenotype_ref": "Hypotonia", "onsetNormalizedYears": 1,
            "onset_normalized_years": 0.0, "ongoing": false, "evidence": "floppy at birth"}]"#;
        let t = &parse_timing(text).unwrap()[0];
        assert_eq!(t.onset_stage, OnsetStage::CongenitalNeonatal);
        assert!(!t.is_ongoing);
        assert_eq!(t.raw_evidence, "floppy at birth");
        assert_eq!(t.onset, "unknown");
    }

    #[test]
    fn recommendation_parses_leniently() {
        let text = r#"```json
        {
          "differential": [
            {"disease": "Dravet syndrome", "disease_id": "ORPHA:1", "confidence": "moderate"},
            {"disease": "broken"}
          ],
          "next_best_steps": [
            {"rank": 1, "action_type": "genetic_testing", "action": "SCN1A sequencing", "urgency": "routine"}
          ],
          "what_would_change": ["EEG findings"]
        }
        ```"#;
        let rec = parse_recommendation(text).unwrap();
        assert_eq!(rec.differential.len(), 1);
        assert_eq!(rec.next_steps[0].action_type, ActionType::GeneticTesting);
        assert_eq!(rec.what_would_change, vec!["EEG findings".to_string()]);
        assert!(!rec.degraded);
    }

    #[test]
    fn recommendation_without_envelope_rejected() {
        assert!(matches!(
            parse_recommendation(r#"{"summary": "looks fine"}"#),
            Err(ParseError::InvalidRecommendation(_))
        ));
        assert!(matches!(
            parse_recommendation("[1, 2, 3]"),
            Err(ParseError::UnexpectedShape { expected: "object", .. })
        ));
        assert_eq!(parse_recommendation("I cannot help"), Err(ParseError::NoJson));
    }
}
