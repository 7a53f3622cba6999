//! Validation of model output against the reward schema
//!
//! The response is parsed into a `serde_json::Value` and each field is checked
//! by hand. Deriving `Deserialize` straight into the schema would reject
//! harmless variations models produce (numbers as strings, thousands
//! separators, a missing `breakdown`) and accept harmful ones (zero for an
//! unstated balance is indistinguishable from a stated zero).

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::ai::parsing::{extract_json_object, preview};
use crate::error::{Error, Result};
use crate::models::{RewardBreakdown, RewardExtractionResult, RewardPoints};

/// Numbers printed next to an adjusted/lapsed/expired label in the source
static ADJUSTED_VALUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:adjusted|lapsed|expired|forfeited)\b[^\d\n-]{0,40}(-?\d[\d,]*(?:\.\d{1,2})?)")
        .expect("adjusted values regex")
});

/// Parse and normalize a raw model response.
///
/// `source_text` is the (rewritten) statement text the model saw; it is used
/// to decide whether an `adjustedLapsed` equal to `closing` was really printed.
pub fn parse_reward_response(raw: &str, source_text: &str) -> Result<RewardExtractionResult> {
    let json_str = extract_json_object(raw)?;
    let value: Value = serde_json::from_str(json_str).map_err(|e| {
        Error::MalformedResponse(format!("Invalid JSON from model: {} | Raw: {}", e, preview(json_str)))
    })?;

    let Value::Object(root) = value else {
        return Err(Error::MalformedResponse(format!(
            "Expected a JSON object | Raw: {}",
            preview(json_str)
        )));
    };

    let mut reward_points = match root.get("rewardPoints") {
        None | Some(Value::Null) => RewardPoints::default(),
        Some(Value::Object(points)) => parse_points(points)?,
        Some(other) => {
            return Err(Error::MalformedResponse(format!(
                "rewardPoints must be an object, got {}",
                type_name(other)
            )))
        }
    };

    let mut notes = optional_string(&root, "notes")?;

    if let (Some(adjusted), Some(closing)) = (reward_points.adjusted_lapsed, reward_points.closing) {
        if adjusted == closing && !source_states_adjusted(source_text, adjusted) {
            reward_points.adjusted_lapsed = None;
            let note = "adjustedLapsed discarded: it repeated the closing balance";
            notes = Some(match notes {
                Some(existing) => format!("{}; {}", existing, note),
                None => note.to_string(),
            });
        }
    }

    Ok(RewardExtractionResult {
        bank_name: optional_string(&root, "bankName")?,
        statement_period: optional_string(&root, "statementPeriod")?,
        reward_points,
        confidence: optional_string(&root, "confidence")?.map(|c| c.to_lowercase()),
        notes,
        raw_response: raw.to_string(),
    })
}

fn parse_points(points: &Map<String, Value>) -> Result<RewardPoints> {
    let field = |key: &str| -> Result<Option<f64>> {
        match points.get(key) {
            None => Ok(None),
            Some(v) => parse_number(v).map_err(|e| with_field(e, key)),
        }
    };

    Ok(RewardPoints {
        opening: field("opening")?,
        earned: field("earned")?,
        redeemed: field("redeemed")?,
        adjusted_lapsed: field("adjustedLapsed")?,
        closing: field("closing")?,
        breakdown: parse_breakdown(points.get("breakdown"))?,
    })
}

/// `breakdown` is kept only when it lists at least one category with points
fn parse_breakdown(value: Option<&Value>) -> Result<Option<Vec<RewardBreakdown>>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(Error::MalformedResponse(format!(
                "breakdown must be an array, got {}",
                type_name(other)
            )))
        }
    };

    let mut breakdown = Vec::new();
    for item in items {
        let Value::Object(entry) = item else {
            return Err(Error::MalformedResponse(
                "breakdown entries must be objects".into(),
            ));
        };
        let category = match entry.get("category") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => continue,
        };
        let points = match entry.get("points") {
            Some(v) => parse_number(v).map_err(|e| with_field(e, "breakdown.points"))?,
            None => None,
        };
        if let Some(points) = points {
            breakdown.push(RewardBreakdown { category, points });
        }
    }

    Ok(if breakdown.is_empty() {
        None
    } else {
        Some(breakdown)
    })
}

/// Accept JSON numbers and numeric strings ("1,23,450", "₹ 500", "-20").
/// Empty and placeholder strings mean "not stated".
fn parse_number(value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches("Rs.")
                .trim_start_matches("INR")
                .chars()
                .filter(|c| !matches!(c, ',' | ' ' | '₹' | '$'))
                .collect();
            let lowered = cleaned.to_lowercase();
            if cleaned.is_empty() || matches!(lowered.as_str(), "null" | "n/a" | "na" | "-" | "none") {
                return Ok(None);
            }
            cleaned
                .parse::<f64>()
                .map(Some)
                .map_err(|_| Error::MalformedResponse(format!("not a number: {:?}", s)))
        }
        other => Err(Error::MalformedResponse(format!(
            "expected a number, got {}",
            type_name(other)
        ))),
    }
}

fn optional_string(root: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok(if s.is_empty() { None } else { Some(s.to_string()) })
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(Error::MalformedResponse(format!(
            "{} must be a string, got {}",
            key,
            type_name(other)
        ))),
    }
}

/// Whether the statement prints `value` next to an adjusted/lapsed label
fn source_states_adjusted(source_text: &str, value: f64) -> bool {
    ADJUSTED_VALUES.captures_iter(source_text).any(|caps| {
        caps[1]
            .replace(',', "")
            .parse::<f64>()
            .is_ok_and(|n| n == value)
    })
}

fn with_field(err: Error, field: &str) -> Error {
    match err {
        Error::MalformedResponse(msg) => Error::MalformedResponse(format!("{}: {}", field, msg)),
        other => other,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_become_null() {
        let raw = r#"{"bankName": "HDFC Bank", "rewardPoints": {"earned": 500}}"#;
        let result = parse_reward_response(raw, "").unwrap();

        let points = &result.reward_points;
        assert_eq!(points.opening, None);
        assert_eq!(points.earned, Some(500.0));
        assert_eq!(points.redeemed, None);
        assert_eq!(points.adjusted_lapsed, None);
        assert_eq!(points.closing, None);
        assert_eq!(points.breakdown, None);

        let json = serde_json::to_value(points).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "opening": null,
                "earned": 500.0,
                "redeemed": null,
                "adjustedLapsed": null,
                "closing": null,
                "breakdown": null
            })
        );
    }

    #[test]
    fn test_fenced_response_with_string_numbers() {
        let raw = "```json\n{\"bankName\":\"ICICI Bank\",\"statementPeriod\":\"April 2024\",\
                   \"rewardPoints\":{\"opening\":\"1,23,450\",\"earned\":\"₹ 320\",\"redeemed\":\"\",\
                   \"adjustedLapsed\":null,\"closing\":\"1,23,770\"},\"confidence\":\"HIGH\"}\n```";
        let result = parse_reward_response(raw, "").unwrap();
        assert_eq!(result.bank_name.as_deref(), Some("ICICI Bank"));
        assert_eq!(result.statement_period.as_deref(), Some("April 2024"));
        assert_eq!(result.reward_points.opening, Some(123450.0));
        assert_eq!(result.reward_points.earned, Some(320.0));
        assert_eq!(result.reward_points.redeemed, None);
        assert_eq!(result.reward_points.closing, Some(123770.0));
        assert_eq!(result.confidence.as_deref(), Some("high"));
        assert_eq!(result.raw_response, raw);
    }

    #[test]
    fn test_empty_breakdown_is_null() {
        let raw = r#"{"rewardPoints": {"closing": 10, "breakdown": []}}"#;
        assert_eq!(parse_reward_response(raw, "").unwrap().reward_points.breakdown, None);

        let raw = r#"{"rewardPoints": {"breakdown": [{"category": "Dining", "points": "120"}, {"category": "", "points": 5}]}}"#;
        let breakdown = parse_reward_response(raw, "")
            .unwrap()
            .reward_points
            .breakdown
            .unwrap();
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].category, "Dining");
        assert_eq!(breakdown[0].points, 120.0);
    }

    #[test]
    fn test_adjusted_equal_to_closing_is_dropped() {
        let raw = r#"{"rewardPoints": {"opening": 1000, "adjustedLapsed": 1500, "closing": 1500}}"#;
        let source = "Opening Balance: 1,000\nClosing Balance: 1,500";
        let result = parse_reward_response(raw, source).unwrap();
        assert_eq!(result.reward_points.adjusted_lapsed, None);
        assert_eq!(result.reward_points.closing, Some(1500.0));
        assert!(result.notes.unwrap().contains("adjustedLapsed"));
    }

    #[test]
    fn test_adjusted_equal_to_closing_kept_when_printed() {
        let raw = r#"{"rewardPoints": {"adjustedLapsed": 0, "closing": 0}}"#;
        let source = "Points Adjusted/Lapsed: 0\nClosing Balance: 0";
        let result = parse_reward_response(raw, source).unwrap();
        assert_eq!(result.reward_points.adjusted_lapsed, Some(0.0));
        assert!(result.notes.is_none());
    }

    #[test]
    fn test_null_reward_points_is_empty() {
        let raw = r#"{"bankName": null, "rewardPoints": null, "notes": "no summary"}"#;
        let result = parse_reward_response(raw, "").unwrap();
        assert!(result.reward_points.is_empty());
        assert_eq!(result.notes.as_deref(), Some("no summary"));
    }

    #[test]
    fn test_malformed_responses() {
        for raw in [
            "I'm sorry, I can't read this statement.",
            "{\"rewardPoints\": {\"opening\": }",
            r#"{"rewardPoints": [1, 2]}"#,
            r#"{"rewardPoints": {"opening": "about five hundred"}}"#,
            r#"{"rewardPoints": {"earned": true}}"#,
            r#"{"bankName": ["HDFC"]}"#,
        ] {
            let err = parse_reward_response(raw, "").unwrap_err();
            assert!(
                matches!(err, Error::MalformedResponse(_)),
                "expected malformed for {raw}: {err:?}"
            );
        }
    }

    #[test]
    fn test_field_name_in_error() {
        let raw = r#"{"rewardPoints": {"closing": "lots"}}"#;
        let err = parse_reward_response(raw, "").unwrap_err();
        assert!(err.to_string().contains("closing"));
    }
}
