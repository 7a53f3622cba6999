//! JSON extraction helpers for model responses
//!
//! Models often wrap JSON in markdown code fences or add a sentence before
//! or after the payload, even when asked not to.

use crate::error::{Error, Result};

/// Longest slice of a raw response quoted in error messages
const RAW_PREVIEW_CHARS: usize = 200;

/// Remove a surrounding markdown code fence (```json ... ``` or ``` ... ```)
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) up to the first newline
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Find the outermost JSON object in a model response
pub fn extract_json_object(response: &str) -> Result<&str> {
    let response = strip_code_fences(response);

    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&response[s..=e]),
        _ => Err(Error::MalformedResponse(format!(
            "No JSON found in model response | Raw: {}",
            preview(response)
        ))),
    }
}

/// Truncate long responses for error messages
pub fn preview(text: &str) -> String {
    if text.chars().count() > RAW_PREVIEW_CHARS {
        let head: String = text.chars().take(RAW_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```\n"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
        // Unterminated fence keeps the body
        assert_eq!(strip_code_fences("```json\n{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_extract_json_object_with_chatter() {
        let raw = "Sure! Here is the data:\n{\"bankName\": \"HDFC\"}\nLet me know.";
        assert_eq!(extract_json_object(raw).unwrap(), "{\"bankName\": \"HDFC\"}");
    }

    #[test]
    fn test_extract_json_object_missing() {
        let err = extract_json_object("I could not find any reward points.").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "₹".repeat(300);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), RAW_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
