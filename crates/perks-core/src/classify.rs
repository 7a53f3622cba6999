//! Keyword classifier deciding whether text is a credit card statement
//!
//! Scoring over the first ~2000 lower-cased characters:
//! - required keyword: +3 each (at least one must match)
//! - known bank name: +2 each
//! - positive indicator: +1 each
//! - negative indicator: -5 each, and the document is rejected outright
//!
//! Tiers: score >= 5 is high, >= 3 medium, >= 1 low.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::models::{ClassificationVerdict, Confidence};
use crate::tables::StatementTables;

/// Characters of leading text considered
pub const SAMPLE_CHARS: usize = 2000;

/// Fewer characters than this cannot be classified
pub const MIN_SAMPLE_CHARS: usize = 100;

const REQUIRED_WEIGHT: i32 = 3;
const BANK_WEIGHT: i32 = 2;
const POSITIVE_WEIGHT: i32 = 1;
const NEGATIVE_WEIGHT: i32 = -5;

const HIGH_SCORE: i32 = 5;
const MEDIUM_SCORE: i32 = 3;
const LOW_SCORE: i32 = 1;

/// Masked card numbers: `XXXX XXXX XXXX 1234`, `4375 XXXX XXXX 1234`, `****1234`
static MASKED_CARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b\d{4,6}[\s-]?)?(?:[x*•]{2,}[\s-]?){1,3}(\d{4})\b")
        .expect("masked card regex")
});

/// `card ending 1234`, `card ending in 1234`, `card no. ending with XX1234`
static CARD_ENDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcard\b[^\n]{0,40}?\bending\s+(?:in\s+|with\s+)?(?:[x*•]+[\s-]?)?(\d{4})\b")
        .expect("card ending regex")
});

/// Keyword heuristics over document text
#[derive(Clone)]
pub struct ContentClassifier {
    tables: Arc<StatementTables>,
}

impl ContentClassifier {
    pub fn new(tables: Arc<StatementTables>) -> Self {
        Self { tables }
    }

    /// Classifier over the process-wide lookup tables
    pub fn with_global_tables() -> Self {
        Self::new(StatementTables::global())
    }

    /// Classify text. Pure: the same text always yields the same verdict.
    pub fn classify(&self, text: &str) -> ClassificationVerdict {
        let sample: String = text.chars().take(SAMPLE_CHARS).collect::<String>().to_lowercase();

        if sample.trim().chars().count() < MIN_SAMPLE_CHARS {
            return ClassificationVerdict {
                is_statement: false,
                confidence: Confidence::Low,
                score: 0,
                matched: Vec::new(),
                reason: Some("insufficient text".to_string()),
            };
        }

        let tables = &self.tables.classifier;
        let mut score = 0;
        let mut matched = Vec::new();

        for keyword in &tables.required_keywords {
            if contains_phrase(&sample, keyword) {
                score += REQUIRED_WEIGHT;
                matched.push(keyword.clone());
            }
        }

        if matched.is_empty() {
            return ClassificationVerdict {
                is_statement: false,
                confidence: Confidence::High,
                score: 0,
                matched,
                reason: Some("missing required keywords".to_string()),
            };
        }

        for bank in &tables.bank_names {
            if contains_phrase(&sample, bank) {
                score += BANK_WEIGHT;
                matched.push(bank.clone());
            }
        }

        for indicator in &tables.positive_indicators {
            if contains_phrase(&sample, indicator) {
                score += POSITIVE_WEIGHT;
                matched.push(indicator.clone());
            }
        }

        let mut negatives = Vec::new();
        for indicator in &tables.negative_indicators {
            if contains_phrase(&sample, indicator) {
                score += NEGATIVE_WEIGHT;
                matched.push(indicator.clone());
                negatives.push(indicator.as_str());
            }
        }

        if !negatives.is_empty() {
            return ClassificationVerdict {
                is_statement: false,
                confidence: Confidence::High,
                score,
                reason: Some(format!(
                    "contains non-statement indicator: {}",
                    negatives.join(", ")
                )),
                matched,
            };
        }

        let (is_statement, confidence, reason) = if score >= HIGH_SCORE {
            (true, Confidence::High, None)
        } else if score >= MEDIUM_SCORE {
            (true, Confidence::Medium, None)
        } else if score >= LOW_SCORE {
            (true, Confidence::Low, None)
        } else {
            (false, Confidence::Low, Some("score too low".to_string()))
        };

        ClassificationVerdict {
            is_statement,
            confidence,
            score,
            matched,
            reason,
        }
    }
}

/// Whether `text` shows a masked card number. Corroborating evidence only.
pub fn has_card_number_pattern(text: &str) -> bool {
    MASKED_CARD.is_match(text) || CARD_ENDING.is_match(text)
}

/// Last four digits of the first masked card number in `text`
pub fn card_marker(text: &str) -> Option<String> {
    let masked = MASKED_CARD.captures(text).and_then(|c| c.get(1));
    let ending = CARD_ENDING.captures(text).and_then(|c| c.get(1));

    // Prefer whichever appears first in the document
    match (masked, ending) {
        (Some(a), Some(b)) => Some(if a.start() <= b.start() { a } else { b }),
        (a, b) => a.or(b),
    }
    .map(|m| m.as_str().to_string())
}

/// Phrase match on word boundaries. Both sides are expected lower-cased.
pub(crate) fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let is_word = |c: char| c.is_alphanumeric();
    haystack.match_indices(phrase).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + phrase.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}
