//! Card variant detection against the per-bank variant dictionary

use std::collections::HashSet;

use crate::classify::contains_phrase;
use crate::models::UNKNOWN_VARIANT;
use crate::tables::StatementTables;

/// Score for a variant name found verbatim
pub const EXACT_SCORE: u32 = 100;

/// Weight of the word-overlap score
pub const PARTIAL_WEIGHT: u32 = 80;

/// Minimum score a variant needs to be chosen
pub const MIN_SCORE: u32 = 40;

/// Leading characters of statement text scanned; later pages carry offers
/// that name other cards.
pub const SCAN_CHARS: usize = 3000;

/// Detect the card variant named in `text` for a normalized bank.
///
/// Variants of an unknown bank are looked up across every bank.
pub fn detect_card_variant(tables: &StatementTables, normalized_bank: &str, text: &str) -> String {
    let sample: String = text.chars().take(SCAN_CHARS).collect();
    let normalized = normalize(&sample);
    let words: HashSet<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();

    let candidates: Vec<&String> = match tables.variants_for(normalized_bank) {
        Some(variants) => variants.iter().collect(),
        None => tables.card_variants.values().flatten().collect(),
    };

    let mut best: Option<(&String, u32)> = None;
    for variant in candidates {
        let score = score_variant(&normalized, &words, variant);
        // Strictly greater keeps the first of equally scored variants
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((variant, score));
        }
    }

    match best {
        Some((variant, score)) if score >= MIN_SCORE => variant.clone(),
        _ => UNKNOWN_VARIANT.to_string(),
    }
}

/// 100 for a verbatim match, else the share of the variant's significant
/// words (longer than two characters) present in the text, scaled to 80
pub fn score_variant(normalized_text: &str, text_words: &HashSet<&str>, variant: &str) -> u32 {
    let variant_norm = normalize(variant);
    if variant_norm.is_empty() {
        return 0;
    }
    if contains_phrase(normalized_text, &variant_norm) {
        return EXACT_SCORE;
    }

    let significant: Vec<&str> = variant_norm
        .split(' ')
        .filter(|w| w.chars().count() > 2)
        .collect();
    if significant.is_empty() {
        return 0;
    }
    let matched = significant.iter().filter(|w| text_words.contains(*w)).count();
    (matched as u32 * PARTIAL_WEIGHT) / significant.len() as u32
}

/// Lower-case, punctuation to spaces, whitespace collapsed
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> StatementTables {
        StatementTables::embedded().unwrap()
    }

    #[test]
    fn test_exact_variant_match() {
        let t = tables();
        let text = "HDFC Bank Regalia Gold Credit Card Statement";
        assert_eq!(detect_card_variant(&t, "hdfc bank", text), "Regalia Gold");
        assert_eq!(detect_card_variant(&t, "hdfc bank", "Your REGALIA card"), "Regalia");
    }

    #[test]
    fn test_partial_match_threshold() {
        let t = tables();
        // "Sapphire" alone: 1 of 2 words -> 40, enough
        assert_eq!(detect_card_variant(&t, "chase", "Sapphire card statement"), "Sapphire Reserve");
        // 1 of 3 words -> 26, not enough
        assert_eq!(
            detect_card_variant(&t, "icici bank", "Private banking statement"),
            UNKNOWN_VARIANT
        );
    }

    #[test]
    fn test_unknown_bank_searches_all_variants() {
        let t = tables();
        assert_eq!(detect_card_variant(&t, "unknown", "Magnus card"), "Magnus");
        assert_eq!(detect_card_variant(&t, "unknown", "nothing here"), UNKNOWN_VARIANT);
    }

    #[test]
    fn test_word_boundaries() {
        let t = tables();
        // "neo" inside "neon" is not the Axis Neo card
        assert_eq!(detect_card_variant(&t, "axis bank", "neon lights"), UNKNOWN_VARIANT);
    }

    #[test]
    fn test_score_variant() {
        let text = normalize("Tata Neu Infinity HDFC Bank Credit Card");
        let words: HashSet<&str> = text.split(' ').collect();
        assert_eq!(score_variant(&text, &words, "Tata Neu Infinity"), 100);
        assert_eq!(score_variant(&text, &words, "Tata Neu Plus"), 53);
        assert_eq!(score_variant(&text, &words, "Swiggy"), 0);
        assert_eq!(score_variant(&text, &words, "it"), 0);
    }

    #[test]
    fn test_punctuation_in_variant_names() {
        let t = tables();
        assert_eq!(
            detect_card_variant(&t, "hdfc bank", "MoneyBack+ Credit Card"),
            "MoneyBack+"
        );
    }
}
