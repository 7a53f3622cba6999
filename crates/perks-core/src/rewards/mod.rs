//! Reward points extraction
//!
//! Statement text goes through the bank layout rewrites, is placed into the
//! extraction prompt together with the matching label mappings, and the
//! model's answer is validated into the fixed reward schema.

pub mod parsing;
pub mod rewrite;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::ai::{AIBackend, AIClient};
use crate::error::{Error, Result};
use crate::models::{ExtractionMethod, RewardExtractionResult};
use crate::prompts::{PromptId, PromptLibrary};

pub use parsing::parse_reward_response;
pub use rewrite::{apply_bank_rewrites, bank_instructions, known_layouts, Rewritten};

/// Statement text beyond this many characters is not sent to the model.
/// Reward summaries sit on the first pages.
pub const MAX_STATEMENT_CHARS: usize = 24_000;

/// What the extractor knows about the document besides its text
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub file_name: String,
    pub method: ExtractionMethod,
    pub ocr_confidence: Option<f64>,
}

impl ExtractionContext {
    pub fn direct(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            method: ExtractionMethod::Direct,
            ocr_confidence: None,
        }
    }

    fn ocr_note(&self) -> Option<String> {
        match self.method {
            ExtractionMethod::Direct => None,
            ExtractionMethod::Ocr => Some(match self.ocr_confidence {
                Some(conf) => format!(
                    "This text was produced by OCR (mean confidence {:.0}%). Digits may be misread; prefer null over a guess.",
                    conf
                ),
                None => "This text was produced by OCR. Digits may be misread; prefer null over a guess.".to_string(),
            }),
        }
    }
}

/// Turns statement text into a normalized reward summary
#[derive(Clone)]
pub struct RewardExtractor {
    ai: AIClient,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl RewardExtractor {
    /// Extractor using the default prompt library (with user overrides)
    pub fn new(ai: AIClient) -> Self {
        Self::with_prompts(ai, PromptLibrary::new())
    }

    pub fn with_prompts(ai: AIClient, prompts: PromptLibrary) -> Self {
        Self {
            ai,
            prompts: Arc::new(RwLock::new(prompts)),
        }
    }

    /// The model client in use
    pub fn ai(&self) -> &AIClient {
        &self.ai
    }

    /// Render the extraction prompt for already rewritten text
    pub fn build_prompt(&self, rewritten: &Rewritten, context: &ExtractionContext) -> Result<String> {
        let statement_text = truncate_chars(&rewritten.text, MAX_STATEMENT_CHARS);
        let instructions = bank_instructions(&rewritten.applied);
        // Nothing recognized: describe every known layout instead
        let layouts = if rewritten.applied.is_empty() {
            known_layouts()
        } else {
            String::new()
        };
        let ocr_note = context.ocr_note().unwrap_or_default();

        let mut vars: HashMap<&str, &str> = HashMap::new();
        vars.insert("statement_text", statement_text);
        vars.insert("file_name", &context.file_name);
        vars.insert("bank_instructions", &instructions);
        vars.insert("bank_layouts", &layouts);
        vars.insert("ocr_note", &ocr_note);
        if let Some(bank) = rewritten.bank_hint() {
            vars.insert("bank_hint", bank);
        }

        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
        let template = prompts.get(PromptId::ExtractRewards)?;
        Ok(template.render(&vars))
    }

    /// Extract the reward summary from statement text.
    ///
    /// Fails with `MalformedResponse` when the model's answer does not fit the
    /// schema, and with the model error kinds (rate limit, auth) unchanged.
    pub async fn extract(
        &self,
        text: &str,
        context: &ExtractionContext,
    ) -> Result<RewardExtractionResult> {
        let rewritten = apply_bank_rewrites(text);
        if !rewritten.applied.is_empty() {
            debug!(banks = ?rewritten.applied, "Applied bank layout rewrites");
        }

        let prompt = self.build_prompt(&rewritten, context)?;
        let raw = self.ai.complete(&prompt).await?;
        debug!(model = %self.ai.model(), response = %raw, "Reward extraction response");

        let mut result = parse_reward_response(&raw, &rewritten.text)?;
        if result.bank_name.is_none() {
            result.bank_name = rewritten.bank_hint().map(String::from);
        }

        info!(
            file = %context.file_name,
            bank = result.bank_name.as_deref().unwrap_or("unknown"),
            closing = ?result.reward_points.closing,
            "Extracted reward points"
        );
        Ok(result)
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;

    fn extractor(mock: MockBackend) -> RewardExtractor {
        RewardExtractor::with_prompts(AIClient::Mock(mock), PromptLibrary::embedded_only())
    }

    const HDFC_TEXT: &str = "HDFC Bank Credit Card Statement\n\
        Statement Period: 20/03/2024 - 18/04/2024\n\
        Reward Points Summary\n\
        Opening Balance Earned Redeemed Expired/Lapsed Closing Balance\n\
        12,450 1,230 0 150 13,530\n";

    #[tokio::test]
    async fn test_extract_with_rewrite_and_mock_echo() {
        let mock = MockBackend::new();
        let result = extractor(mock.clone())
            .extract(HDFC_TEXT, &ExtractionContext::direct("hdfc_apr.pdf"))
            .await
            .unwrap();

        assert_eq!(result.bank_name.as_deref(), Some("HDFC Bank"));
        assert_eq!(result.statement_period.as_deref(), Some("20/03/2024 - 18/04/2024"));
        assert_eq!(result.reward_points.opening, Some(12450.0));
        assert_eq!(result.reward_points.earned, Some(1230.0));
        assert_eq!(result.reward_points.redeemed, Some(0.0));
        assert_eq!(result.reward_points.adjusted_lapsed, Some(150.0));
        assert_eq!(result.reward_points.closing, Some(13530.0));

        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("Detected bank: HDFC Bank"));
        assert!(prompt.contains("\"Closing Balance\" -> rewardPoints.closing"));
        assert!(prompt.contains("File name: hdfc_apr.pdf"));
        assert!(!prompt.contains("OCR"));
        assert!(!prompt.contains("Known bank layouts"));
        assert!(!prompt.contains("{{"));
    }

    #[tokio::test]
    async fn test_unrecognized_layout_gets_every_bank_mapping() {
        let mock = MockBackend::new();
        let text = "ICICI Bank Credit Card Statement\n\
            PREVIOUS BALANCE POINTS EARNED POINTS REDEEMED\n\
            2,000 350 0\n\
            Closing reward balance is shown on page 2\n";
        extractor(mock.clone())
            .extract(text, &ExtractionContext::direct("icici_may.pdf"))
            .await
            .unwrap();

        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("Known bank layouts"));
        for rule in rewrite::rules() {
            assert!(prompt.contains(&rule.layout_instructions()), "{}", rule.bank);
        }
        assert!(!prompt.contains("Map these labels exactly"));
        assert!(!prompt.contains("Detected bank"));
    }

    #[tokio::test]
    async fn test_ocr_note_in_prompt() {
        let mock = MockBackend::new();
        let context = ExtractionContext {
            file_name: "scan.pdf".into(),
            method: ExtractionMethod::Ocr,
            ocr_confidence: Some(74.6),
        };
        extractor(mock.clone()).extract("some text", &context).await.unwrap();
        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.contains("mean confidence 75%"));
        assert!(!prompt.contains("Detected bank"));
    }

    #[tokio::test]
    async fn test_model_error_kinds_propagate() {
        let err = extractor(MockBackend::rate_limited())
            .extract(HDFC_TEXT, &ExtractionContext::direct("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModelRateLimited(_)));

        let err = extractor(MockBackend::unauthorized())
            .extract(HDFC_TEXT, &ExtractionContext::direct("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModelAuth(_)));
    }

    #[tokio::test]
    async fn test_malformed_model_output() {
        let err = extractor(MockBackend::with_response("Sorry, I cannot help with that."))
            .extract(HDFC_TEXT, &ExtractionContext::direct("a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_model_bank_name_wins_over_hint() {
        let mock = MockBackend::with_response(r#"{"bankName": "HDFC Bank Ltd", "rewardPoints": {"closing": 5}}"#);
        let result = extractor(mock)
            .extract(HDFC_TEXT, &ExtractionContext::direct("a.pdf"))
            .await
            .unwrap();
        assert_eq!(result.bank_name.as_deref(), Some("HDFC Bank Ltd"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("₹₹₹₹", 2), "₹₹");
    }
}
