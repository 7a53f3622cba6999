//! Inbox triage: decide whether an email carries a credit card statement
//!
//! Ordered, short-circuiting cascade:
//! 1. no PDF attachment -> rejected
//! 2. sender domain on the bank allow-list -> accepted (bank domain)
//! 3. statement keyword in subject or body -> accepted (keyword match)
//! 4. otherwise the first PDF is classified by content
//!
//! Steps 1-3 need only the envelope and are evaluated by [`EmailTriage::evaluate`].
//! Step 4 needs the attachment, which the caller downloads and classifies before
//! calling [`EmailTriage::conclude`]. [`EmailTriage::decide`] runs the whole
//! cascade when the analysis can be supplied as a closure.

use std::sync::Arc;

use crate::classify::contains_phrase;
use crate::error::Result;
use crate::mailbox::sender_domain;
use crate::models::{ClassificationVerdict, EmailTriageDecision, MatchLocation, TriageCase};
use crate::tables::StatementTables;

/// The parts of an email triage looks at
#[derive(Debug, Clone, Copy)]
pub struct EmailEnvelope<'a> {
    /// Raw `From` header, e.g. `HDFC Bank <statements@hdfcbank.com>`
    pub sender: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub has_pdf_attachment: bool,
}

/// Outcome of the envelope-only stages
#[derive(Debug, Clone, PartialEq)]
pub enum TriageStage {
    /// Cascade finished without looking at attachment content
    Decided(EmailTriageDecision),
    /// The first PDF must be classified
    NeedsContentAnalysis { sender_domain: String },
}

/// Three-case decision cascade over inbox messages
#[derive(Clone)]
pub struct EmailTriage {
    tables: Arc<StatementTables>,
}

impl EmailTriage {
    pub fn new(tables: Arc<StatementTables>) -> Self {
        Self { tables }
    }

    pub fn with_global_tables() -> Self {
        Self::new(StatementTables::global())
    }

    /// Run the stages that need only the envelope
    pub fn evaluate(&self, envelope: &EmailEnvelope<'_>) -> TriageStage {
        let domain = sender_domain(envelope.sender);

        if !envelope.has_pdf_attachment {
            return TriageStage::Decided(EmailTriageDecision {
                case: TriageCase::Rejected,
                reason: "no PDF attachments".to_string(),
                sender_domain: domain,
                bank: None,
                matched_in: None,
                verdict: None,
            });
        }

        if let Some(bank) = self.tables.bank_for_domain(&domain) {
            return TriageStage::Decided(EmailTriageDecision {
                case: TriageCase::BankDomain,
                reason: format!("sender domain {} belongs to {}", domain, bank),
                bank: Some(bank.to_string()),
                sender_domain: domain,
                matched_in: None,
                verdict: None,
            });
        }

        if let Some((keyword, location)) = self.keyword_match(envelope.subject, envelope.body) {
            return TriageStage::Decided(EmailTriageDecision {
                case: TriageCase::KeywordMatch,
                reason: format!(
                    "statement keyword '{}' found in {}",
                    keyword,
                    location.as_str()
                ),
                sender_domain: domain,
                bank: None,
                matched_in: Some(location),
                verdict: None,
            });
        }

        TriageStage::NeedsContentAnalysis {
            sender_domain: domain,
        }
    }

    /// Turn the classifier's verdict on the first PDF into the final decision
    pub fn conclude(&self, sender_domain: &str, verdict: ClassificationVerdict) -> EmailTriageDecision {
        if verdict.is_statement {
            EmailTriageDecision {
                case: TriageCase::ContentAnalysis,
                reason: format!(
                    "PDF content classified as statement ({} confidence, score {})",
                    verdict.confidence, verdict.score
                ),
                sender_domain: sender_domain.to_string(),
                bank: None,
                matched_in: None,
                verdict: Some(verdict),
            }
        } else {
            EmailTriageDecision {
                case: TriageCase::Rejected,
                reason: verdict
                    .reason
                    .clone()
                    .unwrap_or_else(|| "PDF content is not a credit card statement".to_string()),
                sender_domain: sender_domain.to_string(),
                bank: None,
                matched_in: None,
                verdict: Some(verdict),
            }
        }
    }

    /// Full cascade. `analyze_first_pdf` runs only when the envelope is inconclusive.
    pub fn decide<F>(&self, envelope: &EmailEnvelope<'_>, analyze_first_pdf: F) -> Result<EmailTriageDecision>
    where
        F: FnOnce() -> Result<ClassificationVerdict>,
    {
        match self.evaluate(envelope) {
            TriageStage::Decided(decision) => Ok(decision),
            TriageStage::NeedsContentAnalysis { sender_domain } => {
                let verdict = analyze_first_pdf()?;
                Ok(self.conclude(&sender_domain, verdict))
            }
        }
    }

    /// First statement keyword in the subject (preferred) or body, and where
    /// keywords were seen overall
    fn keyword_match(&self, subject: &str, body: &str) -> Option<(String, MatchLocation)> {
        let subject = subject.to_lowercase();
        let body = body.to_lowercase();
        let keywords = &self.tables.triage.statement_keywords;

        let in_subject = keywords.iter().find(|k| contains_phrase(&subject, k));
        let in_body = keywords.iter().find(|k| contains_phrase(&body, k));

        match (in_subject, in_body) {
            (Some(k), Some(_)) => Some((k.clone(), MatchLocation::Both)),
            (Some(k), None) => Some((k.clone(), MatchLocation::Subject)),
            (None, Some(k)) => Some((k.clone(), MatchLocation::Body)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::Confidence;

    fn triage() -> EmailTriage {
        EmailTriage::new(Arc::new(StatementTables::embedded().unwrap()))
    }

    fn envelope<'a>(sender: &'a str, subject: &'a str, body: &'a str, pdf: bool) -> EmailEnvelope<'a> {
        EmailEnvelope {
            sender,
            subject,
            body,
            has_pdf_attachment: pdf,
        }
    }

    fn verdict(is_statement: bool) -> ClassificationVerdict {
        ClassificationVerdict {
            is_statement,
            confidence: if is_statement {
                Confidence::Medium
            } else {
                Confidence::High
            },
            score: if is_statement { 4 } else { -2 },
            matched: vec![],
            reason: if is_statement {
                None
            } else {
                Some("contains non-statement indicator: invoice".to_string())
            },
        }
    }

    #[test]
    fn test_no_pdf_is_rejected_first() {
        let t = triage();
        let env = envelope("statements@hdfcbank.com", "Credit Card Statement", "", false);
        let decision = t.decide(&env, || panic!("classifier must not run")).unwrap();
        assert_eq!(decision.case, TriageCase::Rejected);
        assert_eq!(decision.reason, "no PDF attachments");
    }

    #[test]
    fn test_bank_domain_skips_classifier() {
        let t = triage();
        let env = envelope("statements@hdfcbank.com", "Your documents", "", true);
        let decision = t.decide(&env, || panic!("classifier must not run")).unwrap();
        assert_eq!(decision.case, TriageCase::BankDomain);
        assert_eq!(decision.sender_domain, "hdfcbank.com");
        assert_eq!(decision.bank.as_deref(), Some("HDFC Bank"));
        assert!(decision.verdict.is_none());
        assert!(decision.is_accepted());
    }

    #[test]
    fn test_bank_domain_with_display_name_and_subdomain() {
        let t = triage();
        let env = envelope("ICICI Bank <alerts@mail.icicibank.com>", "Hello", "", true);
        let stage = t.evaluate(&env);
        match stage {
            TriageStage::Decided(d) => assert_eq!(d.case, TriageCase::BankDomain),
            other => panic!("unexpected stage: {:?}", other),
        }
    }

    #[test]
    fn test_keyword_match_records_location() {
        let t = triage();

        let d = t
            .decide(
                &envelope("noreply@cardservices.example", "Your E-Statement is ready", "", true),
                || panic!("classifier must not run"),
            )
            .unwrap();
        assert_eq!(d.case, TriageCase::KeywordMatch);
        assert_eq!(d.matched_in, Some(MatchLocation::Subject));
        assert!(d.reason.contains("e-statement"));

        let d = t
            .decide(
                &envelope("a@b.example", "Documents", "Your monthly statement is attached", true),
                || panic!("classifier must not run"),
            )
            .unwrap();
        assert_eq!(d.matched_in, Some(MatchLocation::Body));

        let d = t
            .decide(
                &envelope("a@b.example", "Credit card update", "billing cycle closed", true),
                || panic!("classifier must not run"),
            )
            .unwrap();
        assert_eq!(d.matched_in, Some(MatchLocation::Both));
    }

    #[test]
    fn test_content_analysis_accepts() {
        let t = triage();
        let env = envelope("friend@gmail.com", "fwd", "see attached", true);
        let d = t.decide(&env, || Ok(verdict(true))).unwrap();
        assert_eq!(d.case, TriageCase::ContentAnalysis);
        assert_eq!(d.sender_domain, "gmail.com");
        assert!(d.verdict.unwrap().is_statement);
    }

    #[test]
    fn test_content_analysis_rejects_with_classifier_reason() {
        let t = triage();
        let env = envelope("shop@store.example", "Your order", "thanks", true);
        let d = t.decide(&env, || Ok(verdict(false))).unwrap();
        assert_eq!(d.case, TriageCase::Rejected);
        assert!(d.reason.contains("invoice"));
        assert!(d.verdict.is_some());
    }

    #[test]
    fn test_content_analysis_error_propagates() {
        let t = triage();
        let env = envelope("shop@store.example", "Your order", "thanks", true);
        let result = t.decide(&env, || Err(Error::Ocr("tesseract crashed".into())));
        assert!(matches!(result, Err(Error::Ocr(_))));
    }

    #[test]
    fn test_evaluate_requests_content_analysis() {
        let t = triage();
        let stage = t.evaluate(&envelope("Shop <shop@store.example>", "Receipt", "", true));
        assert_eq!(
            stage,
            TriageStage::NeedsContentAnalysis {
                sender_domain: "store.example".to_string()
            }
        );
    }

    #[test]
    fn test_lookalike_domain_is_not_a_bank() {
        let t = triage();
        let stage = t.evaluate(&envelope("Deals <deals@misc.com>", "Offers", "", true));
        assert_eq!(
            stage,
            TriageStage::NeedsContentAnalysis {
                sender_domain: "misc.com".to_string()
            }
        );
    }
}
