//! Domain models for Perks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bank name stored when the model could not identify one
pub const UNKNOWN_BANK: &str = "Unknown";

/// Card variant stored when no dictionary entry matched
pub const UNKNOWN_VARIANT: &str = "Unknown Variant";

/// Where a statement document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatementSource {
    /// Uploaded by the user
    #[default]
    Manual,
    /// Fetched from the user's mailbox
    Gmail,
}

impl StatementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Gmail => "gmail",
        }
    }
}

impl std::str::FromStr for StatementSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" | "upload" => Ok(Self::Manual),
            "gmail" | "inbox" | "email" => Ok(Self::Gmail),
            _ => Err(format!("Unknown statement source: {}", s)),
        }
    }
}

impl std::fmt::Display for StatementSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A PDF handed to the pipeline. Never persisted.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub source: StatementSource,
}

impl RawDocument {
    pub fn manual(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            source: StatementSource::Manual,
        }
    }

    pub fn inbox(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            source: StatementSource::Gmail,
        }
    }
}

/// How the text of a document was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Read from the PDF text layer
    Direct,
    /// Rasterized and run through OCR
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Ocr => "ocr",
        }
    }
}

impl std::str::FromStr for ExtractionMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "ocr" => Ok(Self::Ocr),
            _ => Err(format!("Unknown extraction method: {}", s)),
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Text pulled out of a PDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
    /// The text layer was missing or unusable
    pub scanned: bool,
    pub method: ExtractionMethod,
    /// Mean per-page OCR confidence (0-100), only set when OCR ran
    pub ocr_confidence: Option<f64>,
}

/// Classification confidence tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Unknown confidence: {}", s)),
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of the keyword classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationVerdict {
    pub is_statement: bool,
    pub confidence: Confidence,
    pub score: i32,
    /// Every keyword or indicator that contributed to the score
    pub matched: Vec<String>,
    /// Why the document was rejected, if it was
    pub reason: Option<String>,
}

/// Which stage of the inbox cascade decided a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageCase {
    BankDomain,
    KeywordMatch,
    ContentAnalysis,
    Rejected,
}

impl TriageCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankDomain => "bank_domain",
            Self::KeywordMatch => "keyword_match",
            Self::ContentAnalysis => "content_analysis",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for TriageCase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "bank_domain" => Ok(Self::BankDomain),
            "keyword_match" => Ok(Self::KeywordMatch),
            "content_analysis" => Ok(Self::ContentAnalysis),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown triage case: {}", s)),
        }
    }
}

impl std::fmt::Display for TriageCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a statement keyword was found in an email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLocation {
    Subject,
    Body,
    Both,
}

impl MatchLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Body => "body",
            Self::Both => "both",
        }
    }
}

/// Terminal outcome of triaging one inbox message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTriageDecision {
    pub case: TriageCase,
    pub reason: String,
    pub sender_domain: String,
    /// Bank inferred from the sender domain (bank-domain case only)
    pub bank: Option<String>,
    /// Where the keyword matched (keyword-match case only)
    pub matched_in: Option<MatchLocation>,
    /// Classifier verdict (content-analysis and content-based rejections)
    pub verdict: Option<ClassificationVerdict>,
}

impl EmailTriageDecision {
    pub fn is_accepted(&self) -> bool {
        self.case != TriageCase::Rejected
    }
}

/// One explicitly enumerated reward category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub category: String,
    pub points: f64,
}

/// Reward-point balances for one statement.
///
/// `None` means the statement did not state the value. Never defaulted to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPoints {
    pub opening: Option<f64>,
    pub earned: Option<f64>,
    pub redeemed: Option<f64>,
    pub adjusted_lapsed: Option<f64>,
    pub closing: Option<f64>,
    pub breakdown: Option<Vec<RewardBreakdown>>,
}

impl RewardPoints {
    /// True when no balance at all was reported
    pub fn is_empty(&self) -> bool {
        self.opening.is_none()
            && self.earned.is_none()
            && self.redeemed.is_none()
            && self.adjusted_lapsed.is_none()
            && self.closing.is_none()
            && self.breakdown.is_none()
    }
}

/// Normalized output of the reward extraction step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardExtractionResult {
    pub bank_name: Option<String>,
    pub statement_period: Option<String>,
    pub reward_points: RewardPoints,
    pub confidence: Option<String>,
    pub notes: Option<String>,
    /// Unmodified model output, kept for auditing
    #[serde(skip)]
    pub raw_response: String,
}

/// Processing status of a statement record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatementStatus {
    #[default]
    Processing,
    Completed,
    Failed,
}

impl StatementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl std::str::FromStr for StatementStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown statement status: {}", s)),
        }
    }
}

impl std::fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mailbox details recorded for statements fetched from the inbox
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboxMetadata {
    pub message_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub date: Option<String>,
    pub sender_domain: Option<String>,
    pub triage_case: Option<TriageCase>,
    pub triage_reason: Option<String>,
    pub classification_confidence: Option<Confidence>,
    pub classification_score: Option<i32>,
}

impl InboxMetadata {
    /// Build metadata from a triage decision for the given message
    pub fn from_decision(
        message_id: &str,
        subject: Option<&str>,
        sender: Option<&str>,
        date: Option<&str>,
        decision: &EmailTriageDecision,
    ) -> Self {
        Self {
            message_id: message_id.to_string(),
            subject: subject.map(String::from),
            sender: sender.map(String::from),
            date: date.map(String::from),
            sender_domain: Some(decision.sender_domain.clone()),
            triage_case: Some(decision.case),
            triage_reason: Some(decision.reason.clone()),
            classification_confidence: decision.verdict.as_ref().map(|v| v.confidence),
            classification_score: decision.verdict.as_ref().map(|v| v.score),
        }
    }
}

/// A processed (or in-progress) statement owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementRecord {
    pub id: i64,
    pub user_id: String,
    pub file_name: String,
    pub bank_name: String,
    /// Period exactly as printed on the statement
    pub statement_period: Option<String>,
    pub card_variant: String,
    pub reward_points: RewardPoints,
    pub raw_text: Option<String>,
    pub raw_response: Option<String>,
    pub status: StatementStatus,
    pub error_message: Option<String>,
    pub source: StatementSource,
    pub uploaded_at: DateTime<Utc>,
    /// SHA-256 of the PDF bytes
    pub content_hash: Option<String>,
    pub extraction_method: Option<ExtractionMethod>,
    pub page_count: Option<i64>,
    pub ocr_confidence: Option<f64>,
    pub inbox: Option<InboxMetadata>,
}

/// Fields needed to create a statement record
#[derive(Debug, Clone)]
pub struct NewStatement {
    pub user_id: String,
    pub file_name: String,
    pub source: StatementSource,
    pub content_hash: Option<String>,
    pub inbox: Option<InboxMetadata>,
}

/// Record counts per status for one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementCounts {
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatementCounts {
    pub fn total(&self) -> i64 {
        self.processing + self.completed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            StatementStatus::Processing,
            StatementStatus::Completed,
            StatementStatus::Failed,
        ] {
            let parsed: StatementStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("done".parse::<StatementStatus>().is_err());
    }

    #[test]
    fn test_source_aliases() {
        assert_eq!(
            "inbox".parse::<StatementSource>().unwrap(),
            StatementSource::Gmail
        );
        assert_eq!(
            "upload".parse::<StatementSource>().unwrap(),
            StatementSource::Manual
        );
    }

    #[test]
    fn test_triage_case_accepts_dashes() {
        assert_eq!(
            "bank-domain".parse::<TriageCase>().unwrap(),
            TriageCase::BankDomain
        );
    }

    #[test]
    fn test_reward_points_serialize_nulls() {
        let points = RewardPoints {
            earned: Some(500.0),
            ..Default::default()
        };
        let json = serde_json::to_value(&points).unwrap();
        assert_eq!(json["earned"], 500.0);
        assert!(json["opening"].is_null());
        assert!(json["adjustedLapsed"].is_null());
        assert!(json["breakdown"].is_null());
    }

    #[test]
    fn test_reward_points_empty() {
        assert!(RewardPoints::default().is_empty());
        let points = RewardPoints {
            closing: Some(0.0),
            ..Default::default()
        };
        assert!(!points.is_empty());
    }
}
