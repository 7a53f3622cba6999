//! Error types for Perks

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The document could not be read as a PDF
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// An external OCR/rasterization program is not installed
    #[error("Required tool not found: {tool} (is it installed and on PATH?)")]
    ToolNotFound { tool: String },

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Insufficient text for classification ({chars} characters)")]
    InsufficientText { chars: usize },

    #[error("Not a credit card statement: {0}")]
    NotAStatement(String),

    /// Model output could not be parsed into the reward schema
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Model rate limited: {0}")]
    ModelRateLimited(String),

    #[error("Model authentication failed: {0}")]
    ModelAuth(String),

    #[error("Model API error {status}: {body}")]
    ModelApi { status: u16, body: String },

    #[error("Mailbox search failed: {0}")]
    MailboxSearch(String),

    #[error("Mailbox authentication failed: {0}")]
    MailboxAuth(String),

    #[error("Mailbox error: {0}")]
    Mailbox(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Stable tag for logs and stored error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Pool(_) => "pool",
            Self::Encryption(_) => "encryption",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
            Self::Json(_) => "json",
            Self::Toml(_) => "config",
            Self::Extraction(_) => "extraction",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::Ocr(_) => "ocr",
            Self::InsufficientText { .. } => "insufficient_text",
            Self::NotAStatement(_) => "not_a_statement",
            Self::MalformedResponse(_) => "malformed_response",
            Self::ModelRateLimited(_) => "model_rate_limited",
            Self::ModelAuth(_) => "model_auth",
            Self::ModelApi { .. } => "model_api",
            Self::MailboxSearch(_) => "mailbox_search",
            Self::MailboxAuth(_) => "mailbox_auth",
            Self::Mailbox(_) => "mailbox",
            Self::InvalidData(_) => "invalid_data",
            Self::NotFound(_) => "not_found",
        }
    }

    /// Whether trying the same document again later could succeed.
    ///
    /// Nothing in the pipeline retries automatically; this only drives
    /// what the user is told.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ModelRateLimited(_) | Self::MalformedResponse(_) | Self::Http(_) => true,
            Self::ModelApi { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Errors that abort a whole inbox batch instead of a single document
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(self, Self::MailboxSearch(_) | Self::MailboxAuth(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
