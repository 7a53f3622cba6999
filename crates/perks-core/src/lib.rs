//! Perks Core Library
//!
//! Shared functionality for the Perks statement tracker:
//! - PDF text extraction with an OCR fallback
//! - Keyword classification of statement text
//! - Inbox triage for statement emails
//! - Reward point extraction through pluggable model backends (Ollama, OpenAI-compatible)
//! - Latest-statement selection per bank and card variant
//! - Encrypted statement storage
//! - Prompt library and lookup tables with user overrides

pub mod ai;
pub mod classify;
pub mod db;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod mailbox;
pub mod models;
pub mod prompts;
pub mod rewards;
pub mod tables;
pub mod triage;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, MockBackend, OllamaBackend, OpenAICompatibleBackend};
pub use classify::ContentClassifier;
pub use db::{CompletedStatement, Database};
pub use dedup::{DedupOutcome, StatementDeduplicator};
pub use error::{Error, Result};
pub use extract::{OcrConfig, TextExtractor};
pub use ingest::{BatchFailure, BatchSummary, IngestOutcome, Pipeline, UploadOptions};
pub use mailbox::{GmailMailbox, InMemoryMailbox, InboxQuery, Mailbox};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
pub use rewards::{ExtractionContext, RewardExtractor};
pub use tables::StatementTables;
pub use triage::{EmailEnvelope, EmailTriage, TriageStage};
