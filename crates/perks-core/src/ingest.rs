//! Ingestion pipeline: PDF in, completed statement record out
//!
//! Manual uploads and inbox messages share the same per-document stages:
//! extract text, (optionally) classify, extract rewards, detect the card
//! variant, complete the record. A document that fails any stage ends up as a
//! failed record carrying the error message; only listing the mailbox can
//! fail a whole batch.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::ai::AIClient;
use crate::classify::{ContentClassifier, MIN_SAMPLE_CHARS};
use crate::db::{CompletedStatement, Database};
use crate::dedup::{detect_card_variant, DedupOutcome, StatementDeduplicator};
use crate::error::{Error, Result};
use crate::extract::TextExtractor;
use crate::mailbox::{InboxQuery, MailMessage, Mailbox, MessagePart};
use crate::models::*;
use crate::rewards::{ExtractionContext, RewardExtractor};
use crate::tables::StatementTables;
use crate::triage::{EmailEnvelope, EmailTriage, TriageStage};

/// SHA-256 of a document's bytes, lower-case hex
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Options for a manual upload
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    /// Skip the statement classification gate
    pub force: bool,
}

/// What happened to one document
#[derive(Debug)]
pub enum IngestOutcome {
    Completed(StatementRecord),
    /// Already completed or still processing under the same key; nothing was redone
    Duplicate(StatementRecord),
    /// The record was marked failed with `error`'s message
    Failed {
        statement: StatementRecord,
        error: Error,
    },
}

impl IngestOutcome {
    pub fn statement(&self) -> &StatementRecord {
        match self {
            Self::Completed(s) | Self::Duplicate(s) => s,
            Self::Failed { statement, .. } => statement,
        }
    }
}

/// One document or message that could not be processed
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub message_id: String,
    /// `None` when the message failed before any attachment was handled
    pub file_name: Option<String>,
    pub error: String,
    pub retryable: bool,
}

/// Partial-success summary of an inbox fetch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    /// Messages returned by the search
    pub messages: usize,
    /// Attachments completed
    pub processed: usize,
    /// Attachments (or whole messages) that failed
    pub failed: usize,
    /// Messages triage rejected
    pub rejected: usize,
    /// Attachments skipped because a record already existed
    pub duplicate: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchSummary {
    fn record(&mut self, message_id: &str, file_name: &str, result: Result<IngestOutcome>) {
        let error = match result {
            Ok(IngestOutcome::Completed(_)) => {
                self.processed += 1;
                return;
            }
            Ok(IngestOutcome::Duplicate(_)) => {
                self.duplicate += 1;
                return;
            }
            Ok(IngestOutcome::Failed { error, .. }) => error,
            Err(error) => error,
        };
        self.fail(message_id, Some(file_name), &error);
    }

    fn fail(&mut self, message_id: &str, file_name: Option<&str>, error: &Error) {
        self.failed += 1;
        self.failures.push(BatchFailure {
            message_id: message_id.to_string(),
            file_name: file_name.map(String::from),
            error: error.to_string(),
            retryable: error.is_retryable(),
        });
    }
}

/// Drives documents through extraction, classification and reward extraction
#[derive(Clone)]
pub struct Pipeline {
    db: Database,
    extractor: TextExtractor,
    classifier: ContentClassifier,
    triage: EmailTriage,
    rewards: RewardExtractor,
    tables: Arc<StatementTables>,
}

impl Pipeline {
    /// Pipeline with the default OCR engine, prompt library and lookup tables
    pub fn new(db: Database, ai: AIClient) -> Self {
        Self::with_components(
            db,
            TextExtractor::new(),
            RewardExtractor::new(ai),
            StatementTables::global(),
        )
    }

    pub fn with_components(
        db: Database,
        extractor: TextExtractor,
        rewards: RewardExtractor,
        tables: Arc<StatementTables>,
    ) -> Self {
        Self {
            db,
            extractor,
            classifier: ContentClassifier::new(tables.clone()),
            triage: EmailTriage::new(tables.clone()),
            rewards,
            tables,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn extractor(&self) -> &TextExtractor {
        &self.extractor
    }

    pub fn classifier(&self) -> &ContentClassifier {
        &self.classifier
    }

    pub fn triage(&self) -> &EmailTriage {
        &self.triage
    }

    pub fn rewards(&self) -> &RewardExtractor {
        &self.rewards
    }

    pub fn deduplicator(&self) -> StatementDeduplicator {
        StatementDeduplicator::new(self.tables.clone())
    }

    /// Ingest a manually uploaded PDF.
    ///
    /// The same bytes uploaded again return the existing record unless it
    /// failed, in which case it is reset and processed again. `Err` means
    /// no record could be created or updated at all.
    pub async fn ingest_upload(
        &self,
        user_id: &str,
        document: RawDocument,
        options: UploadOptions,
    ) -> Result<IngestOutcome> {
        let hash = content_hash(&document.bytes);

        let id = match self.db.find_statement_by_hash(user_id, &hash)? {
            Some(existing) if existing.status != StatementStatus::Failed => {
                info!(id = existing.id, file = %document.file_name, "Document already ingested");
                return Ok(IngestOutcome::Duplicate(existing));
            }
            Some(failed) => {
                debug!(id = failed.id, "Retrying previously failed document");
                self.db.reset_statement(failed.id, &document.file_name)?;
                failed.id
            }
            None => self.db.create_statement(&NewStatement {
                user_id: user_id.to_string(),
                file_name: document.file_name.clone(),
                source: document.source,
                content_hash: Some(hash),
                inbox: None,
            })?,
        };

        let span = info_span!("statement", file = %document.file_name, id);
        self.process(id, &document, None, !options.force)
            .instrument(span)
            .await
    }

    /// Search the mailbox and ingest every statement attachment found.
    ///
    /// Fails only when the search itself fails; everything after that is
    /// counted in the summary.
    pub async fn fetch_inbox(
        &self,
        user_id: &str,
        mailbox: &dyn Mailbox,
        query: &InboxQuery,
    ) -> Result<BatchSummary> {
        let ids = mailbox.search_messages(query).await?;
        info!(
            mailbox = mailbox.name(),
            query = %query.to_query_string(),
            messages = ids.len(),
            "Mailbox search finished"
        );

        let mut summary = BatchSummary {
            messages: ids.len(),
            ..Default::default()
        };

        for id in &ids {
            let span = info_span!("message", id = %id);
            let result = self
                .fetch_message(user_id, mailbox, id, &mut summary)
                .instrument(span)
                .await;
            if let Err(e) = result {
                warn!(message = %id, kind = e.kind(), error = %e, "Skipping message");
                summary.fail(id, None, &e);
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            rejected = summary.rejected,
            duplicate = summary.duplicate,
            "Inbox fetch finished"
        );
        Ok(summary)
    }

    /// Latest completed statement per (bank, card variant)
    pub fn latest_statements(&self, user_id: &str) -> Result<DedupOutcome> {
        let statements = self.db.completed_statements(user_id)?;
        Ok(self.deduplicator().filter_latest(statements))
    }

    /// Reject text that is too short or does not read like a card statement
    pub fn check_statement(&self, text: &str) -> Result<ClassificationVerdict> {
        let chars = text.trim().chars().count();
        if chars < MIN_SAMPLE_CHARS {
            return Err(Error::InsufficientText { chars });
        }
        let verdict = self.classifier.classify(text);
        if !verdict.is_statement {
            return Err(Error::NotAStatement(
                verdict
                    .reason
                    .unwrap_or_else(|| "classifier rejected the document".to_string()),
            ));
        }
        Ok(verdict)
    }

    /// Triage one message and ingest its statement attachments.
    ///
    /// Decisions are stored per message. A message rejected on an earlier
    /// fetch is not fetched again, and an accepted one goes straight to the
    /// per-attachment lookup, so known attachments are never downloaded twice.
    async fn fetch_message(
        &self,
        user_id: &str,
        mailbox: &dyn Mailbox,
        id: &str,
        summary: &mut BatchSummary,
    ) -> Result<()> {
        let stored = self.db.find_triage_decision(user_id, id)?;
        if let Some(ref decision) = stored {
            if !decision.is_accepted() {
                debug!(reason = %decision.reason, "Message rejected on an earlier fetch");
                summary.rejected += 1;
                return Ok(());
            }
        }

        let message = mailbox.get_message(id).await?;
        let pdfs = message.pdf_attachments();

        let (decision, analyzed) = match stored {
            Some(decision) => {
                debug!(case = %decision.case, "Message accepted on an earlier fetch");
                (decision, None)
            }
            None => {
                let (decision, analyzed) = self.triage_message(mailbox, &message, &pdfs).await?;
                info!(case = %decision.case, reason = %decision.reason, "Message triaged");
                self.db.record_triage_decision(user_id, &message.id, &decision)?;
                (decision, analyzed)
            }
        };

        if !decision.is_accepted() {
            summary.rejected += 1;
            return Ok(());
        }

        let inbox = InboxMetadata::from_decision(
            &message.id,
            message.subject(),
            message.sender(),
            message.date(),
            &decision,
        );

        // Only the analyzed PDF counts when content decided the message
        let parts: &[&MessagePart] = if decision.case == TriageCase::ContentAnalysis {
            &pdfs[..pdfs.len().min(1)]
        } else {
            &pdfs
        };

        let mut analyzed = analyzed;
        for part in parts {
            let result = self
                .ingest_attachment(user_id, mailbox, &message, part, &inbox, analyzed.take())
                .await;
            summary.record(&message.id, &attachment_name(part), result);
        }
        Ok(())
    }

    /// Run the triage cascade, downloading and extracting the first PDF when
    /// the envelope alone does not decide
    async fn triage_message(
        &self,
        mailbox: &dyn Mailbox,
        message: &MailMessage,
        pdfs: &[&MessagePart],
    ) -> Result<(EmailTriageDecision, Option<(Vec<u8>, ExtractedText)>)> {
        let body = message.body_text();
        let envelope = EmailEnvelope {
            sender: message.sender().unwrap_or_default(),
            subject: message.subject().unwrap_or_default(),
            body: &body,
            has_pdf_attachment: !pdfs.is_empty(),
        };

        match self.triage.evaluate(&envelope) {
            TriageStage::Decided(decision) => Ok((decision, None)),
            TriageStage::NeedsContentAnalysis { sender_domain } => {
                let first = pdfs
                    .first()
                    .ok_or_else(|| Error::Mailbox("message has no PDF to analyze".into()))?;
                let bytes = mailbox.download_attachment(message, first).await?;
                let extracted = self.analyze_attachment(&bytes).await?;
                let verdict = self.classifier.classify(&extracted.text);
                Ok((
                    self.triage.conclude(&sender_domain, verdict),
                    Some((bytes, extracted)),
                ))
            }
        }
    }

    /// Extract the first PDF of an undecided message through a temporary file
    async fn analyze_attachment(&self, bytes: &[u8]) -> Result<ExtractedText> {
        // Removed when dropped, on every return path
        let file = tempfile::Builder::new()
            .prefix("perks-triage-")
            .suffix(".pdf")
            .tempfile()?;
        std::fs::write(file.path(), bytes)?;
        self.extractor
            .extract_file_async(file.path().to_path_buf())
            .await
    }

    async fn ingest_attachment(
        &self,
        user_id: &str,
        mailbox: &dyn Mailbox,
        message: &MailMessage,
        part: &MessagePart,
        inbox: &InboxMetadata,
        prefetched: Option<(Vec<u8>, ExtractedText)>,
    ) -> Result<IngestOutcome> {
        let file_name = attachment_name(part);

        let failed_id =
            match self
                .db
                .find_statement_by_source(user_id, &file_name, Some(&message.id))?
            {
                Some(existing) if existing.status != StatementStatus::Failed => {
                    debug!(id = existing.id, file = %file_name, "Attachment already ingested");
                    return Ok(IngestOutcome::Duplicate(existing));
                }
                Some(failed) => Some(failed.id),
                None => None,
            };

        let (bytes, extracted) = match prefetched {
            Some((bytes, extracted)) => (bytes, Some(extracted)),
            None => (mailbox.download_attachment(message, part).await?, None),
        };

        let id = match failed_id {
            Some(id) => {
                self.db.reset_statement(id, &file_name)?;
                id
            }
            None => self.db.create_statement(&NewStatement {
                user_id: user_id.to_string(),
                file_name: file_name.clone(),
                source: StatementSource::Gmail,
                content_hash: Some(content_hash(&bytes)),
                inbox: Some(inbox.clone()),
            })?,
        };

        let document = RawDocument::inbox(file_name.clone(), bytes);
        let span = info_span!("statement", file = %file_name, id);
        self.process(id, &document, extracted, false)
            .instrument(span)
            .await
    }

    /// Run the stages for a record in the processing state and settle it
    async fn process(
        &self,
        id: i64,
        document: &RawDocument,
        extracted: Option<ExtractedText>,
        gate: bool,
    ) -> Result<IngestOutcome> {
        match self.run_stages(id, document, extracted, gate).await {
            Ok(()) => {
                let statement = self.stored(id)?;
                info!(
                    bank = %statement.bank_name,
                    variant = %statement.card_variant,
                    period = statement.statement_period.as_deref().unwrap_or("unknown"),
                    "Statement completed"
                );
                Ok(IngestOutcome::Completed(statement))
            }
            Err(error) => {
                warn!(kind = error.kind(), error = %error, "Statement failed");
                self.db.fail_statement(id, &error.to_string())?;
                Ok(IngestOutcome::Failed {
                    statement: self.stored(id)?,
                    error,
                })
            }
        }
    }

    async fn run_stages(
        &self,
        id: i64,
        document: &RawDocument,
        extracted: Option<ExtractedText>,
        gate: bool,
    ) -> Result<()> {
        let extracted = match extracted {
            Some(extracted) => extracted,
            None => self.extractor.extract_async(document.bytes.clone()).await?,
        };
        self.db.record_extraction(id, &extracted)?;

        if gate {
            let verdict = self.check_statement(&extracted.text)?;
            debug!(score = verdict.score, confidence = %verdict.confidence, "Classified as statement");
        }

        let context = ExtractionContext {
            file_name: document.file_name.clone(),
            method: extracted.method,
            ocr_confidence: extracted.ocr_confidence,
        };
        let result = self.rewards.extract(&extracted.text, &context).await?;

        let bank = self
            .tables
            .normalize_bank(result.bank_name.as_deref().unwrap_or(UNKNOWN_BANK));
        let variant = detect_card_variant(
            &self.tables,
            &bank,
            &format!("{}\n{}", document.file_name, extracted.text),
        );

        self.db
            .complete_statement(id, &CompletedStatement::from_extraction(&result, &variant))
    }

    fn stored(&self, id: i64) -> Result<StatementRecord> {
        self.db
            .get_statement(id)?
            .ok_or_else(|| Error::NotFound(format!("statement {}", id)))
    }
}

/// Attachment file name, synthesized for unnamed PDF parts
fn attachment_name(part: &MessagePart) -> String {
    if part.filename.trim().is_empty() {
        format!("attachment-{}.pdf", part.part_id)
    } else {
        part.filename.clone()
    }
}
