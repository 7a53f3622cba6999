//! Statement record operations

use rusqlite::{params, OptionalExtension};

use super::{now_string, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::*;

const STATEMENT_COLUMNS: &str = "id, user_id, file_name, bank_name, statement_period, card_variant,
     reward_points, raw_text, raw_response, status, error_message, source, uploaded_at,
     content_hash, extraction_method, page_count, ocr_confidence, message_id, email_subject,
     email_sender, email_date, sender_domain, triage_case, triage_reason,
     classification_confidence, classification_score";

/// Results written when a statement completes
#[derive(Debug, Clone)]
pub struct CompletedStatement {
    pub bank_name: String,
    pub statement_period: Option<String>,
    pub card_variant: String,
    pub reward_points: RewardPoints,
    pub raw_response: String,
}

impl CompletedStatement {
    /// Results of a reward extraction, with `Unknown` for a missing bank
    pub fn from_extraction(result: &RewardExtractionResult, card_variant: &str) -> Self {
        Self {
            bank_name: result
                .bank_name
                .as_deref()
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .unwrap_or(UNKNOWN_BANK)
                .to_string(),
            statement_period: result.statement_period.clone(),
            card_variant: card_variant.to_string(),
            reward_points: result.reward_points.clone(),
            raw_response: result.raw_response.clone(),
        }
    }
}

impl Database {
    /// Create a statement record in the processing state
    pub fn create_statement(&self, statement: &NewStatement) -> Result<i64> {
        let conn = self.conn()?;
        let inbox = statement.inbox.as_ref();
        conn.execute(
            "INSERT INTO statements (user_id, file_name, source, uploaded_at, content_hash,
             message_id, email_subject, email_sender, email_date, sender_domain,
             triage_case, triage_reason, classification_confidence, classification_score)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                statement.user_id,
                statement.file_name,
                statement.source.as_str(),
                now_string(),
                statement.content_hash,
                inbox.map(|i| i.message_id.as_str()),
                inbox.and_then(|i| i.subject.as_deref()),
                inbox.and_then(|i| i.sender.as_deref()),
                inbox.and_then(|i| i.date.as_deref()),
                inbox.and_then(|i| i.sender_domain.as_deref()),
                inbox.and_then(|i| i.triage_case).map(|c| c.as_str()),
                inbox.and_then(|i| i.triage_reason.as_deref()),
                inbox
                    .and_then(|i| i.classification_confidence)
                    .map(|c| c.as_str()),
                inbox.and_then(|i| i.classification_score),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get statement by ID
    pub fn get_statement(&self, id: i64) -> Result<Option<StatementRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM statements WHERE id = ?",
            STATEMENT_COLUMNS
        ))?;

        let statement = stmt
            .query_row(params![id], |row| Self::row_to_statement(row))
            .optional()?;

        Ok(statement)
    }

    /// Find a statement by (user, file name, inbox message id).
    ///
    /// `message_id` of `None` matches manual uploads of that file name.
    pub fn find_statement_by_source(
        &self,
        user_id: &str,
        file_name: &str,
        message_id: Option<&str>,
    ) -> Result<Option<StatementRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM statements
             WHERE user_id = ? AND file_name = ? AND message_id IS ?
             ORDER BY id DESC LIMIT 1",
            STATEMENT_COLUMNS
        ))?;

        let statement = stmt
            .query_row(params![user_id, file_name, message_id], |row| {
                Self::row_to_statement(row)
            })
            .optional()?;

        Ok(statement)
    }

    /// Find a statement by content hash (for upload deduplication)
    pub fn find_statement_by_hash(
        &self,
        user_id: &str,
        content_hash: &str,
    ) -> Result<Option<StatementRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM statements
             WHERE user_id = ? AND content_hash = ?
             ORDER BY id DESC LIMIT 1",
            STATEMENT_COLUMNS
        ))?;

        let statement = stmt
            .query_row(params![user_id, content_hash], |row| {
                Self::row_to_statement(row)
            })
            .optional()?;

        Ok(statement)
    }

    /// Store the extracted text and how it was obtained
    pub fn record_extraction(&self, id: i64, extracted: &ExtractedText) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE statements SET raw_text = ?, extraction_method = ?, page_count = ?,
             ocr_confidence = ? WHERE id = ?",
            params![
                extracted.text,
                extracted.method.as_str(),
                extracted.page_count as i64,
                extracted.ocr_confidence,
                id
            ],
        )?;
        Ok(())
    }

    /// Move a processing statement to completed with its results
    pub fn complete_statement(&self, id: i64, completed: &CompletedStatement) -> Result<()> {
        let conn = self.conn()?;
        let reward_points = serde_json::to_string(&completed.reward_points)?;
        let updated = conn.execute(
            "UPDATE statements SET status = 'completed', error_message = NULL,
             bank_name = ?, statement_period = ?, card_variant = ?, reward_points = ?,
             raw_response = ?
             WHERE id = ? AND status = 'processing'",
            params![
                completed.bank_name,
                completed.statement_period,
                completed.card_variant,
                reward_points,
                completed.raw_response,
                id
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("processing statement {}", id)));
        }
        Ok(())
    }

    /// Move a processing statement to failed
    pub fn fail_statement(&self, id: i64, error_message: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE statements SET status = 'failed', error_message = ?
             WHERE id = ? AND status = 'processing'",
            params![error_message, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("processing statement {}", id)));
        }
        Ok(())
    }

    /// Put a statement back into processing for another attempt under
    /// `file_name`, clearing earlier results
    pub fn reset_statement(&self, id: i64, file_name: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE statements SET status = 'processing', error_message = NULL, file_name = ?,
             bank_name = 'Unknown', statement_period = NULL, card_variant = 'Unknown Variant',
             reward_points = '{}', raw_text = NULL, raw_response = NULL,
             extraction_method = NULL, page_count = NULL, ocr_confidence = NULL,
             uploaded_at = ?
             WHERE id = ?",
            params![file_name, now_string(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("statement {}", id)));
        }
        Ok(())
    }

    /// List a user's statements, newest first, optionally by status
    pub fn list_statements(
        &self,
        user_id: &str,
        status: Option<StatementStatus>,
    ) -> Result<Vec<StatementRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM statements
             WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY uploaded_at DESC, id DESC",
            STATEMENT_COLUMNS
        ))?;

        let statements = stmt
            .query_map(params![user_id, status.map(|s| s.as_str())], |row| {
                Self::row_to_statement(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(statements)
    }

    /// Completed statements of a user (input of the deduplicator)
    pub fn completed_statements(&self, user_id: &str) -> Result<Vec<StatementRecord>> {
        self.list_statements(user_id, Some(StatementStatus::Completed))
    }

    /// Delete a user's statement. Returns false when there was none.
    pub fn delete_statement(&self, user_id: &str, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM statements WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        Ok(deleted > 0)
    }

    /// Record counts per status for a user
    pub fn statement_counts(&self, user_id: &str) -> Result<StatementCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM statements WHERE user_id = ? GROUP BY status",
        )?;

        let mut counts = StatementCounts::default();
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status.parse::<StatementStatus>() {
                Ok(StatementStatus::Processing) => counts.processing = count,
                Ok(StatementStatus::Completed) => counts.completed = count,
                Ok(StatementStatus::Failed) => counts.failed = count,
                Err(_) => {}
            }
        }
        Ok(counts)
    }

    /// Helper to convert a row to StatementRecord
    fn row_to_statement(row: &rusqlite::Row) -> rusqlite::Result<StatementRecord> {
        let reward_points_str: String = row.get(6)?;
        let status_str: String = row.get(9)?;
        let source_str: String = row.get(11)?;
        let uploaded_at_str: String = row.get(12)?;
        let method_str: Option<String> = row.get(14)?;
        let message_id: Option<String> = row.get(17)?;
        let triage_case_str: Option<String> = row.get(22)?;
        let confidence_str: Option<String> = row.get(24)?;

        let inbox = match message_id {
            Some(message_id) => Some(InboxMetadata {
                message_id,
                subject: row.get(18)?,
                sender: row.get(19)?,
                date: row.get(20)?,
                sender_domain: row.get(21)?,
                triage_case: triage_case_str.and_then(|s| s.parse().ok()),
                triage_reason: row.get(23)?,
                classification_confidence: confidence_str.and_then(|s| s.parse().ok()),
                classification_score: row.get(25)?,
            }),
            None => None,
        };

        Ok(StatementRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            file_name: row.get(2)?,
            bank_name: row.get(3)?,
            statement_period: row.get(4)?,
            card_variant: row.get(5)?,
            reward_points: serde_json::from_str(&reward_points_str).unwrap_or_default(),
            raw_text: row.get(7)?,
            raw_response: row.get(8)?,
            status: status_str.parse().unwrap_or_default(),
            error_message: row.get(10)?,
            source: source_str.parse().unwrap_or_default(),
            uploaded_at: parse_datetime(&uploaded_at_str),
            content_hash: row.get(13)?,
            extraction_method: method_str.and_then(|s| s.parse().ok()),
            page_count: row.get(15)?,
            ocr_confidence: row.get(16)?,
            inbox,
        })
    }
}
