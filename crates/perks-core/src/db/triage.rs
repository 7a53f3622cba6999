//! Triage decisions for inbox messages

use rusqlite::{params, OptionalExtension};

use super::{now_string, Database};
use crate::error::Result;
use crate::models::EmailTriageDecision;

impl Database {
    /// Store the decision for a message. A later decision for the same
    /// message replaces it.
    pub fn record_triage_decision(
        &self,
        user_id: &str,
        message_id: &str,
        decision: &EmailTriageDecision,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO triage_decisions
             (user_id, message_id, triage_case, sender_domain, decision, decided_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                user_id,
                message_id,
                decision.case.as_str(),
                decision.sender_domain,
                serde_json::to_string(decision)?,
                now_string(),
            ],
        )?;
        Ok(())
    }

    /// Decision previously stored for a message, if any
    pub fn find_triage_decision(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<EmailTriageDecision>> {
        let conn = self.conn()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT decision FROM triage_decisions WHERE user_id = ? AND message_id = ?",
                params![user_id, message_id],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
