//! Mailbox collaborator
//!
//! The pipeline only needs three operations from a mailbox: search for
//! message ids, fetch one message (headers plus flattened MIME parts) and
//! download one attachment. Token acquisition is outside this crate; the
//! Gmail implementation takes a ready bearer token.

mod gmail;
mod memory;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use gmail::GmailMailbox;
pub use memory::InMemoryMailbox;

/// Default cap on messages returned by one search
pub const DEFAULT_MAX_RESULTS: usize = 50;

/// One message header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// A leaf MIME part
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    pub part_id: String,
    pub mime_type: String,
    /// Empty for inline bodies
    pub filename: String,
    /// Set when the content must be downloaded separately
    pub attachment_id: Option<String>,
    /// Decoded inline text, for text parts
    pub text: Option<String>,
    /// Inline attachment bytes, when the server sent them with the message
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
    pub size: u64,
}

impl MessagePart {
    pub fn is_pdf(&self) -> bool {
        !self.filename.is_empty()
            && (self.filename.to_lowercase().ends_with(".pdf")
                || self.mime_type.eq_ignore_ascii_case("application/pdf"))
    }
}

/// A fetched message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    pub headers: Vec<MessageHeader>,
    pub parts: Vec<MessagePart>,
}

impl MailMessage {
    /// First header with this name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    pub fn sender(&self) -> Option<&str> {
        self.header("From")
    }

    pub fn date(&self) -> Option<&str> {
        self.header("Date")
    }

    /// Plain-text body, falling back to HTML parts when there is none
    pub fn body_text(&self) -> String {
        let inline = |mime: &str| -> Vec<&str> {
            self.parts
                .iter()
                .filter(|p| p.filename.is_empty() && p.mime_type.eq_ignore_ascii_case(mime))
                .filter_map(|p| p.text.as_deref())
                .collect()
        };

        let plain = inline("text/plain");
        if plain.is_empty() {
            inline("text/html").join("\n")
        } else {
            plain.join("\n")
        }
    }

    /// PDF attachments in message order
    pub fn pdf_attachments(&self) -> Vec<&MessagePart> {
        self.parts.iter().filter(|p| p.is_pdf()).collect()
    }
}

/// Date-bounded search for messages with PDF attachments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxQuery {
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
    pub max_results: usize,
}

impl Default for InboxQuery {
    fn default() -> Self {
        Self {
            after: None,
            before: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl InboxQuery {
    /// Messages received in the last `days` days
    pub fn last_days(days: i64) -> Self {
        Self {
            after: Some((Utc::now() - Duration::days(days)).date_naive()),
            ..Self::default()
        }
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Gmail search syntax
    pub fn to_query_string(&self) -> String {
        let mut query = String::from("has:attachment filename:pdf");
        if let Some(after) = self.after {
            query.push_str(&format!(" after:{}", after.format("%Y/%m/%d")));
        }
        if let Some(before) = self.before {
            query.push_str(&format!(" before:{}", before.format("%Y/%m/%d")));
        }
        query
    }
}

/// Mail source the inbox pipeline reads from
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Ids of messages matching the query, newest first
    async fn search_messages(&self, query: &InboxQuery) -> Result<Vec<String>>;

    async fn get_message(&self, id: &str) -> Result<MailMessage>;

    async fn download_attachment(&self, message: &MailMessage, part: &MessagePart) -> Result<Vec<u8>>;

    /// Implementation name (for logging)
    fn name(&self) -> &str;
}

/// Lower-cased domain of a `From` header. Handles `Name <addr@domain>` and
/// bare addresses; empty when there is no `@`.
pub fn sender_domain(from: &str) -> String {
    let address = match (from.rfind('<'), from.rfind('>')) {
        (Some(start), Some(end)) if start < end => &from[start + 1..end],
        _ => from,
    };
    match address.rsplit_once('@') {
        Some((_, domain)) => domain
            .trim()
            .trim_end_matches(['>', '"', '\'', '.'])
            .to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(mime: &str, filename: &str, text: Option<&str>) -> MessagePart {
        MessagePart {
            part_id: "0".into(),
            mime_type: mime.into(),
            filename: filename.into(),
            attachment_id: None,
            text: text.map(String::from),
            data: None,
            size: 0,
        }
    }

    #[test]
    fn test_sender_domain() {
        assert_eq!(sender_domain("statements@hdfcbank.com"), "hdfcbank.com");
        assert_eq!(
            sender_domain("ICICI Bank <Alerts@Mail.ICICIBank.com>"),
            "mail.icicibank.com"
        );
        assert_eq!(sender_domain("\"Shop, Inc\" <shop@store.example>"), "store.example");
        assert_eq!(sender_domain("no address here"), "");
        assert_eq!(sender_domain(""), "");
    }

    #[test]
    fn test_query_string() {
        let query = InboxQuery {
            after: NaiveDate::from_ymd_opt(2024, 3, 1),
            before: NaiveDate::from_ymd_opt(2024, 4, 1),
            max_results: 10,
        };
        assert_eq!(
            query.to_query_string(),
            "has:attachment filename:pdf after:2024/03/01 before:2024/04/01"
        );
        assert_eq!(
            InboxQuery::default().to_query_string(),
            "has:attachment filename:pdf"
        );
    }

    #[test]
    fn test_last_days_sets_after_only() {
        let query = InboxQuery::last_days(30).with_max_results(5);
        assert!(query.after.is_some());
        assert!(query.before.is_none());
        assert_eq!(query.max_results, 5);
    }

    #[test]
    fn test_message_helpers() {
        let message = MailMessage {
            id: "m1".into(),
            headers: vec![
                MessageHeader {
                    name: "subject".into(),
                    value: "Your statement".into(),
                },
                MessageHeader {
                    name: "From".into(),
                    value: "Bank <a@bank.example>".into(),
                },
            ],
            parts: vec![
                part("text/html", "", Some("<p>html</p>")),
                part("text/plain", "", Some("plain body")),
                part("application/pdf", "Statement.PDF", None),
                part("application/octet-stream", "terms.pdf", None),
                part("image/png", "logo.png", None),
            ],
        };

        assert_eq!(message.subject(), Some("Your statement"));
        assert_eq!(message.sender(), Some("Bank <a@bank.example>"));
        assert_eq!(message.date(), None);
        assert_eq!(message.body_text(), "plain body");

        let pdfs: Vec<&str> = message
            .pdf_attachments()
            .iter()
            .map(|p| p.filename.as_str())
            .collect();
        assert_eq!(pdfs, vec!["Statement.PDF", "terms.pdf"]);
    }

    #[test]
    fn test_body_falls_back_to_html() {
        let message = MailMessage {
            id: "m".into(),
            headers: vec![],
            parts: vec![part("text/html", "", Some("<b>statement</b>"))],
        };
        assert_eq!(message.body_text(), "<b>statement</b>");
    }
}
