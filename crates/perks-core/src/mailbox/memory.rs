//! In-memory mailbox for tests and dry runs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{InboxQuery, MailMessage, Mailbox, MessageHeader, MessagePart};

#[derive(Default)]
struct Inner {
    /// Messages in insertion order
    messages: Vec<MailMessage>,
    /// (message id, part id) -> attachment bytes
    attachments: HashMap<(String, String), Vec<u8>>,
    fail_search: Option<String>,
    downloads: usize,
}

/// Mailbox holding a fixed set of messages.
///
/// Search ignores the query terms and returns the newest messages first,
/// up to `max_results`.
#[derive(Clone, Default)]
pub struct InMemoryMailbox {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Mailbox("mailbox lock poisoned".into()))
    }

    /// Add a message with a plain-text body and the given attachments
    pub fn add_message(
        &self,
        id: &str,
        from: &str,
        subject: &str,
        body: &str,
        attachments: Vec<(&str, Vec<u8>)>,
    ) {
        let mut parts = vec![MessagePart {
            part_id: "0".to_string(),
            mime_type: "text/plain".to_string(),
            text: Some(body.to_string()),
            size: body.len() as u64,
            ..Default::default()
        }];

        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        for (index, (filename, bytes)) in attachments.into_iter().enumerate() {
            let part_id = (index + 1).to_string();
            let mime_type = if filename.to_lowercase().ends_with(".pdf") {
                "application/pdf"
            } else {
                "application/octet-stream"
            };
            parts.push(MessagePart {
                part_id: part_id.clone(),
                mime_type: mime_type.to_string(),
                filename: filename.to_string(),
                attachment_id: Some(format!("{}-{}", id, part_id)),
                size: bytes.len() as u64,
                ..Default::default()
            });
            inner.attachments.insert((id.to_string(), part_id), bytes);
        }

        let header = |name: &str, value: &str| MessageHeader {
            name: name.to_string(),
            value: value.to_string(),
        };
        inner.messages.push(MailMessage {
            id: id.to_string(),
            headers: vec![
                header("From", from),
                header("Subject", subject),
                header("Date", "Mon, 1 Apr 2024 09:00:00 +0530"),
            ],
            parts,
        });
    }

    /// Make every search fail with `MailboxSearch`
    pub fn fail_search(&self, message: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_search = Some(message.to_string());
        }
    }

    /// Attachments downloaded so far
    pub fn download_count(&self) -> usize {
        self.inner.lock().map(|i| i.downloads).unwrap_or_default()
    }
}

#[async_trait]
impl Mailbox for InMemoryMailbox {
    async fn search_messages(&self, query: &InboxQuery) -> Result<Vec<String>> {
        let inner = self.lock()?;
        if let Some(message) = &inner.fail_search {
            return Err(Error::MailboxSearch(message.clone()));
        }
        Ok(inner
            .messages
            .iter()
            .rev()
            .take(query.max_results)
            .map(|m| m.id.clone())
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage> {
        self.lock()?
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("message {}", id)))
    }

    async fn download_attachment(&self, message: &MailMessage, part: &MessagePart) -> Result<Vec<u8>> {
        let mut inner = self.lock()?;
        let bytes = inner
            .attachments
            .get(&(message.id.clone(), part.part_id.clone()))
            .cloned()
            .ok_or_else(|| {
                Error::Mailbox(format!(
                    "attachment {} not found in message {}",
                    part.filename, message.id
                ))
            })?;
        inner.downloads += 1;
        Ok(bytes)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
