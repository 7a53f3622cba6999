//! Gmail REST v1 mailbox
//!
//! Authenticates with a bearer token taken from `GMAIL_ACCESS_TOKEN`. The API
//! base can be pointed elsewhere with `GMAIL_API_BASE` (used by tests).

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

use super::{InboxQuery, MailMessage, Mailbox, MessageHeader, MessagePart};

/// Default Gmail API host
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";

/// Page size requested from the list endpoint
const PAGE_SIZE: usize = 100;

/// Gmail mailbox of the authenticated user
#[derive(Clone)]
pub struct GmailMailbox {
    http_client: Client,
    base_url: String,
    access_token: String,
}

impl GmailMailbox {
    pub fn new(base_url: &str, access_token: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Create from `GMAIL_ACCESS_TOKEN` and optional `GMAIL_API_BASE`
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("GMAIL_ACCESS_TOKEN").ok()?;
        if token.trim().is_empty() {
            return None;
        }
        let base = std::env::var("GMAIL_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Some(Self::new(&base, token.trim()))
    }

    fn messages_url(&self) -> String {
        format!("{}/gmail/v1/users/me/messages", self.base_url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<T, FetchError> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status(status, body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

/// Failure of one API call before it is mapped to a crate error
enum FetchError {
    Transport(String),
    Status(StatusCode, String),
}

impl FetchError {
    /// Auth failures keep their own kind; everything else becomes `other`
    fn into_error(self, other: fn(String) -> Error) -> Error {
        match self {
            FetchError::Status(status, body)
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
            {
                Error::MailboxAuth(format!("{}: {}", status, body))
            }
            FetchError::Status(status, body) => other(format!("{}: {}", status, body)),
            FetchError::Transport(message) => other(message),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
    payload: Option<Payload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    part_id: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    headers: Vec<MessageHeader>,
    #[serde(default)]
    body: PartBody,
    #[serde(default)]
    parts: Vec<Payload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    attachment_id: Option<String>,
    #[serde(default)]
    size: u64,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    data: String,
}

/// Decode Gmail's URL-safe base64, with or without padding
pub(crate) fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .trim_end_matches('=')
        .to_string();
    URL_SAFE_NO_PAD
        .decode(cleaned.as_bytes())
        .map_err(|e| Error::Mailbox(format!("invalid base64 body: {}", e)))
}

/// Flatten the MIME tree into leaf parts, depth first
fn collect_parts(payload: Payload, out: &mut Vec<MessagePart>) -> Result<()> {
    if !payload.parts.is_empty() {
        for child in payload.parts {
            collect_parts(child, out)?;
        }
        return Ok(());
    }

    let is_text = payload.filename.is_empty() && payload.mime_type.starts_with("text/");
    let decoded = match &payload.body.data {
        Some(data) => Some(decode_base64url(data)?),
        None => None,
    };
    let (text, data) = match decoded {
        Some(bytes) if is_text => (Some(String::from_utf8_lossy(&bytes).into_owned()), None),
        Some(bytes) => (None, Some(bytes)),
        None => (None, None),
    };

    out.push(MessagePart {
        part_id: payload.part_id,
        mime_type: payload.mime_type,
        filename: payload.filename,
        attachment_id: payload.body.attachment_id,
        text,
        data,
        size: payload.body.size,
    });
    Ok(())
}

fn into_message(response: MessageResponse) -> Result<MailMessage> {
    let mut message = MailMessage {
        id: response.id,
        ..Default::default()
    };
    if let Some(mut payload) = response.payload {
        message.headers = std::mem::take(&mut payload.headers);
        collect_parts(payload, &mut message.parts)?;
    }
    Ok(message)
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn search_messages(&self, query: &InboxQuery) -> Result<Vec<String>> {
        let q = query.to_query_string();
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = query.max_results.saturating_sub(ids.len());
            if remaining == 0 {
                break;
            }
            let mut params = vec![
                ("q", q.clone()),
                ("maxResults", remaining.min(PAGE_SIZE).to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: ListResponse = self
                .get_json(&self.messages_url(), &params)
                .await
                .map_err(|e| e.into_error(Error::MailboxSearch))?;

            ids.extend(page.messages.into_iter().map(|m| m.id));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        ids.truncate(query.max_results);
        debug!(query = %q, count = ids.len(), "Gmail search finished");
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<MailMessage> {
        let url = format!("{}/{}", self.messages_url(), id);
        let response: MessageResponse = self
            .get_json(&url, &[("format", "full".to_string())])
            .await
            .map_err(|e| e.into_error(Error::Mailbox))?;
        into_message(response)
    }

    async fn download_attachment(&self, message: &MailMessage, part: &MessagePart) -> Result<Vec<u8>> {
        if let Some(data) = &part.data {
            return Ok(data.clone());
        }
        let attachment_id = part.attachment_id.as_deref().ok_or_else(|| {
            Error::Mailbox(format!(
                "attachment {} of message {} has no content",
                part.filename, message.id
            ))
        })?;

        let url = format!(
            "{}/{}/attachments/{}",
            self.messages_url(),
            message.id,
            attachment_id
        );
        let response: AttachmentResponse = self
            .get_json(&url, &[])
            .await
            .map_err(|e| e.into_error(Error::Mailbox))?;
        decode_base64url(&response.data)
    }

    fn name(&self) -> &str {
        "gmail"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use base64::engine::general_purpose::URL_SAFE;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    const TOKEN: &str = "test-token";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {}", TOKEN))
    }

    async fn list(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        if !authorized(&headers) {
            return (AxumStatus::UNAUTHORIZED, Json(json!({"error": "invalid token"})));
        }
        assert!(params["q"].starts_with("has:attachment filename:pdf"));
        match params.get("pageToken").map(String::as_str) {
            None => (
                AxumStatus::OK,
                Json(json!({"messages": [{"id": "m1"}, {"id": "m2"}], "nextPageToken": "p2"})),
            ),
            Some("p2") => (AxumStatus::OK, Json(json!({"messages": [{"id": "m3"}]}))),
            Some(_) => (AxumStatus::BAD_REQUEST, Json(json!({}))),
        }
    }

    async fn message(Path(id): Path<String>) -> impl IntoResponse {
        let body = URL_SAFE.encode("Your statement is attached");
        Json(json!({
            "id": id,
            "payload": {
                "partId": "",
                "mimeType": "multipart/mixed",
                "filename": "",
                "headers": [
                    {"name": "From", "value": "HDFC Bank <statements@hdfcbank.com>"},
                    {"name": "Subject", "value": "Credit Card Statement"}
                ],
                "body": {"size": 0},
                "parts": [
                    {
                        "partId": "0",
                        "mimeType": "multipart/alternative",
                        "filename": "",
                        "body": {"size": 0},
                        "parts": [
                            {"partId": "0.0", "mimeType": "text/plain", "filename": "",
                             "body": {"size": 26, "data": body}}
                        ]
                    },
                    {"partId": "1", "mimeType": "application/pdf", "filename": "stmt.pdf",
                     "body": {"size": 8, "attachmentId": "att-1"}}
                ]
            }
        }))
    }

    async fn attachment(Path((_id, att)): Path<(String, String)>) -> impl IntoResponse {
        assert_eq!(att, "att-1");
        Json(json!({"size": 8, "data": URL_SAFE_NO_PAD.encode(b"%PDF-1.5")}))
    }

    async fn start_server() -> String {
        let app = Router::new()
            .route("/gmail/v1/users/me/messages", get(list))
            .route("/gmail/v1/users/me/messages/:id", get(message))
            .route("/gmail/v1/users/me/messages/:id/attachments/:att", get(attachment));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_search_follows_pagination() {
        let base = start_server().await;
        let mailbox = GmailMailbox::new(&base, TOKEN);

        let ids = mailbox.search_messages(&InboxQuery::default()).await.unwrap();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);

        let ids = mailbox
            .search_messages(&InboxQuery::default().with_max_results(2))
            .await
            .unwrap();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_search_auth_failure() {
        let base = start_server().await;
        let mailbox = GmailMailbox::new(&base, "wrong");
        let err = mailbox.search_messages(&InboxQuery::default()).await.unwrap_err();
        assert!(matches!(err, Error::MailboxAuth(_)));
        assert!(err.is_fatal_for_batch());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_search_failure() {
        let mailbox = GmailMailbox::new("http://127.0.0.1:1", TOKEN);
        let err = mailbox.search_messages(&InboxQuery::default()).await.unwrap_err();
        assert!(matches!(err, Error::MailboxSearch(_)));
    }

    #[tokio::test]
    async fn test_get_message_and_download() {
        let base = start_server().await;
        let mailbox = GmailMailbox::new(&base, TOKEN);

        let message = mailbox.get_message("m1").await.unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(message.subject(), Some("Credit Card Statement"));
        assert_eq!(message.body_text(), "Your statement is attached");

        let pdfs = message.pdf_attachments();
        assert_eq!(pdfs.len(), 1);
        assert_eq!(pdfs[0].attachment_id.as_deref(), Some("att-1"));

        let bytes = mailbox.download_attachment(&message, pdfs[0]).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.5");
    }

    #[test]
    fn test_decode_with_and_without_padding() {
        assert_eq!(decode_base64url("aGk=").unwrap(), b"hi");
        assert_eq!(decode_base64url("aGk").unwrap(), b"hi");
        assert_eq!(decode_base64url("-_8").unwrap(), vec![0xfb, 0xff]);
        assert!(decode_base64url("***").is_err());
    }

    #[tokio::test]
    async fn test_inline_attachment_data_is_used() {
        let mailbox = GmailMailbox::new("http://127.0.0.1:1", TOKEN);
        let message = MailMessage::default();
        let part = MessagePart {
            filename: "a.pdf".into(),
            data: Some(b"%PDF".to_vec()),
            ..Default::default()
        };
        assert_eq!(mailbox.download_attachment(&message, &part).await.unwrap(), b"%PDF");
    }
}
