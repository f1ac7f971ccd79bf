//! Gmail API v1: send plain-text mail and read replies from one sender.
//!
//! Replies are listed with `from:<addr> newer_than:1d`, then each message is
//! fetched in `minimal` format for its `internalDate` and snippet.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{check_status, send_with_retry, GoogleApiError, RetryPolicy, TokenSource};
use crate::error::SlotdeskError;
use crate::mail::{InboundMessage, MailService, OutgoingMessage};

const GMAIL_MESSAGES: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    snippet: String,
    /// Epoch milliseconds, as a string
    #[serde(default)]
    internal_date: Option<String>,
}

impl MessageDetail {
    fn into_inbound(self) -> Option<InboundMessage> {
        let millis = self.internal_date.as_deref()?.parse::<i64>().ok()?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)?;
        Some(InboundMessage {
            timestamp,
            body_snippet: decode_snippet(&self.snippet),
        })
    }
}

// ============================================================================
// Message encoding
// ============================================================================

/// RFC 2047 encode a header value when it is not plain ASCII.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!(
            "=?UTF-8?B?{}?=",
            base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
        )
    }
}

/// Build the base64url `raw` payload for `users.messages.send`.
fn encode_raw_message(recipient: &str, message: &OutgoingMessage) -> String {
    let rfc822 = format!(
        "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
        recipient,
        encode_header(&message.subject),
        message.body
    );
    base64::engine::general_purpose::URL_SAFE.encode(rfc822.as_bytes())
}

/// Gmail snippets are HTML-escaped.
fn decode_snippet(snippet: &str) -> String {
    snippet
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

// ============================================================================
// Service
// ============================================================================

pub struct GmailService {
    client: reqwest::Client,
    tokens: Arc<TokenSource>,
    policy: RetryPolicy,
    max_results: u32,
}

impl GmailService {
    pub fn new(tokens: Arc<TokenSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            policy: RetryPolicy::default(),
            max_results: 20,
        }
    }

    async fn send_raw(&self, recipient: &str, message: &OutgoingMessage) -> Result<(), GoogleApiError> {
        let access_token = self.tokens.access_token().await?;
        let body = serde_json::json!({ "raw": encode_raw_message(recipient, message) });
        let resp = send_with_retry(
            self.client
                .post(format!("{}/send", GMAIL_MESSAGES))
                .bearer_auth(&access_token)
                .json(&body),
            &self.policy,
        )
        .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn list_from(
        &self,
        sender: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, GoogleApiError> {
        let access_token = self.tokens.access_token().await?;
        let query = format!("from:{} newer_than:1d", sender);
        let max_results = self.max_results.to_string();
        let resp = send_with_retry(
            self.client
                .get(GMAIL_MESSAGES)
                .bearer_auth(&access_token)
                .query(&[
                    ("q", query.as_str()),
                    ("maxResults", max_results.as_str()),
                ]),
            &self.policy,
        )
        .await?;
        let list: MessageListResponse = check_status(resp).await?.json().await?;

        let mut messages = Vec::with_capacity(list.messages.len());
        for stub in &list.messages {
            match self.fetch_message(&access_token, &stub.id).await {
                Ok(detail) => {
                    let id = detail.id.clone();
                    match detail.into_inbound() {
                        Some(msg) if msg.timestamp > since => messages.push(msg),
                        Some(_) => {}
                        None => log::debug!("Skipping message {} without internalDate", id),
                    }
                }
                Err(e) => log::debug!("Skipping message {}: {}", stub.id, e),
            }
        }
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn fetch_message(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<MessageDetail, GoogleApiError> {
        let resp = send_with_retry(
            self.client
                .get(format!("{}/{}", GMAIL_MESSAGES, message_id))
                .bearer_auth(access_token)
                .query(&[("format", "minimal")]),
            &self.policy,
        )
        .await?;
        Ok(check_status(resp).await?.json().await?)
    }
}

#[async_trait]
impl MailService for GmailService {
    async fn send(&self, recipient: &str, message: &OutgoingMessage) -> Result<(), SlotdeskError> {
        self.send_raw(recipient, message).await?;
        log::info!("Gmail: sent '{}' to {}", message.subject, recipient);
        Ok(())
    }

    async fn list_since(
        &self,
        sender: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, SlotdeskError> {
        Ok(self.list_from(sender, since).await?)
    }
}
