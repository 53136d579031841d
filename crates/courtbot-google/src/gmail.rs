//! Sending mail through the Gmail API.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use serde::Deserialize;
use tracing::info;

use crate::error::{GoogleError, GoogleResult};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Body lines of the base64 transfer encoding are wrapped at this width.
const BASE64_LINE_WIDTH: usize = 76;

/// A single-part UTF-8 text mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Renders the message as RFC 822 text.
    ///
    /// The subject is RFC 2047 encoded so Japanese survives any relay, and
    /// the body is base64 with CRLF line endings.
    pub fn to_rfc822(&self) -> String {
        let body = STANDARD.encode(self.body.as_bytes());
        let wrapped: Vec<&str> = body
            .as_bytes()
            .chunks(BASE64_LINE_WIDTH)
            // base64 output is ASCII
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
            .collect();

        format!(
            "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"utf-8\"\r\nContent-Transfer-Encoding: base64\r\n\r\n{}\r\n",
            self.to,
            encode_header(&self.subject),
            wrapped.join("\r\n"),
        )
    }

    /// The `raw` field expected by `users.messages.send`.
    pub fn to_raw(&self) -> String {
        URL_SAFE.encode(self.to_rfc822().as_bytes())
    }
}

/// UTF-8 bytes carried by one encoded word. 39 bytes are 52 base64
/// characters, so `Subject: ` plus a word stays under 76 columns.
const ENCODED_WORD_BYTES: usize = 39;

/// RFC 2047 `B` encoding, only when the value is not plain ASCII.
///
/// Long values become several encoded words, split on character
/// boundaries and folded onto continuation lines.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;
    for (i, c) in value.char_indices() {
        if i + c.len_utf8() - start > ENCODED_WORD_BYTES {
            words.push(&value[start..i]);
            start = i;
        }
    }
    words.push(&value[start..]);

    words
        .iter()
        .map(|word| format!("=?UTF-8?B?{}?=", STANDARD.encode(word.as_bytes())))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Gmail API client holding one access token.
#[derive(Debug)]
pub struct GmailClient {
    http_client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl GmailClient {
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> GoogleResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GoogleError::internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            access_token: access_token.into(),
            base_url: GMAIL_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sends `message` as `user_id` ("me" for the token's owner) and
    /// returns the new message id.
    pub async fn send(&self, user_id: &str, message: &MailMessage) -> GoogleResult<String> {
        let url = format!(
            "{}/users/{}/messages/send",
            self.base_url,
            urlencoding::encode(user_id)
        );
        let payload = serde_json::json!({ "raw": message.to_raw() }).to_string();

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                GoogleError::network(format!("send request failed: {}", e)).with_service("gmail")
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GoogleError::network(format!("failed to read response: {}", e)).with_service("gmail")
        })?;

        if !status.is_success() {
            let err = match status.as_u16() {
                400 => GoogleError::bad_request(format!("message rejected: {}", body)),
                401 => GoogleError::authentication("access token expired or invalid"),
                403 => GoogleError::insufficient_scope(format!(
                    "sending is not permitted; the token may lack the gmail.send scope: {}",
                    body
                )),
                429 => GoogleError::rate_limited("Gmail rate limit exceeded"),
                s if s >= 500 => GoogleError::server(format!("API error ({}): {}", status, body)),
                _ => GoogleError::invalid_response(format!("unexpected status {}: {}", status, body)),
            };
            return Err(err.with_service("gmail"));
        }

        let sent: SendResponse = serde_json::from_str(&body).map_err(|e| {
            GoogleError::invalid_response(format!("failed to parse response: {}", e))
                .with_service("gmail")
        })?;

        info!("sent mail to {} (id {})", message.to, sent.id);
        Ok(sent.id)
    }
}
