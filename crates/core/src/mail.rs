//! Outbound email for the `send_email` action.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::json;

const GMAIL_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";
const MIME_BOUNDARY: &str = "agentflow-alt-boundary";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
}

/// Transport receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentEmail {
    pub id: String,
    pub to: String,
    pub subject: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport not configured")]
    NotConfigured,
    #[error("invalid email recipient: {0:?}")]
    InvalidRecipient(String),
    #[error("send failed: {0}")]
    SendFailed(String),
}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<SentEmail, MailError>;
}

/// Installed when no transport credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMailer;

#[async_trait::async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _email: OutgoingEmail) -> Result<SentEmail, MailError> {
        Err(MailError::NotConfigured)
    }
}

/// Sends through the Gmail REST API as the token's owner.
#[derive(Clone)]
pub struct GmailMailer {
    http: reqwest::Client,
    access_token: String,
    from: Option<String>,
    send_url: String,
}

impl GmailMailer {
    pub fn new(access_token: &str, from: Option<String>) -> Result<Self, MailError> {
        let token = access_token.trim();
        if token.is_empty() {
            return Err(MailError::NotConfigured);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MailError::SendFailed(e.to_string()))?;
        Ok(Self {
            http,
            access_token: token.to_owned(),
            from: from.filter(|f| !f.trim().is_empty()),
            send_url: GMAIL_SEND_URL.to_owned(),
        })
    }

    /// Build from `AGENTFLOW_GMAIL_TOKEN` and optional `AGENTFLOW_MAIL_FROM`.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("AGENTFLOW_GMAIL_TOKEN").ok()?;
        let from = std::env::var("AGENTFLOW_MAIL_FROM").ok();
        Self::new(&token, from).ok()
    }
}

#[async_trait::async_trait]
impl Mailer for GmailMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<SentEmail, MailError> {
        validate_email_like(&email.to)?;
        let mime = build_mime_message(self.from.as_deref(), &email);
        let payload = json!({ "raw": URL_SAFE_NO_PAD.encode(mime.as_bytes()) });

        let resp = self
            .http
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read response body>".to_string());
            return Err(MailError::SendFailed(format!("status={status} body={body}")));
        }

        #[derive(Deserialize)]
        struct GmailSendResponse {
            id: String,
        }

        let sent: GmailSendResponse = resp
            .json()
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;
        tracing::info!(message_id = %sent.id, to = %email.to, "email sent");
        Ok(SentEmail { id: sent.id, to: email.to, subject: email.subject })
    }
}

pub fn validate_email_like(value: &str) -> Result<(), MailError> {
    let value = value.trim();
    if value.is_empty() || !value.contains('@') || value.contains(char::is_whitespace) {
        return Err(MailError::InvalidRecipient(value.to_owned()));
    }
    Ok(())
}

/// RFC 2822 message. Both bodies → `multipart/alternative`; otherwise a
/// single part of whichever body is present (empty text when neither is).
fn build_mime_message(from: Option<&str>, email: &OutgoingEmail) -> String {
    let mut headers = String::new();
    if let Some(from) = from {
        headers.push_str(&format!("From: {from}\r\n"));
    }
    headers.push_str(&format!(
        "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\n",
        email.to.trim(),
        strip_newlines(&email.subject)
    ));

    match (email.text.as_deref(), email.html.as_deref()) {
        (Some(text), Some(html)) => format!(
            "{headers}Content-Type: multipart/alternative; boundary=\"{MIME_BOUNDARY}\"\r\n\r\n\
             --{MIME_BOUNDARY}\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}\r\n\
             --{MIME_BOUNDARY}\r\nContent-Type: text/html; charset=\"UTF-8\"\r\n\r\n{}\r\n\
             --{MIME_BOUNDARY}--\r\n",
            normalize_body(text),
            normalize_body(html),
        ),
        (None, Some(html)) => format!(
            "{headers}Content-Type: text/html; charset=\"UTF-8\"\r\n\r\n{}\r\n",
            normalize_body(html)
        ),
        (text, None) => format!(
            "{headers}Content-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}\r\n",
            normalize_body(text.unwrap_or_default())
        ),
    }
}

fn normalize_body(body: &str) -> String {
    body.replace('\r', "")
}

// Header injection guard.
fn strip_newlines(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(text: Option<&str>, html: Option<&str>) -> OutgoingEmail {
        OutgoingEmail {
            to: "ana@example.com".into(),
            subject: "Invoice due".into(),
            text: text.map(String::from),
            html: html.map(String::from),
        }
    }

    #[test]
    fn plain_text_message() {
        let mime = build_mime_message(None, &email(Some("Please pay."), None));
        assert!(mime.starts_with("To: ana@example.com\r\nSubject: Invoice due\r\n"));
        assert!(mime.contains("Content-Type: text/plain"));
        assert!(mime.ends_with("\r\n\r\nPlease pay.\r\n"));
    }

    #[test]
    fn html_only_message() {
        let mime = build_mime_message(Some("me@example.com"), &email(None, Some("<b>Pay</b>")));
        assert!(mime.starts_with("From: me@example.com\r\n"));
        assert!(mime.contains("Content-Type: text/html"));
        assert!(!mime.contains("multipart"));
    }

    #[test]
    fn both_bodies_become_alternative_parts() {
        let mime = build_mime_message(None, &email(Some("Pay"), Some("<b>Pay</b>")));
        assert!(mime.contains("multipart/alternative"));
        assert_eq!(mime.matches(&format!("--{MIME_BOUNDARY}")).count(), 3);
    }

    #[test]
    fn subject_newlines_cannot_inject_headers() {
        let mut e = email(Some("x"), None);
        e.subject = "Hi\r\nBcc: evil@example.com".into();
        let mime = build_mime_message(None, &e);
        assert!(!mime.contains("\r\nBcc:"));
    }

    #[test]
    fn recipient_validation() {
        assert!(validate_email_like("a@b.co").is_ok());
        assert!(validate_email_like("not-an-address").is_err());
        assert!(validate_email_like("a b@c.d").is_err());
        assert!(validate_email_like("").is_err());
    }

    #[test]
    fn empty_token_is_not_configured() {
        assert!(matches!(GmailMailer::new("  ", None), Err(MailError::NotConfigured)));
    }

    #[tokio::test]
    async fn disabled_mailer_refuses() {
        let err = DisabledMailer.send(email(Some("x"), None)).await.unwrap_err();
        assert!(matches!(err, MailError::NotConfigured));
    }
}
