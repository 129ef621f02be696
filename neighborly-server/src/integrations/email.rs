//! Transactional email
//!
//! Handlers treat sending as best-effort: a failure is logged, never
//! returned to the caller.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::EmailConfig;

/// An outgoing email
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("email request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailerError>;
}

/// Posts `{from, to, subject, html}` to a Resend-compatible API
pub struct HttpMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: String, from: String) -> Result<Self, MailerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailerError> {
        #[derive(Serialize)]
        struct SendRequest<'a> {
            from: &'a str,
            to: [&'a str; 1],
            subject: &'a str,
            html: &'a str,
        }

        self.http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&SendRequest {
                from: &self.from,
                to: [&message.to],
                subject: &message.subject,
                html: &message.html,
            })
            .send()
            .await?
            .error_for_status()?;

        tracing::info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

/// Logs instead of sending (no API key configured)
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailerError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.html,
            "email not sent (no EMAIL_API_KEY)"
        );
        Ok(())
    }
}

/// Records messages for inspection in tests
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    /// Most recent message to an address.
    pub async fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.to == to)
            .cloned()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailerError> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}

/// Pick the mailer for a configuration.
pub fn mailer_from_config(config: &EmailConfig) -> Result<Box<dyn Mailer>, MailerError> {
    match &config.api_key {
        Some(key) => Ok(Box::new(HttpMailer::new(
            config.api_url.clone(),
            key.clone(),
            config.from.clone(),
        )?)),
        None => {
            tracing::warn!("EMAIL_API_KEY not set, emails will only be logged");
            Ok(Box::new(LogMailer))
        }
    }
}

/// Minimal HTML escaping for user-provided text in email bodies.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Email carrying a login code.
pub fn login_code_email(to: &str, code: &str, ttl_minutes: u64) -> EmailMessage {
    EmailMessage {
        to: to.to_owned(),
        subject: format!("Your Neighborly sign-in code: {code}"),
        html: format!(
            "<p>Your sign-in code is <strong>{code}</strong>.</p>\
             <p>It expires in {ttl_minutes} minutes. If you did not ask for it, ignore this email.</p>"
        ),
    }
}

/// Email telling an applicant how their verification went.
pub fn review_email(
    to: &str,
    approved: bool,
    reason: Option<&str>,
    public_url: &str,
) -> EmailMessage {
    let (subject, verdict) = if approved {
        ("Your identity has been verified", "approved")
    } else {
        ("Your identity verification needs attention", "rejected")
    };
    let reason = reason
        .map(|r| format!("<p>Reason: {}</p>", escape_html(r)))
        .unwrap_or_default();
    EmailMessage {
        to: to.to_owned(),
        subject: subject.to_owned(),
        html: format!(
            "<p>Your verification request was {verdict}.</p>{reason}\
             <p><a href=\"{public_url}\">Open Neighborly</a></p>"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_mailer_records() {
        let mailer = MemoryMailer::new();
        mailer
            .send(login_code_email("a@example.com", "123456", 15))
            .await
            .unwrap();
        let last = mailer.last_to("a@example.com").await.unwrap();
        assert!(last.subject.contains("123456"));
        assert!(mailer.last_to("b@example.com").await.is_none());
    }

    #[test]
    fn review_email_escapes_reason() {
        let email = review_email("a@example.com", false, Some("<b>blurry</b>"), "https://x");
        assert!(email.html.contains("&lt;b&gt;blurry"));
        assert!(email.html.contains("rejected"));
    }

    #[test]
    fn no_key_means_log_mailer() {
        assert!(mailer_from_config(&EmailConfig::default()).is_ok());
    }
}
