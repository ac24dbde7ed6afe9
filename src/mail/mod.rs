//! Transactional email: message type, delivery backends and the background queue.

pub mod queue;
pub mod templates;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

pub use queue::{EmailQueue, EmailWorker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailJob {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
}

impl EmailJob {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            html_body: html_body.into(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, job: &EmailJob) -> anyhow::Result<()>;
}

/// Delivers through the Mailgun messages API.
pub struct MailgunMailer {
    client: Client,
    api_key: String,
    domain: String,
    from: String,
}

impl MailgunMailer {
    pub fn new(api_key: String, domain: String, from: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            api_key,
            domain,
            from,
        })
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send(&self, job: &EmailJob) -> anyhow::Result<()> {
        let url = format!("https://api.mailgun.net/v3/{}/messages", self.domain);
        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", self.from.as_str()),
                ("to", job.recipient.as_str()),
                ("subject", job.subject.as_str()),
                ("html", job.html_body.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("mailgun returned {status}: {body}");
        }
        Ok(())
    }
}

/// Logs messages instead of sending them. Used when no provider is configured.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, job: &EmailJob) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %job.recipient,
            subject = %job.subject,
            bytes = job.html_body.len(),
            "email delivery disabled, message logged"
        );
        Ok(())
    }
}
