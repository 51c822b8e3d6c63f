//! Mailer trait and SMTP implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{self, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use super::{Email, EmailBody, MailError};
use crate::config::EnvConfig;

/// Async email delivery.
///
/// Implement this trait to provide alternative transports (e.g., SES, Mailgun).
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Deliver an email.
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

#[async_trait]
impl<M: Mailer> Mailer for Arc<M> {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        (**self).send(email).await
    }
}

/// Configuration for SMTP mailer.
#[derive(Debug, Clone, Deserialize)]
pub struct MailerConfig {
    /// SMTP server hostname.
    #[serde(rename = "smtp_host")]
    pub host: String,

    /// SMTP server port (default: 587).
    #[serde(rename = "smtp_port", default = "default_port")]
    pub port: u16,

    #[serde(rename = "smtp_username", default)]
    pub username: Option<String>,

    #[serde(rename = "smtp_password", default)]
    pub password: Option<String>,

    /// Default sender, used when a job does not override it.
    #[serde(rename = "smtp_from")]
    pub from: String,

    /// TLS mode: "starttls" (default), "tls", or "none".
    #[serde(rename = "smtp_tls", default = "default_tls")]
    pub tls: String,

    /// Connection timeout in seconds (default: 10).
    #[serde(rename = "smtp_timeout", default = "default_timeout")]
    pub timeout: u64,
}

fn default_port() -> u16 {
    587
}

fn default_tls() -> String {
    "starttls".to_string()
}

fn default_timeout() -> u64 {
    10
}

/// SMTP-based mailer using lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a mailer from `SMTP_*` environment variables.
    pub fn from_env() -> Result<Self, MailError> {
        let config =
            MailerConfig::from_env().map_err(|e| MailError::MissingConfig(e.to_string()))?;

        Self::from_config(config)
    }

    /// Create a mailer from explicit configuration.
    pub fn from_config(config: MailerConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from.clone()))?;

        let mut builder = match config.tls.as_str() {
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
        };

        builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout)));

        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        tracing::debug!(host = %config.host, port = config.port, tls = %config.tls, "smtp transport configured");

        Ok(Self {
            transport: Arc::new(builder.build()),
            from,
        })
    }

    /// Build a lettre Message from our Email type.
    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let from = match &email.from {
            Some(from) => from
                .parse()
                .map_err(|_| MailError::InvalidAddress(from.clone()))?,
            None => self.from.clone(),
        };

        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailError::InvalidAddress(email.to.clone()))?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject);

        let built = if email.attachments.is_empty() {
            match &email.body {
                EmailBody::Text(text) => builder.body(text.clone()),
                EmailBody::Html(html) => builder.singlepart(SinglePart::html(html.clone())),
                EmailBody::Multipart { text, html } => builder.multipart(
                    MultiPart::alternative_plain_html(text.clone(), html.clone()),
                ),
            }
        } else {
            let mut mixed = match &email.body {
                EmailBody::Text(text) => {
                    MultiPart::mixed().singlepart(SinglePart::plain(text.clone()))
                }
                EmailBody::Html(html) => MultiPart::mixed().singlepart(SinglePart::html(html.clone())),
                EmailBody::Multipart { text, html } => MultiPart::mixed().multipart(
                    MultiPart::alternative_plain_html(text.clone(), html.clone()),
                ),
            };

            for attachment in &email.attachments {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| MailError::Build(e.to_string()))?;
                mixed = mixed.singlepart(
                    message::Attachment::new(attachment.filename.clone())
                        .body(attachment.content.clone(), content_type),
                );
            }

            builder.multipart(mixed)
        };

        built.map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        Ok(())
    }
}
