//! Outbound mail jobs and the handler that delivers them.
//!
//! This module provides the job type submitted to a
//! [`Dispatcher`](crate::jobs::Dispatcher), template rendering through
//! [minijinja](https://docs.rs/minijinja), and a thin abstraction over
//! [lettre](https://lettre.rs) for delivery.
//!
//! # Quick Start
//!
//! ```ignore
//! // 1. Transport and templates
//! let mailer = SmtpMailer::from_env()?;
//! let templates = Templates::from_dir("templates");
//!
//! // 2. Dispatcher
//! let dispatcher = Dispatcher::builder(MailHandler::new(mailer, templates)).start();
//!
//! // 3. Submit from anywhere
//! let job = MailJob::builder()
//!     .to("user@example.com")
//!     .subject("Activate your account")
//!     .template("confirmation-email")
//!     .data(activation_url)
//!     .build()?;
//! dispatcher.submit(job).await?;
//! ```
//!
//! # Templates
//!
//! A template named `confirmation-email` is rendered from
//! `confirmation-email.html` and/or `confirmation-email.txt`. When both exist
//! the mail is sent as multipart/alternative. The job's data is available as
//! `message`, alongside `recipient` and `subject`.
//!
//! # Environment Variables
//!
//! The [`SmtpMailer::from_env`] method reads:
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `SMTP_HOST` | Yes | SMTP server hostname |
//! | `SMTP_PORT` | No | Port (default: 587) |
//! | `SMTP_USERNAME` | No | Username for authentication |
//! | `SMTP_PASSWORD` | No | Password for authentication |
//! | `SMTP_FROM` | Yes | Default sender address |
//! | `SMTP_TLS` | No | `starttls` (default), `tls`, or `none` |
//! | `SMTP_TIMEOUT` | No | Connection timeout in seconds (default: 10) |

mod handler;
mod job;
mod mailer;
mod memory;
mod message;
mod templates;

pub use handler::MailHandler;
pub use job::{MailJob, MailJobBuilder};
pub use mailer::{Mailer, MailerConfig, SmtpMailer};
pub use memory::MemoryMailer;
pub use message::{Attachment, Email, EmailBody};
pub use templates::Templates;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("missing required config: {0}")]
    MissingConfig(String),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("failed to read attachment {}: {source}", .path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SMTP error: {0}")]
    Smtp(String),
}
