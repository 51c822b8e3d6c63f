//! The mail job submitted to a dispatcher.

use std::path::{Path, PathBuf};

use serde_json::Value;
use uuid::Uuid;

use super::MailError;
use crate::jobs::{JobFailure, Stage};

/// One outbound notification.
///
/// Immutable once built: the dispatcher and handler only read it.
///
/// ```ignore
/// let job = MailJob::builder()
///     .to("user@example.com")
///     .subject("Failed login attempt")
///     .data("Invalid login attempt")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct MailJob {
    id: Uuid,
    recipient: String,
    subject: String,
    from: Option<String>,
    template: Option<String>,
    data: Value,
    attachments: Vec<PathBuf>,
}

impl MailJob {
    /// Create a new mail job builder.
    pub fn builder() -> MailJobBuilder {
        MailJobBuilder::default()
    }

    /// Identifier assigned at build time, used to correlate log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Sender override. `None` uses the mailer's default sender.
    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// Name of the template rendering the body, if any.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Template context, or the body itself when no template is set.
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn attachments(&self) -> &[PathBuf] {
        &self.attachments
    }

    pub(crate) fn failure(&self, stage: Stage, source: MailError) -> JobFailure {
        JobFailure::new(stage, &self.recipient, &self.subject, source)
    }
}

/// Builder for constructing [`MailJob`] instances.
#[derive(Debug, Default)]
pub struct MailJobBuilder {
    recipient: Option<String>,
    subject: Option<String>,
    from: Option<String>,
    template: Option<String>,
    data: Option<Value>,
    attachments: Vec<PathBuf>,
}

impl MailJobBuilder {
    /// Set the recipient (required).
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.recipient = Some(address.into());
        self
    }

    /// Set the subject line. Defaults to empty.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Override the sender address.
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Render the body from a named template.
    pub fn template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    /// Set the payload: template context when a template is set, otherwise
    /// the body (strings are used as-is, other values as pretty JSON).
    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Attach a file. Read when the job is handled, not when it is built.
    pub fn attach(mut self, path: impl AsRef<Path>) -> Self {
        self.attachments.push(path.as_ref().to_path_buf());
        self
    }

    /// Build the job, validating required fields.
    pub fn build(self) -> Result<MailJob, MailError> {
        let recipient = self
            .recipient
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| MailError::Build("recipient required".into()))?;

        if self.template.is_none() && self.data.is_none() {
            return Err(MailError::Build("body required (template or data)".into()));
        }

        Ok(MailJob {
            id: Uuid::new_v4(),
            recipient,
            subject: self.subject.unwrap_or_default(),
            from: self.from,
            template: self.template,
            data: self.data.unwrap_or(Value::Null),
            attachments: self.attachments,
        })
    }
}
