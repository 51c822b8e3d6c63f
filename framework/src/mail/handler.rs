use async_trait::async_trait;
use minijinja::context;
use serde_json::Value;
use tracing::Instrument;

use super::{Attachment, Email, EmailBody, MailError, MailJob, Mailer, Templates};
use crate::jobs::{Handler, JobFailure, Stage};

/// [`Handler`] that renders a [`MailJob`] and delivers it through a [`Mailer`].
///
/// A job naming a template is rendered against
/// `{ message: data, recipient, subject }`. A job without a template uses
/// its data as a plain-text body. Failures carry the stage they happened in
/// ([`Stage::Render`], [`Stage::Attach`] or [`Stage::Deliver`]).
pub struct MailHandler<M: Mailer> {
    mailer: M,
    templates: Templates,
}

impl<M: Mailer> MailHandler<M> {
    pub fn new(mailer: M, templates: Templates) -> Self {
        Self { mailer, templates }
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    fn body(&self, job: &MailJob) -> Result<EmailBody, MailError> {
        match job.template() {
            Some(name) => self.templates.render(
                name,
                context! {
                    message => job.data(),
                    recipient => job.recipient(),
                    subject => job.subject(),
                },
            ),
            None => match job.data() {
                Value::String(text) => Ok(EmailBody::Text(text.clone())),
                other => Ok(EmailBody::Text(serde_json::to_string_pretty(other)?)),
            },
        }
    }

    async fn compose(&self, job: &MailJob) -> Result<Email, JobFailure> {
        let body = self
            .body(job)
            .map_err(|e| job.failure(Stage::Render, e))?;

        let mut attachments = Vec::with_capacity(job.attachments().len());
        for path in job.attachments() {
            let attachment = Attachment::from_path(path)
                .await
                .map_err(|e| job.failure(Stage::Attach, e))?;
            attachments.push(attachment);
        }

        Ok(Email {
            from: job.from().map(str::to_string),
            to: job.recipient().to_string(),
            subject: job.subject().to_string(),
            body,
            attachments,
        })
    }
}

#[async_trait]
impl<M: Mailer> Handler for MailHandler<M> {
    type Job = MailJob;

    async fn handle(&self, job: MailJob) -> Result<(), JobFailure> {
        let span = tracing::info_span!(
            "mail",
            id = %job.id(),
            recipient = %job.recipient(),
            template = job.template().unwrap_or("-"),
        );

        async {
            let email = self.compose(&job).await?;

            self.mailer
                .send(&email)
                .await
                .map_err(|e| job.failure(Stage::Deliver, e))?;

            tracing::info!(subject = %job.subject(), "mail delivered");
            Ok::<(), JobFailure>(())
        }
        .instrument(span)
        .await
    }
}
