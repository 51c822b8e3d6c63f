use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{Email, Mailer, MailError};

/// In-memory [`Mailer`] for development and testing.
///
/// Every delivered email is recorded in order. Nothing leaves the process.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<Email>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the emails delivered so far.
    pub async fn sent(&self) -> Vec<Email> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::debug!(to = %email.to, subject = %email.subject, "recording email");
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}
