use std::any::Any;
use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where in the handling of a job a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Locating or rendering the body template.
    Render,
    /// Loading attachments.
    Attach,
    /// Handing the message to the transport.
    Deliver,
    /// The handler panicked or its task was cancelled. The job itself is
    /// gone, so recipient and subject are empty.
    Handle,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render => write!(f, "render"),
            Self::Attach => write!(f, "attach"),
            Self::Deliver => write!(f, "deliver"),
            Self::Handle => write!(f, "handle"),
        }
    }
}

/// A job that could not be handled, with enough context to log usefully.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed for {recipient} ({subject:?}): {source}")]
pub struct JobFailure {
    pub stage: Stage,
    pub recipient: String,
    pub subject: String,
    #[source]
    pub source: BoxError,
}

impl JobFailure {
    pub fn new(
        stage: Stage,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            stage,
            recipient: recipient.into(),
            subject: subject.into(),
            source: source.into(),
        }
    }

    pub(crate) fn aborted(seq: u64, err: JoinError) -> Self {
        let reason = match err.try_into_panic() {
            Ok(payload) => format!("job {seq} panicked: {}", panic_message(&*payload)),
            Err(_) => format!("job {seq} was cancelled"),
        };
        Self::new(Stage::Handle, "", "", reason)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// Receiving end of the error channel.
///
/// The channel is unbounded so that reporting a failure never blocks the
/// worker loop. It closes once the dispatcher has shut down.
pub struct Failures {
    rx: mpsc::UnboundedReceiver<JobFailure>,
}

impl Failures {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<JobFailure>) -> Self {
        Self { rx }
    }

    /// Wait for the next failure. Returns `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<JobFailure> {
        self.rx.recv().await
    }

    /// Take a failure if one is already waiting.
    pub fn try_recv(&mut self) -> Option<JobFailure> {
        self.rx.try_recv().ok()
    }

    /// Log every failure until the channel closes.
    pub async fn log(mut self) {
        while let Some(failure) = self.rx.recv().await {
            tracing::error!(
                stage = %failure.stage,
                recipient = %failure.recipient,
                subject = %failure.subject,
                error = %failure.source,
                "job failed"
            );
        }
        tracing::debug!("failure channel closed");
    }
}
