//! In-process job dispatcher with bounded backpressure and a one-shot stop.
//!
//! # Architecture
//!
//! - [`Handler`] — Turns one job into an external side effect. Implemented by
//!   [`MailHandler`](crate::mail::MailHandler) and by closures via [`handler_fn`].
//! - [`Dispatcher`] — Cloneable producer handle. Owns the submission side of a
//!   bounded queue and the shutdown side of the stop channel.
//! - [`Worker`] — The single consumer loop. Handles jobs one at a time in
//!   submission order and forwards failures to the error channel.
//! - [`Failures`] — The error channel's receiving end. [`Failures::log`] drains
//!   it into `tracing`.
//!
//! # Quick Start
//!
//! ```ignore
//! let dispatcher = Dispatcher::builder(MailHandler::new(mailer, templates))
//!     .capacity(100)
//!     .start();
//!
//! dispatcher.submit(job).await?;
//!
//! // during shutdown, after in-flight work has drained
//! dispatcher.stop().await;
//! ```
//!
//! # Queue policy
//!
//! [`Dispatcher::submit`] waits while the queue is full. [`Dispatcher::try_submit`]
//! never waits and reports [`SubmitError::Full`] instead. Both report
//! [`SubmitError::Closed`] once shutdown has begun. Jobs still queued when the
//! worker observes the stop signal are discarded; the count is returned in
//! [`ShutdownOutcome::Stopped`].

mod dispatcher;
mod failure;
mod traits;
mod worker;

pub use dispatcher::{Dispatcher, DispatcherBuilder, DEFAULT_CAPACITY};
pub use failure::{BoxError, Failures, JobFailure, Stage};
pub use traits::{handler_fn, FnHandler, Handler};
pub use worker::Worker;
#[cfg(test)]
pub(crate) use worker::Drained;

use std::fmt;

// -------------------------------------------------------------------------
// State
// -------------------------------------------------------------------------

/// Lifecycle state of a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatcherState {
    /// Accepting submissions; the worker loop is handling jobs.
    Running = 0,
    /// Stop requested. Submissions are rejected while the worker winds down.
    Draining = 1,
    /// Channels closed. No further operations succeed.
    Stopped = 2,
}

impl DispatcherState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Result of asking a [`Dispatcher`] to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// This call performed the shutdown. `dropped` counts jobs that were still
    /// queued when the worker stopped.
    Stopped { dropped: usize },
    /// Another call already performed (or is performing) the shutdown.
    AlreadyStopped,
}

// -------------------------------------------------------------------------
// Errors
// -------------------------------------------------------------------------

/// A rejected submission. The job is handed back to the caller.
pub enum SubmitError<J> {
    /// The queue is at capacity. Only returned by [`Dispatcher::try_submit`].
    Full(J),
    /// The dispatcher has begun shutting down.
    Closed(J),
}

impl<J> SubmitError<J> {
    /// Recover the job that was not enqueued.
    pub fn into_job(self) -> J {
        match self {
            Self::Full(job) | Self::Closed(job) => job,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<J> fmt::Debug for SubmitError<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<J> fmt::Display for SubmitError<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "job queue is full"),
            Self::Closed(_) => write!(f, "dispatcher is shut down"),
        }
    }
}

impl<J> std::error::Error for SubmitError<J> {}
