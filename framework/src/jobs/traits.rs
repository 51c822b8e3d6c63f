use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use super::failure::JobFailure;

/// Converts a job into an external side effect.
///
/// The [`Worker`](super::Worker) calls `handle` for one job at a time, in
/// submission order. A returned [`JobFailure`] is forwarded to the error
/// channel and the worker moves on to the next job; nothing is retried.
///
/// ```ignore
/// struct Audit;
///
/// #[async_trait]
/// impl Handler for Audit {
///     type Job = AuditEvent;
///
///     async fn handle(&self, job: AuditEvent) -> Result<(), JobFailure> {
///         write_audit_line(&job)
///             .await
///             .map_err(|e| JobFailure::new(Stage::Deliver, &job.user, "audit", e))
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// The unit of work accepted by this handler.
    type Job: Send + 'static;

    /// Process a single job to completion.
    async fn handle(&self, job: Self::Job) -> Result<(), JobFailure>;
}

#[async_trait]
impl<H: Handler> Handler for Arc<H> {
    type Job = H::Job;

    async fn handle(&self, job: Self::Job) -> Result<(), JobFailure> {
        (**self).handle(job).await
    }
}

/// A [`Handler`] backed by an async closure. Created with [`handler_fn`].
pub struct FnHandler<F, J> {
    f: F,
    _job: PhantomData<fn(J)>,
}

/// Wrap an async closure as a [`Handler`].
///
/// ```ignore
/// let handler = handler_fn(|n: u32| async move {
///     tracing::info!(n, "handled");
///     Ok(())
/// });
/// ```
pub fn handler_fn<J, F, Fut>(f: F) -> FnHandler<F, J>
where
    J: Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobFailure>> + Send + 'static,
{
    FnHandler {
        f,
        _job: PhantomData,
    }
}

#[async_trait]
impl<J, F, Fut> Handler for FnHandler<F, J>
where
    J: Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobFailure>> + Send + 'static,
{
    type Job = J;

    async fn handle(&self, job: J) -> Result<(), JobFailure> {
        (self.f)(job).await
    }
}
