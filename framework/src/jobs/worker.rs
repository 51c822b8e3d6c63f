use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use super::failure::JobFailure;
use super::traits::Handler;

/// Stop request sent by [`Dispatcher::stop`](super::Dispatcher::stop).
///
/// The worker answers on `reply` with the channel ends it owns, so the caller
/// can only close them after the loop has exited.
pub(crate) struct Stop<J> {
    pub(crate) reply: oneshot::Sender<Drained<J>>,
}

/// Channel ends handed back by the worker after it observed a [`Stop`].
pub(crate) struct Drained<J> {
    pub(crate) jobs: mpsc::Receiver<J>,
    pub(crate) failures: mpsc::UnboundedSender<JobFailure>,
}

/// The single consumer of a [`Dispatcher`](super::Dispatcher)'s queue.
///
/// Jobs are handled strictly one at a time, in the order they were
/// submitted. The stop channel is checked before every receive, and a job
/// that has started always runs to completion. Each job runs in its own
/// task, so a panicking handler is reported as a [`Stage::Handle`] failure
/// and the loop carries on.
///
/// [`Stage::Handle`]: super::Stage::Handle
///
/// ```ignore
/// let (dispatcher, worker, failures) = Dispatcher::builder(handler).build();
/// tokio::spawn(failures.log());
/// tokio::spawn(worker.run());
/// ```
pub struct Worker<H: Handler> {
    pub(crate) handler: H,
    pub(crate) jobs: mpsc::Receiver<H::Job>,
    pub(crate) stop: mpsc::Receiver<Stop<H::Job>>,
    pub(crate) failures: mpsc::UnboundedSender<JobFailure>,
}

impl<H: Handler> Worker<H> {
    /// Run the consumer loop until a stop is requested or every
    /// [`Dispatcher`](super::Dispatcher) handle has been dropped.
    pub async fn run(self) {
        let Worker {
            handler,
            mut jobs,
            mut stop,
            failures,
        } = self;
        let handler = Arc::new(handler);

        tracing::info!("⏳ Dispatcher running");
        let mut handled: u64 = 0;

        let reply = loop {
            tokio::select! {
                biased;

                msg = stop.recv() => break msg.map(|s| s.reply),

                job = jobs.recv() => {
                    let Some(job) = job else {
                        break None;
                    };

                    handled += 1;
                    let span = tracing::info_span!("job", seq = handled);
                    span.in_scope(|| tracing::debug!("handling job"));

                    let handler = handler.clone();
                    let task = tokio::spawn(
                        async move { handler.handle(job).await }.instrument(span),
                    );
                    let result = match task.await {
                        Ok(result) => result,
                        Err(e) => Err(JobFailure::aborted(handled, e)),
                    };

                    if let Err(failure) = result {
                        if let Err(mpsc::error::SendError(failure)) = failures.send(failure) {
                            // Nobody is listening on the error channel anymore.
                            tracing::error!(%failure, "job failed");
                        }
                    }
                }
            }
        };

        tracing::info!(handled, "dispatcher loop exited");

        if let Some(reply) = reply {
            if reply.send(Drained { jobs, failures }).is_err() {
                tracing::warn!("stop requester went away before the worker replied");
            }
        }
    }
}
