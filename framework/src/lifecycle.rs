//! Process shutdown: wait for a termination signal, drain in-flight work,
//! then stop the dispatcher.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;

use crate::jobs::{Dispatcher, ShutdownOutcome};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Completes when the process receives ctrl-c (SIGINT) or SIGTERM.
pub async fn shutdown_signal() -> Result<(), LifecycleError> {
    use tokio::signal;

    let ctrl_c = async { signal::ctrl_c().await.map_err(LifecycleError::Signal) };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(LifecycleError::Signal)?
            .recv()
            .await;
        Ok::<(), LifecycleError>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<(), LifecycleError>>();

    tokio::select! {
        res = ctrl_c => res,
        res = terminate => res,
    }
}

/// Coordinates an orderly shutdown of a [`Dispatcher`].
///
/// The sequence is strictly ordered:
///
/// 1. wait for a termination signal ([`Lifecycle::run`] only),
/// 2. wait until the in-flight work tracker is empty,
/// 3. send the dispatcher its single stop request and wait for the worker to
///    acknowledge it,
/// 4. close the submission, error and stop channels.
///
/// The tracker counts unrelated request-scoped work that must finish before
/// shutdown proceeds (spawned through [`TaskTracker::spawn`] or held as a
/// [`TaskTracker::token`]). Jobs are not tracked.
///
/// ```ignore
/// let in_flight = TaskTracker::new();
/// let lifecycle = Lifecycle::new(dispatcher.clone(), in_flight.clone())
///     .drain_timeout(Some(Duration::from_secs(30)));
///
/// in_flight.spawn(generate_invoice(dispatcher.clone()));
///
/// lifecycle.run().await?;
/// ```
pub struct Lifecycle<J> {
    dispatcher: Dispatcher<J>,
    in_flight: TaskTracker,
    drain_timeout: Option<Duration>,
    /// Set by the first `shutdown`; shared between clones.
    started: Arc<AtomicBool>,
}

impl<J> Clone for Lifecycle<J> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            in_flight: self.in_flight.clone(),
            drain_timeout: self.drain_timeout,
            started: self.started.clone(),
        }
    }
}

impl<J: Send + 'static> Lifecycle<J> {
    pub fn new(dispatcher: Dispatcher<J>, in_flight: TaskTracker) -> Self {
        Self {
            dispatcher,
            in_flight,
            drain_timeout: None,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bound the wait for in-flight work. When it elapses, shutdown proceeds
    /// anyway and queued jobs are discarded. Unbounded by default.
    pub fn drain_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher<J> {
        &self.dispatcher
    }

    pub fn in_flight(&self) -> &TaskTracker {
        &self.in_flight
    }

    /// Block until ctrl-c or SIGTERM, then shut down.
    pub async fn run(&self) -> Result<ShutdownOutcome, LifecycleError> {
        shutdown_signal().await?;
        tracing::info!("termination signal received");
        Ok(self.shutdown().await)
    }

    /// Wait for `trigger`, then shut down.
    pub async fn run_until<F: Future<Output = ()>>(&self, trigger: F) -> ShutdownOutcome {
        trigger.await;
        self.shutdown().await
    }

    /// Drain in-flight work, then stop the dispatcher.
    ///
    /// Safe to call more than once: only the first call drains and stops the
    /// dispatcher. The others return [`ShutdownOutcome::AlreadyStopped`]
    /// straight away, even while the first is still waiting on in-flight work.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        if !self.dispatcher.is_running() || self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("shutdown already in progress");
            return ShutdownOutcome::AlreadyStopped;
        }

        self.drain().await;

        let outcome = self.dispatcher.stop().await;
        if let ShutdownOutcome::Stopped { dropped } = outcome {
            tracing::info!(dropped, "shutdown complete");
        }
        outcome
    }

    async fn drain(&self) {
        self.in_flight.close();

        let pending = self.in_flight.len();
        if pending > 0 {
            tracing::info!(pending, "waiting for in-flight work");
        }

        match self.drain_timeout {
            Some(timeout) => {
                if tokio::time::timeout(timeout, self.in_flight.wait())
                    .await
                    .is_err()
                {
                    tracing::warn!(
                        remaining = self.in_flight.len(),
                        timeout_secs = timeout.as_secs(),
                        "in-flight work did not finish in time, stopping anyway"
                    );
                }
            }
            None => self.in_flight.wait().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{handler_fn, DispatcherState, JobFailure};
    use crate::jobs::{Drained, Worker};

    fn noop() -> impl crate::jobs::Handler<Job = u32> {
        handler_fn(|_: u32| async { Ok::<(), JobFailure>(()) })
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_waits_for_in_flight_work() {
        let (dispatcher, worker, _failures) = Dispatcher::builder(noop()).build();
        let Worker {
            jobs,
            mut stop,
            failures,
            ..
        } = worker;

        let in_flight = TaskTracker::new();
        let token = in_flight.token();
        let lifecycle = Lifecycle::new(dispatcher.clone(), in_flight);
        let shutdown = tokio::spawn(async move { lifecycle.shutdown().await });

        let early = tokio::time::timeout(Duration::from_secs(5), stop.recv()).await;
        assert!(early.is_err(), "stop sent while work was in flight");
        assert_eq!(dispatcher.state(), DispatcherState::Running);

        drop(token);

        let request = stop.recv().await.expect("one stop request");
        assert!(request.reply.send(Drained { jobs, failures }).is_ok());

        assert_eq!(
            shutdown.await.unwrap(),
            ShutdownOutcome::Stopped { dropped: 0 }
        );
        assert!(stop.recv().await.is_none(), "stop channel should be closed");
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_timeout_proceeds_with_work_outstanding() {
        let dispatcher = Dispatcher::builder(noop()).start();
        let in_flight = TaskTracker::new();
        let _stuck = in_flight.token();

        let lifecycle = Lifecycle::new(dispatcher.clone(), in_flight)
            .drain_timeout(Some(Duration::from_secs(1)));

        assert_eq!(
            lifecycle.shutdown().await,
            ShutdownOutcome::Stopped { dropped: 0 }
        );
        assert!(dispatcher.try_submit(1).unwrap_err().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn second_shutdown_does_not_wait_on_stuck_work() {
        let dispatcher = Dispatcher::builder(noop()).start();
        let in_flight = TaskTracker::new();
        let token = in_flight.token();
        let lifecycle = Lifecycle::new(dispatcher.clone(), in_flight);

        let first = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.shutdown().await }
        });
        tokio::task::yield_now().await;

        let second = tokio::time::timeout(Duration::from_secs(1), lifecycle.shutdown()).await;
        assert_eq!(second.ok(), Some(ShutdownOutcome::AlreadyStopped));
        assert!(!first.is_finished());

        drop(token);
        assert_eq!(
            first.await.unwrap(),
            ShutdownOutcome::Stopped { dropped: 0 }
        );
    }

    #[tokio::test]
    async fn run_until_trigger_then_stop() {
        let dispatcher = Dispatcher::builder(noop()).start();
        let lifecycle = Lifecycle::new(dispatcher.clone(), TaskTracker::new());

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move {
                lifecycle
                    .run_until(async {
                        let _ = rx.await;
                    })
                    .await
            }
        });

        tokio::task::yield_now().await;
        assert!(dispatcher.is_running());

        tx.send(()).unwrap();
        assert!(matches!(
            running.await.unwrap(),
            ShutdownOutcome::Stopped { .. }
        ));
        assert_eq!(lifecycle.shutdown().await, ShutdownOutcome::AlreadyStopped);
    }
}
