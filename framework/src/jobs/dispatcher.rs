use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::error::{SendError, TrySendError};
use tokio::sync::{mpsc, oneshot};

use super::failure::Failures;
use super::traits::Handler;
use super::worker::{Drained, Stop, Worker};
use super::{DispatcherState, ShutdownOutcome, SubmitError};
use crate::config::DispatcherConfig;

/// Queue capacity used unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 100;

struct Shared<J> {
    state: AtomicU8,
    /// Shutdown side of the stop channel. Taken exactly once by `stop`.
    stop: Mutex<Option<mpsc::Sender<Stop<J>>>>,
}

/// Producer handle for a bounded job queue drained by a single [`Worker`].
///
/// Cheap to clone; hand a clone to every component that submits jobs or
/// takes part in shutdown.
///
/// ```ignore
/// let dispatcher = Dispatcher::builder(handler).capacity(100).start();
///
/// match dispatcher.submit(job).await {
///     Ok(()) => {}
///     Err(SubmitError::Closed(job)) => tracing::warn!(?job, "dropped, shutting down"),
///     Err(SubmitError::Full(_)) => unreachable!("submit waits for room"),
/// }
/// ```
pub struct Dispatcher<J> {
    jobs: mpsc::Sender<J>,
    shared: Arc<Shared<J>>,
}

impl<J> Clone for Dispatcher<J> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<J: Send + 'static> Dispatcher<J> {
    /// Start configuring a dispatcher around `handler`.
    pub fn builder<H: Handler<Job = J>>(handler: H) -> DispatcherBuilder<H> {
        DispatcherBuilder::new(handler)
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == DispatcherState::Running
    }

    /// Maximum number of queued jobs.
    pub fn capacity(&self) -> usize {
        self.jobs.max_capacity()
    }

    /// Number of jobs waiting in the queue (excluding the one being handled).
    pub fn queued(&self) -> usize {
        self.jobs.max_capacity() - self.jobs.capacity()
    }

    /// Enqueue a job, waiting for room while the queue is full.
    ///
    /// Fails with [`SubmitError::Closed`] once shutdown has begun, including
    /// when shutdown starts while this call is waiting.
    pub async fn submit(&self, job: J) -> Result<(), SubmitError<J>> {
        if !self.is_running() {
            tracing::warn!(state = %self.state(), "job submitted after shutdown began");
            return Err(SubmitError::Closed(job));
        }

        self.jobs.send(job).await.map_err(|SendError(job)| {
            tracing::warn!("job submitted after the queue closed");
            SubmitError::Closed(job)
        })
    }

    /// Enqueue a job without waiting. Fails with [`SubmitError::Full`] when
    /// the queue is at capacity.
    pub fn try_submit(&self, job: J) -> Result<(), SubmitError<J>> {
        if !self.is_running() {
            tracing::warn!(state = %self.state(), "job submitted after shutdown began");
            return Err(SubmitError::Closed(job));
        }

        self.jobs.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => SubmitError::Full(job),
            TrySendError::Closed(job) => SubmitError::Closed(job),
        })
    }

    /// Stop the worker loop and close every channel.
    ///
    /// Sends a single stop request, waits until the worker has left its loop,
    /// then closes the submission channel, the error channel and the stop
    /// channel, in that order. Jobs still queued are discarded.
    ///
    /// Only the first call does anything; later or concurrent calls return
    /// [`ShutdownOutcome::AlreadyStopped`].
    ///
    /// If the worker was dropped without running, this returns immediately
    /// with nothing drained. See [`DispatcherBuilder::build`].
    pub async fn stop(&self) -> ShutdownOutcome {
        let claimed = self.shared.state.compare_exchange(
            DispatcherState::Running as u8,
            DispatcherState::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if claimed.is_err() {
            tracing::debug!("dispatcher shutdown already in progress");
            return ShutdownOutcome::AlreadyStopped;
        }

        let stop = match self.shared.stop.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        tracing::info!("stopping dispatcher");

        let drained = match &stop {
            Some(stop) => {
                let (reply, answer) = oneshot::channel();
                match stop.send(Stop { reply }).await {
                    Ok(()) => answer.await.ok(),
                    Err(_) => None,
                }
            }
            None => None,
        };

        let dropped = match drained {
            Some(Drained { mut jobs, failures }) => {
                jobs.close();
                let mut dropped = 0;
                while jobs.try_recv().is_ok() {
                    dropped += 1;
                }
                drop(jobs);
                drop(failures);
                dropped
            }
            None => {
                tracing::warn!("worker was not running; nothing to drain");
                0
            }
        };
        drop(stop);

        self.shared
            .state
            .store(DispatcherState::Stopped as u8, Ordering::Release);

        if dropped > 0 {
            tracing::warn!(dropped, "discarded queued jobs at shutdown");
        }
        tracing::info!("dispatcher stopped");

        ShutdownOutcome::Stopped { dropped }
    }
}

/// Configures and creates a [`Dispatcher`] and its [`Worker`].
pub struct DispatcherBuilder<H: Handler> {
    handler: H,
    capacity: usize,
}

impl<H: Handler> DispatcherBuilder<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Maximum number of queued jobs before `submit` waits (default: 100).
    /// Values below 1 are raised to 1.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Apply settings loaded from the environment.
    pub fn config(self, config: &DispatcherConfig) -> Self {
        self.capacity(config.queue_capacity)
    }

    /// Create the channels without spawning anything.
    ///
    /// The caller is responsible for running the [`Worker`] and consuming
    /// [`Failures`]. [`Dispatcher::stop`] waits for the worker to acknowledge
    /// the stop, so the worker must either be running or be dropped; a
    /// worker that is kept alive but never run makes `stop` wait forever.
    pub fn build(self) -> (Dispatcher<H::Job>, Worker<H>, Failures) {
        let (jobs_tx, jobs_rx) = mpsc::channel(self.capacity);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            jobs: jobs_tx,
            shared: Arc::new(Shared {
                state: AtomicU8::new(DispatcherState::Running as u8),
                stop: Mutex::new(Some(stop_tx)),
            }),
        };

        let worker = Worker {
            handler: self.handler,
            jobs: jobs_rx,
            stop: stop_rx,
            failures: failures_tx,
        };

        (dispatcher, worker, Failures::new(failures_rx))
    }

    /// Spawn the worker loop and a task logging failures on the current tokio
    /// runtime, returning the producer handle.
    pub fn start(self) -> Dispatcher<H::Job> {
        let capacity = self.capacity;
        let (dispatcher, worker, failures) = self.build();

        tokio::spawn(failures.log());
        tokio::spawn(worker.run());

        tracing::debug!(capacity, "dispatcher started");
        dispatcher
    }
}
