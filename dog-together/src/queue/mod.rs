//! Bounded job queue.
//!
//! One producer discovers jobs and pushes them into a buffer whose capacity
//! equals the concurrency; a fixed pool of workers drains it. Production
//! errors and per-job outcomes come back through separate paths and are
//! dispatched to the caller's callbacks from the task awaiting [`JobQueue::run`].
//!
//! ```rust
//! use dog_together::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut sizes = Vec::new();
//! let mut errors = 0;
//!
//! let queue = JobQueue::builder()
//!     .concurrency(2)
//!     .add_job(|jobs: JobSender<&'static str>| async move {
//!         for word in ["dog", "together", "queue"] {
//!             jobs.send(word).await?;
//!         }
//!         Ok(())
//!     })
//!     .do_job(|word: &'static str| async move { Ok::<_, String>(word.len()) })
//!     .on_add_job_error(|_err| errors += 1)
//!     .on_job_error(|_err| {})
//!     .on_job_success(|len| sizes.push(len))
//!     .build()
//!     .unwrap();
//!
//! let summary = queue.run().await;
//! assert!(summary.is_clean());
//! sizes.sort();
//! assert_eq!(sizes, vec![3, 5, 8]);
//! assert_eq!(errors, 0);
//! # }
//! ```

mod sender;
mod worker;

pub use sender::JobSender;

use std::fmt;
use std::future::Future;
use std::panic;
use std::sync::Arc;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, instrument, warn, Instrument};

use crate::{
    config::{CancelPolicy, QueueConfig},
    observability::QueueMetrics,
    types::{ProductionStatus, QueueState, RunId, RunSummary},
    ConfigError, ConfigResult, ProductionError,
};
use worker::{DoJobFn, Outcome, Worker};

type AddJobFn<J, E> =
    Box<dyn FnOnce(JobSender<J>) -> BoxFuture<'static, Result<(), ProductionError<E>>> + Send>;
type Callback<'a, T> = Box<dyn FnMut(T) + Send + 'a>;

type Panic = Box<dyn std::any::Any + Send + 'static>;

/// A configured, not yet started job queue.
///
/// `J` is the job payload, `R` the result of a successful job and `E` the
/// failure type shared by jobs and the producer. Callbacks run one at a
/// time on the task awaiting [`JobQueue::run`], so they may be `FnMut` and
/// borrow from the caller for `'a`.
pub struct JobQueue<'a, J, R, E> {
    run_id: RunId,
    config: QueueConfig,
    add_job: AddJobFn<J, E>,
    do_job: DoJobFn<J, R, E>,
    on_add_job_error: Callback<'a, ProductionError<E>>,
    on_job_error: Callback<'a, E>,
    on_job_success: Callback<'a, R>,
    cancel: CancellationToken,
    metrics: Arc<QueueMetrics>,
    state: watch::Sender<QueueState>,
}

impl<'a, J, R, E> JobQueue<'a, J, R, E>
where
    J: Send + 'static,
    R: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Start configuring a queue
    pub fn builder() -> QueueBuilder<'a, J, R, E> {
        QueueBuilder::new()
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Token that fires this queue's cancellation signal.
    ///
    /// Cancelling is idempotent. It stops the producer's future pushes;
    /// jobs already running are never interrupted.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fire the cancellation signal
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Live counters, readable before, during and after the run
    pub fn metrics(&self) -> Arc<QueueMetrics> {
        self.metrics.clone()
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<QueueState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    /// Run the producer and the worker pool to completion.
    ///
    /// Returns only once the producer has terminated, its status has been
    /// reported, and every accepted job has been executed and reported (or
    /// discarded under [`CancelPolicy::Discard`]). A panic in the producer
    /// or a job is resumed here after the remaining workers have drained;
    /// a job panic also fires the cancellation signal, so the producer stops
    /// with [`ProductionError::Canceled`].
    ///
    /// Outcomes wait in a buffer of `concurrency` slots for the callbacks.
    /// Slow callbacks therefore throttle the workers instead of letting
    /// results pile up.
    #[instrument(
        name = "job_queue",
        skip_all,
        fields(run_id = %self.run_id, concurrency = self.config.concurrency)
    )]
    pub async fn run(self) -> RunSummary {
        let JobQueue {
            run_id,
            config,
            add_job,
            do_job,
            mut on_add_job_error,
            mut on_job_error,
            mut on_job_success,
            cancel,
            metrics,
            state,
        } = self;

        let started_at = Utc::now();
        let (job_tx, job_rx) = mpsc::channel(config.concurrency);
        let (outcome_tx, mut outcome_rx) = mpsc::channel(config.concurrency);

        transition(&state, QueueState::Running);
        info!(cancel_policy = %config.cancel_policy, "job queue running");

        let sender = JobSender::new(job_tx, cancel.clone(), metrics.clone());
        let mut producer = tokio::spawn(add_job(sender).instrument(debug_span!("producer")));

        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = JoinSet::new();
        for id in 0..config.concurrency {
            let worker = Worker {
                id,
                jobs: job_rx.clone(),
                do_job: do_job.clone(),
                outcomes: outcome_tx.clone(),
                cancel: cancel.clone(),
                cancel_policy: config.cancel_policy,
                metrics: metrics.clone(),
            };
            workers.spawn(worker.run().instrument(debug_span!("worker", worker_id = id)));
        }
        // Workers hold the only remaining handles; the outcome stream ends
        // when the last one retires
        drop(outcome_tx);
        drop(job_rx);

        let mut first_panic: Option<Panic> = None;
        let mut production = None;

        loop {
            tokio::select! {
                joined = &mut producer, if production.is_none() => {
                    production = Some(observe_production(joined, &mut *on_add_job_error, &mut first_panic));
                    transition(&state, QueueState::Draining);
                }
                outcome = outcome_rx.recv() => match outcome {
                    Some(Outcome::Success(result)) => {
                        debug!("job succeeded");
                        on_job_success(result);
                    }
                    Some(Outcome::Failure(err)) => {
                        warn!(error = %err, "job failed");
                        on_job_error(err);
                    }
                    None => break,
                },
            }
        }

        // The buffer can close a moment before the producer task is joined
        let production = match production {
            Some(status) => status,
            None => {
                let status = observe_production(producer.await, &mut *on_add_job_error, &mut first_panic);
                transition(&state, QueueState::Draining);
                status
            }
        };

        while let Some(joined) = workers.join_next().await {
            keep_first_panic(joined, &mut first_panic);
        }

        transition(&state, QueueState::Terminated);

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }

        let summary = RunSummary {
            run_id,
            concurrency: config.concurrency,
            production,
            canceled: cancel.is_cancelled(),
            jobs: metrics.snapshot(),
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            production = %summary.production,
            succeeded = summary.jobs.succeeded,
            failed = summary.jobs.failed,
            discarded = summary.jobs.discarded,
            "job queue terminated"
        );

        summary
    }
}

fn transition(state: &watch::Sender<QueueState>, next: QueueState) {
    let previous = state.send_replace(next);
    debug!(from = %previous, to = %next, "queue state transition");
}

fn observe_production<E: fmt::Display>(
    joined: Result<Result<(), ProductionError<E>>, JoinError>,
    on_add_job_error: &mut (dyn FnMut(ProductionError<E>) + Send + '_),
    first_panic: &mut Option<Panic>,
) -> ProductionStatus {
    match joined {
        Ok(Ok(())) => {
            debug!("producer completed");
            ProductionStatus::Completed
        }
        Ok(Err(err)) => {
            let status = if err.is_canceled() {
                ProductionStatus::Canceled
            } else {
                ProductionStatus::Failed
            };
            warn!(error = %err, "producer stopped with error");
            on_add_job_error(err);
            status
        }
        Err(join_err) => {
            warn!(error = %join_err, "producer task did not finish");
            let status = if join_err.is_panic() {
                ProductionStatus::Failed
            } else {
                ProductionStatus::Canceled
            };
            keep_first_panic::<()>(Err(join_err), first_panic);
            status
        }
    }
}

fn keep_first_panic<T>(joined: Result<T, JoinError>, first_panic: &mut Option<Panic>) {
    if let Err(join_err) = joined {
        if join_err.is_panic() && first_panic.is_none() {
            *first_panic = Some(join_err.into_panic());
        }
    }
}

/// Collects configuration and callbacks for a [`JobQueue`].
///
/// Every callback is required; [`QueueBuilder::build`] reports the first
/// one missing.
pub struct QueueBuilder<'a, J, R, E> {
    config: QueueConfig,
    add_job: Option<AddJobFn<J, E>>,
    do_job: Option<DoJobFn<J, R, E>>,
    on_add_job_error: Option<Callback<'a, ProductionError<E>>>,
    on_job_error: Option<Callback<'a, E>>,
    on_job_success: Option<Callback<'a, R>>,
    cancel: Option<CancellationToken>,
}

impl<'a, J, R, E> QueueBuilder<'a, J, R, E>
where
    J: Send + 'static,
    R: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            add_job: None,
            do_job: None,
            on_add_job_error: None,
            on_job_error: None,
            on_job_success: None,
            cancel: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of workers and buffer capacity; must be at least 1
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.config.cancel_policy = policy;
        self
    }

    /// Follow an external token.
    ///
    /// The queue uses a child token: cancelling `parent` stops the queue,
    /// cancelling the queue never touches `parent`.
    pub fn with_cancel(mut self, parent: &CancellationToken) -> Self {
        self.cancel = Some(parent.child_token());
        self
    }

    /// Producer: push jobs through the sender and return the terminal status
    pub fn add_job<F, Fut>(mut self, add_job: F) -> Self
    where
        F: FnOnce(JobSender<J>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ProductionError<E>>> + Send + 'static,
    {
        self.add_job = Some(Box::new(move |jobs| add_job(jobs).boxed()));
        self
    }

    /// Execute one job
    pub fn do_job<F, Fut>(mut self, do_job: F) -> Self
    where
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        self.do_job = Some(Arc::new(move |job| do_job(job).boxed()));
        self
    }

    /// Called at most once, with the producer's error
    pub fn on_add_job_error<F>(mut self, callback: F) -> Self
    where
        F: FnMut(ProductionError<E>) + Send + 'a,
    {
        self.on_add_job_error = Some(Box::new(callback));
        self
    }

    /// Called once per failed job
    pub fn on_job_error<F>(mut self, callback: F) -> Self
    where
        F: FnMut(E) + Send + 'a,
    {
        self.on_job_error = Some(Box::new(callback));
        self
    }

    /// Called once per successful job
    pub fn on_job_success<F>(mut self, callback: F) -> Self
    where
        F: FnMut(R) + Send + 'a,
    {
        self.on_job_success = Some(Box::new(callback));
        self
    }

    /// Validate and produce an idle queue
    pub fn build(self) -> ConfigResult<JobQueue<'a, J, R, E>> {
        self.config.validate()?;

        let queue = JobQueue {
            run_id: RunId::new(),
            add_job: self.add_job.ok_or(ConfigError::MissingCallback("add_job"))?,
            do_job: self.do_job.ok_or(ConfigError::MissingCallback("do_job"))?,
            on_add_job_error: self
                .on_add_job_error
                .ok_or(ConfigError::MissingCallback("on_add_job_error"))?,
            on_job_error: self
                .on_job_error
                .ok_or(ConfigError::MissingCallback("on_job_error"))?,
            on_job_success: self
                .on_job_success
                .ok_or(ConfigError::MissingCallback("on_job_success"))?,
            cancel: self.cancel.unwrap_or_default(),
            metrics: Arc::new(QueueMetrics::new()),
            state: watch::channel(QueueState::Idle).0,
            config: self.config,
        };

        debug!(run_id = %queue.run_id, concurrency = queue.config.concurrency, "job queue built");
        Ok(queue)
    }
}

impl<'a, J, R, E> Default for QueueBuilder<'a, J, R, E>
where
    J: Send + 'static,
    R: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
