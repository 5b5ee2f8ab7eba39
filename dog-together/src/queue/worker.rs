use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{config::CancelPolicy, observability::QueueMetrics};

/// Per-job execution function shared by every worker
pub(crate) type DoJobFn<J, R, E> = Arc<dyn Fn(J) -> BoxFuture<'static, Result<R, E>> + Send + Sync>;

/// Result of one job, handed back to the `run` task for callback dispatch
pub(crate) enum Outcome<R, E> {
    Success(R),
    Failure(E),
}

/// Fires the queue's cancellation signal when a job panic unwinds the worker.
///
/// Once the last worker is gone the producer can no longer push; the signal
/// makes that visible as a cancellation rather than a silent close.
struct CancelOnPanic<'a>(&'a CancellationToken);

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!("job panicked, canceling queue");
            self.0.cancel();
        }
    }
}

/// One of the queue's fixed pool of executors
pub(crate) struct Worker<J, R, E> {
    pub(crate) id: usize,
    pub(crate) jobs: Arc<Mutex<mpsc::Receiver<J>>>,
    pub(crate) do_job: DoJobFn<J, R, E>,
    pub(crate) outcomes: mpsc::Sender<Outcome<R, E>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) cancel_policy: CancelPolicy,
    pub(crate) metrics: Arc<QueueMetrics>,
}

impl<J, R, E> Worker<J, R, E>
where
    J: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Take jobs until the buffer is both empty and closed
    pub(crate) async fn run(self) {
        debug!(worker_id = self.id, "worker started");
        let _cancel_on_panic = CancelOnPanic(&self.cancel);

        while let Some(job) = self.next_job().await {
            if self.cancel_policy == CancelPolicy::Discard && self.cancel.is_cancelled() {
                self.metrics.record_discarded();
                trace!(worker_id = self.id, "discarded buffered job after cancel");
                continue;
            }

            let outcome = {
                let _in_flight = self.metrics.start_job();
                (self.do_job)(job).await
            };

            let outcome = match outcome {
                Ok(result) => {
                    self.metrics.record_succeeded();
                    Outcome::Success(result)
                }
                Err(err) => {
                    self.metrics.record_failed();
                    Outcome::Failure(err)
                }
            };

            // Bounded: a slow callback on the `run` task holds workers back.
            // The receiver lives in `run` until every worker has exited.
            let _ = self.outcomes.send(outcome).await;
        }

        debug!(worker_id = self.id, "worker retired");
    }

    /// FIFO hand-off: the receiver lock is fair, so waiting workers are
    /// served in arrival order
    async fn next_job(&self) -> Option<J> {
        let mut jobs = self.jobs.lock().await;
        jobs.recv().await
    }
}
