use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{observability::QueueMetrics, Canceled};

/// Producer side of the bounded job buffer.
///
/// Handed to the producer once per run. Cloning is allowed; the buffer
/// closes, and workers start retiring, only after every clone is dropped.
pub struct JobSender<J> {
    jobs: mpsc::Sender<J>,
    cancel: CancellationToken,
    metrics: Arc<QueueMetrics>,
}

impl<J> JobSender<J> {
    pub(crate) fn new(
        jobs: mpsc::Sender<J>,
        cancel: CancellationToken,
        metrics: Arc<QueueMetrics>,
    ) -> Self {
        Self {
            jobs,
            cancel,
            metrics,
        }
    }

    /// Push a job, waiting for buffer space.
    ///
    /// Races the push against the cancellation signal, checking the signal
    /// first. On `Err(Canceled)` the job was not accepted and is dropped;
    /// the producer should stop and return the error. The same error is
    /// returned if no worker is left to ever receive the job, which only
    /// happens after a job panic has fired the signal.
    pub async fn send(&self, job: J) -> Result<(), Canceled> {
        let pushed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Canceled),
            sent = self.jobs.send(job) => sent.map_err(|_| Canceled),
        };

        match pushed {
            Ok(()) => {
                self.metrics.record_accepted();
                trace!("job accepted into buffer");
                Ok(())
            }
            Err(canceled) => {
                self.metrics.record_rejected();
                trace!("job rejected, queue canceled");
                Err(canceled)
            }
        }
    }

    /// Whether the cancellation signal has fired
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the cancellation signal fires
    pub async fn canceled(&self) {
        self.cancel.cancelled().await
    }

    /// Free slots in the job buffer right now
    pub fn capacity(&self) -> usize {
        self.jobs.capacity()
    }
}

impl<J> Clone for JobSender<J> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            cancel: self.cancel.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(capacity: usize) -> (JobSender<u32>, mpsc::Receiver<u32>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let metrics = Arc::new(QueueMetrics::new());
        (JobSender::new(tx, cancel.clone(), metrics), rx, cancel)
    }

    #[tokio::test]
    async fn accepted_jobs_reach_the_buffer() {
        let (jobs, mut rx, _cancel) = sender(2);

        jobs.send(1).await.unwrap();
        jobs.send(2).await.unwrap();

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(jobs.metrics.accepted(), 2);
    }

    #[tokio::test]
    async fn cancellation_wins_over_free_space() {
        let (jobs, mut rx, cancel) = sender(4);
        cancel.cancel();

        assert_eq!(jobs.send(1).await, Err(Canceled));
        assert!(jobs.is_canceled());
        assert!(rx.try_recv().is_err());
        assert_eq!(jobs.metrics.rejected(), 1);
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_full_buffer() {
        let (jobs, _rx, cancel) = sender(1);
        jobs.send(1).await.unwrap();

        let blocked = {
            let jobs = jobs.clone();
            tokio::spawn(async move { jobs.send(2).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        assert_eq!(blocked.await.unwrap(), Err(Canceled));
        assert_eq!(jobs.metrics.accepted(), 1);
    }

    #[tokio::test]
    async fn capacity_tracks_free_slots() {
        let (jobs, mut rx, _cancel) = sender(2);
        assert_eq!(jobs.capacity(), 2);

        jobs.send(1).await.unwrap();
        assert_eq!(jobs.capacity(), 1);

        rx.recv().await;
        assert_eq!(jobs.capacity(), 2);
    }

    #[tokio::test]
    async fn closed_buffer_reports_canceled() {
        let (jobs, rx, _cancel) = sender(1);
        drop(rx);

        assert_eq!(jobs.send(1).await, Err(Canceled));
    }
}
