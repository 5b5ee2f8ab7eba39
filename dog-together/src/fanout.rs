//! Unbounded fan-out over a fixed set of tasks.
//!
//! Every task is spawned at once; [`FanOut::run`] returns when all of them
//! have finished. There is no result channel: tasks report through whatever
//! they capture.

use std::future::Future;
use std::panic;

use futures::future::{BoxFuture, FutureExt};
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

type Task = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A fixed set of zero-argument tasks run concurrently
#[derive(Default)]
pub struct FanOut {
    tasks: Vec<Task>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task, builder style
    pub fn with_task<F, Fut>(mut self, task: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.push(task);
        self
    }

    /// Add a task
    pub fn push<F, Fut>(&mut self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(Box::new(move || task().boxed()));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start every task and wait for all of them.
    ///
    /// If a task panics the others still run to completion, then the first
    /// panic is resumed on the caller.
    #[instrument(name = "fan_out", skip_all, fields(tasks = self.tasks.len()))]
    pub async fn run(self) {
        let mut running = JoinSet::new();
        for task in self.tasks {
            running.spawn(task());
        }

        let mut first_panic = None;
        while let Some(joined) = running.join_next().await {
            if let Err(join_err) = joined {
                warn!(error = %join_err, "fan-out task did not finish");
                if join_err.is_panic() && first_panic.is_none() {
                    first_panic = Some(join_err.into_panic());
                }
            }
        }

        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
        debug!("all fan-out tasks finished");
    }
}

impl<F, Fut> FromIterator<F> for FanOut
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let mut fan_out = Self::new();
        for task in iter {
            fan_out.push(task);
        }
        fan_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::{sleep, Instant};

    #[tokio::test(start_paused = true)]
    async fn runs_all_tasks_concurrently() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let fan_out: FanOut = [(1, 100u64), (3, 300), (2, 200)]
            .into_iter()
            .map(|(label, ms)| {
                let finished = finished.clone();
                move || async move {
                    sleep(Duration::from_millis(ms)).await;
                    finished.lock().push(label);
                }
            })
            .collect();
        assert_eq!(fan_out.len(), 3);

        fan_out.run().await;

        assert_eq!(*finished.lock(), vec![1, 2, 3]);
        // Parallel: the slowest task bounds the run, not the sum
        assert!(start.elapsed() < Duration::from_millis(600));
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn empty_fan_out_returns() {
        let fan_out = FanOut::new();
        assert!(fan_out.is_empty());
        fan_out.run().await;
    }

    #[tokio::test]
    async fn panics_resume_after_siblings_finish() {
        let done = Arc::new(AtomicUsize::new(0));
        let sibling = done.clone();

        let fan_out = FanOut::new()
            .with_task(|| async { panic!("task blew up") })
            .with_task(move || async move {
                tokio::task::yield_now().await;
                sibling.fetch_add(1, Ordering::SeqCst);
            });

        let payload = std::panic::AssertUnwindSafe(fan_out.run())
            .catch_unwind()
            .await
            .unwrap_err();

        assert_eq!(payload.downcast_ref::<&str>(), Some(&"task blew up"));
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
