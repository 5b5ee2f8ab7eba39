//! Run a callback over a known, finite sequence of items.
//!
//! Sequential modes await each invocation before starting the next.
//! Parallel modes are deferred: they return a [`ParallelRun`] so a bound
//! can be set before anything starts. Without a bound every item gets its
//! own task through [`FanOut`]; with one, the items flow through a
//! [`JobQueue`] in sequence order.
//!
//! ```rust
//! use dog_together::Items;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! Items::new(vec![100u64, 200, 101, 201])
//!     .queue_with_index(|ms, i| async move {
//!         tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
//!         println!("{ms} {i} OK");
//!     })
//!     .with_concurrency(2)
//!     .run()
//!     .await
//!     .unwrap();
//! # }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, instrument};

use crate::{
    config::default_concurrency, ConfigResult, FanOut, JobQueue, JobSender, ProductionError,
};

type ItemFn<T> = Arc<dyn Fn(T, usize) -> BoxFuture<'static, ()> + Send + Sync>;

/// An ordered, finite sequence of items to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Items<T> {
    items: Vec<T>,
}

impl<T> Items<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items
    }

    /// Call `f` for each item in order, one at a time
    pub async fn each<F, Fut>(self, mut f: F)
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        for item in self.items {
            f(item).await;
        }
    }

    /// Call `f` with each item and its position, in order, one at a time
    pub async fn each_with_index<F, Fut>(self, mut f: F)
    where
        F: FnMut(T, usize) -> Fut,
        Fut: Future<Output = ()>,
    {
        for (index, item) in self.items.into_iter().enumerate() {
            f(item, index).await;
        }
    }
}

impl<T: Send + 'static> Items<T> {
    /// Call `f` for every item at once; unbounded unless a concurrency is set
    pub fn parallel<F, Fut>(self, f: F) -> ParallelRun<T>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.parallel_with_index(move |item, _| f(item))
    }

    /// Index-aware [`Items::parallel`]
    pub fn parallel_with_index<F, Fut>(self, f: F) -> ParallelRun<T>
    where
        F: Fn(T, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        ParallelRun {
            items: self.items,
            f: Arc::new(move |item, index| f(item, index).boxed()),
            concurrency: None,
        }
    }

    /// [`Items::parallel`] bounded to the available CPU parallelism
    pub fn queue<F, Fut>(self, f: F) -> ParallelRun<T>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.parallel(f).with_concurrency(default_concurrency())
    }

    /// [`Items::parallel_with_index`] bounded to the available CPU parallelism
    pub fn queue_with_index<F, Fut>(self, f: F) -> ParallelRun<T>
    where
        F: Fn(T, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.parallel_with_index(f).with_concurrency(default_concurrency())
    }
}

impl<T> FromIterator<T> for Items<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<T> From<Vec<T>> for Items<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

/// A parallel pass over items that has not started yet
pub struct ParallelRun<T> {
    items: Vec<T>,
    f: ItemFn<T>,
    concurrency: Option<usize>,
}

impl<T: Send + 'static> ParallelRun<T> {
    /// Bound how many invocations run at once; must be at least 1
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Remove the bound: one task per item
    pub fn unbounded(mut self) -> Self {
        self.concurrency = None;
        self
    }

    pub fn concurrency(&self) -> Option<usize> {
        self.concurrency
    }

    /// Invoke the callback for every item and wait for all of them.
    ///
    /// A bound below 1 is rejected before any item is touched. Panics in
    /// the callback are resumed here once the other invocations finish.
    #[instrument(name = "items", skip_all, fields(items = self.items.len(), concurrency = ?self.concurrency))]
    pub async fn run(self) -> ConfigResult<()> {
        let ParallelRun {
            items,
            f,
            concurrency,
        } = self;

        match concurrency {
            None => {
                debug!("running items unbounded");
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let f = f.clone();
                        move || f(item, index)
                    })
                    .collect::<FanOut>()
                    .run()
                    .await;
            }
            Some(limit) => {
                debug!(limit, "running items through job queue");
                JobQueue::builder()
                    .concurrency(limit)
                    .add_job(move |jobs: JobSender<(usize, T)>| async move {
                        for positioned in items.into_iter().enumerate() {
                            jobs.send(positioned).await?;
                        }
                        Ok::<(), ProductionError<Infallible>>(())
                    })
                    .do_job(move |(index, item): (usize, T)| {
                        let invocation = f(item, index);
                        async move {
                            invocation.await;
                            Ok::<(), Infallible>(())
                        }
                    })
                    .on_add_job_error(|_| {})
                    .on_job_error(|never| match never {})
                    .on_job_success(|()| {})
                    .build()?
                    .run()
                    .await;
            }
        }

        Ok(())
    }
}
