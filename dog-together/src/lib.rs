//! # dog-together: Bounded-Concurrency Job Execution
//!
//! Run producer-discovered work through a fixed pool of async workers, with
//! backpressure, typed payloads and cooperative cancellation.
//!
//! ## Building blocks
//!
//! - [`JobQueue`]: one producer pushes jobs of unknown count into a buffer
//!   sized to the concurrency; `concurrency` workers execute them.
//!   Production errors and per-job outcomes reach separate callbacks.
//!   Cancellation stops further pushes; accepted jobs still run unless
//!   [`CancelPolicy::Discard`] is chosen.
//! - [`FanOut`]: start a fixed set of tasks at once and wait for all.
//! - [`Items`]: run a callback over a finite sequence, sequentially or in
//!   parallel, optionally bounded through a [`JobQueue`].
//!
//! ## Quick start
//!
//! ```rust
//! use dog_together::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut results = Vec::new();
//! let mut failures = Vec::new();
//!
//! let queue = JobQueue::builder()
//!     .concurrency(1)
//!     .add_job(|jobs: JobSender<u32>| async move {
//!         for n in 1..=4 {
//!             jobs.send(n).await?;
//!         }
//!         Ok(())
//!     })
//!     .do_job(|n: u32| async move {
//!         if n == 3 {
//!             Err(format!("job {n} failed"))
//!         } else {
//!             Ok(n * 10)
//!         }
//!     })
//!     .on_add_job_error(|err| eprintln!("{err}"))
//!     .on_job_error(|err| failures.push(err))
//!     .on_job_success(|result| results.push(result))
//!     .build()
//!     .expect("valid configuration");
//!
//! let summary = queue.run().await;
//!
//! assert_eq!(results, vec![10, 20, 40]);
//! assert_eq!(failures, vec!["job 3 failed".to_string()]);
//! assert_eq!(summary.jobs.accepted, 4);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fanout;
pub mod items;
pub mod observability;
pub mod queue;
pub mod types;

pub use config::{CancelPolicy, QueueConfig};
pub use error::{Canceled, ConfigError, ConfigResult, ProductionError};
pub use fanout::FanOut;
pub use items::{Items, ParallelRun};
pub use observability::{MetricsSnapshot, QueueMetrics};
pub use queue::{JobQueue, JobSender, QueueBuilder};
pub use types::{ProductionStatus, QueueState, RunId, RunSummary};

pub use tokio_util::sync::CancellationToken;

/// Everything needed to configure and run queues
pub mod prelude {
    pub use crate::{
        CancelPolicy, CancellationToken, FanOut, Items, JobQueue, JobSender, ProductionError,
        QueueConfig, RunSummary,
    };

    pub use crate::{Canceled, ConfigError, ProductionStatus, QueueState};
}
