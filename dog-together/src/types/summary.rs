use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProductionStatus, RunId};
use crate::observability::MetricsSnapshot;

/// Final accounting of one queue run.
///
/// `run` never fails; callers that only need a yes/no answer can use
/// [`RunSummary::is_clean`] instead of counting callback invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Queue instance that produced this summary
    pub run_id: RunId,

    /// Number of workers that ran
    pub concurrency: usize,

    /// How the producer terminated
    pub production: ProductionStatus,

    /// Whether the cancellation signal fired during the run
    pub canceled: bool,

    /// Job counters at termination
    pub jobs: MetricsSnapshot,

    /// When `run` started
    pub started_at: DateTime<Utc>,

    /// When `run` reached `Terminated`
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Jobs that reached a success or error callback
    pub fn reported(&self) -> u64 {
        self.jobs.succeeded + self.jobs.failed
    }

    /// Every accepted job was resolved, either reported or discarded
    pub fn is_settled(&self) -> bool {
        self.reported() + self.jobs.discarded == self.jobs.accepted
    }

    /// Producer completed and no job failed
    pub fn is_clean(&self) -> bool {
        self.production == ProductionStatus::Completed && self.jobs.failed == 0
    }

    /// Wall-clock duration of the run
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
