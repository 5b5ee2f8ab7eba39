use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a job queue.
///
/// A queue starts `Idle`, moves to `Running` when `run` is awaited, to
/// `Draining` once the producer's terminal status has been observed, and
/// ends `Terminated` after every worker has exited. Transitions only move
/// forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Idle,
    Running,
    Draining,
    Terminated,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the producer's run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    /// The producer returned `Ok(())`
    Completed,
    /// The producer returned its own error
    Failed,
    /// The producer stopped on the cancellation signal
    Canceled,
}

impl fmt::Display for ProductionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        assert!(QueueState::Idle < QueueState::Running);
        assert!(QueueState::Running < QueueState::Draining);
        assert!(QueueState::Draining < QueueState::Terminated);
        assert!(QueueState::Terminated.is_terminal());
        assert!(!QueueState::Draining.is_terminal());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&QueueState::Draining).unwrap();
        assert_eq!(json, "\"draining\"");
        let status: ProductionStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(status, ProductionStatus::Canceled);
    }
}
