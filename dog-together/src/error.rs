use thiserror::Error;

/// Result type for configuration and construction
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Invalid setup, surfaced before any job executes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Concurrency must be at least 1 (got {0})")]
    InvalidConcurrency(usize),

    #[error("Missing required callback: {0}")]
    MissingCallback(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
}

impl ConfigError {
    /// Create an invalid environment value error
    pub fn invalid_env(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidEnv {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The cancellation signal fired before a job could be pushed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("Job production canceled")]
pub struct Canceled;

/// Terminal failure of a producer, reported at most once per run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductionError<E> {
    /// Production stopped because the queue was canceled
    #[error("Job production canceled")]
    Canceled,

    /// The producer itself failed
    #[error("Job production failed: {0}")]
    Failed(E),
}

impl<E> ProductionError<E> {
    /// Wrap a producer failure
    pub fn failed(err: E) -> Self {
        Self::Failed(err)
    }

    /// Check if production stopped due to cancellation
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Borrow the producer failure, if any
    pub fn as_failed(&self) -> Option<&E> {
        match self {
            Self::Failed(err) => Some(err),
            Self::Canceled => None,
        }
    }

    /// Take the producer failure, if any
    pub fn into_failed(self) -> Option<E> {
        match self {
            Self::Failed(err) => Some(err),
            Self::Canceled => None,
        }
    }
}

impl<E> From<Canceled> for ProductionError<E> {
    fn from(_: Canceled) -> Self {
        Self::Canceled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_one(canceled: bool) -> Result<(), ProductionError<String>> {
        if canceled {
            let pushed: Result<(), Canceled> = Err(Canceled);
            pushed?;
        }
        Err(ProductionError::failed("walk failed".to_string()))
    }

    #[test]
    fn canceled_converts_with_question_mark() {
        let err = push_one(true).unwrap_err();
        assert!(err.is_canceled());
        assert_eq!(err.as_failed(), None);
    }

    #[test]
    fn failed_keeps_inner_error() {
        let err = push_one(false).unwrap_err();
        assert!(!err.is_canceled());
        assert_eq!(err.to_string(), "Job production failed: walk failed");
        assert_eq!(err.into_failed(), Some("walk failed".to_string()));
    }

    #[test]
    fn config_error_messages() {
        assert_eq!(
            ConfigError::InvalidConcurrency(0).to_string(),
            "Concurrency must be at least 1 (got 0)"
        );
        assert_eq!(
            ConfigError::MissingCallback("do_job").to_string(),
            "Missing required callback: do_job"
        );
        assert_eq!(
            ConfigError::invalid_env("DOG__CONCURRENCY", "lots").to_string(),
            "Invalid value for DOG__CONCURRENCY: \"lots\""
        );
    }
}
