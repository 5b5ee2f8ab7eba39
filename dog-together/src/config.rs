//! Queue configuration.
//!
//! A [`QueueConfig`] can be built in code, deserialized with serde, or
//! layered from environment variables using the DogRS prefix convention:
//!
//! ```bash
//! export DOG_TOGETHER__CONCURRENCY=8
//! export DOG_TOGETHER__CANCEL_POLICY=discard
//! ```
//!
//! ```rust
//! use dog_together::QueueConfig;
//!
//! let config = QueueConfig::from_vars(
//!     "DOG_TOGETHER__",
//!     [("DOG_TOGETHER__CONCURRENCY".to_string(), "8".to_string())],
//! )
//! .unwrap();
//! assert_eq!(config.concurrency, 8);
//! ```

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

/// Prefix read by [`QueueConfig::from_default_env`]
pub const ENV_PREFIX: &str = "DOG_TOGETHER__";

/// What happens to buffered, not yet started jobs once the queue is canceled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Every accepted job still executes and is reported
    #[default]
    Drain,
    /// Workers drop accepted jobs they have not started yet
    Discard,
}

impl CancelPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drain => "drain",
            Self::Discard => "discard",
        }
    }
}

impl fmt::Display for CancelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CancelPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "discard" => Ok(Self::Discard),
            _ => Err(ConfigError::invalid_env("cancel_policy", s)),
        }
    }
}

/// Configuration for a job queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of workers, and capacity of the job buffer
    pub concurrency: usize,
    /// Treatment of buffered jobs after cancellation
    pub cancel_policy: CancelPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            cancel_policy: CancelPolicy::Drain,
        }
    }
}

impl QueueConfig {
    /// Create a config with the given worker count
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }

    /// Set the worker count
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the cancellation policy
    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    /// Reject settings no queue can run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.concurrency < 1 {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }
        Ok(())
    }

    /// Defaults overridden by `DOG_TOGETHER__*` variables
    pub fn from_default_env() -> ConfigResult<Self> {
        Self::from_env(ENV_PREFIX)
    }

    /// Defaults overridden by `<prefix>CONCURRENCY` and `<prefix>CANCEL_POLICY`
    pub fn from_env(prefix: &str) -> ConfigResult<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Same as [`QueueConfig::from_env`] over an explicit variable set
    pub fn from_vars<I>(prefix: &str, vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(stripped) = key.strip_prefix(prefix) else {
                continue;
            };

            match stripped.to_ascii_lowercase().as_str() {
                "concurrency" => {
                    config.concurrency = value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::invalid_env(&key, &value))?;
                }
                "cancel_policy" => {
                    config.cancel_policy = value
                        .parse()
                        .map_err(|_| ConfigError::invalid_env(&key, &value))?;
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Available CPU parallelism, falling back to a single worker
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
