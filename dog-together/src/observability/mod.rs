pub mod metrics;

#[cfg(feature = "tracing-basic")]
pub mod tracing;

pub use metrics::{MetricsSnapshot, QueueMetrics};

#[cfg(feature = "tracing-basic")]
pub use self::tracing::{init_tracing, init_tracing_with};
