pub mod ids;
pub mod state;
pub mod summary;

pub use ids::RunId;
pub use state::{ProductionStatus, QueueState};
pub use summary::RunSummary;
