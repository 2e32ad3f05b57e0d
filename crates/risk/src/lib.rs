pub mod performance;
pub mod tracker;

pub use performance::PerformanceReport;
pub use tracker::{PositionTracker, Rejected};
