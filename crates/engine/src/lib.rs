pub mod alerts;
pub mod executor;
pub mod lifecycle;

pub use alerts::LogAlertSink;
pub use executor::{OpenOutcome, ProposalExecutor};
pub use lifecycle::{Collaborators, CycleReport, EngineHandle, LoopSettings, TradingLoop};
