pub mod config;
pub mod decision;
pub mod scoring;

pub use config::{DecisionConfig, PairConfig, StrategyFileConfig, StrategyFileError};
pub use decision::{DecisionEngine, EvaluationError, PairInput};
pub use scoring::ScoringEngine;
