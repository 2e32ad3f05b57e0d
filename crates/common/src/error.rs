use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The collaborator has no data for this pair right now. The loop skips
    /// the pair for the current cycle.
    #[error("Market data unavailable for {pair} ({timeframe})")]
    Unavailable { pair: String, timeframe: String },

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Alert delivery failed: {0}")]
    Alert(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn unavailable(pair: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Error::Unavailable {
            pair: pair.into(),
            timeframe: timeframe.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Unavailable { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
