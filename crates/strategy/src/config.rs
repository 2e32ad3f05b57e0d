use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use common::Side;

/// Top-level strategy config file (TOML).
///
/// Example `config/strategy.toml`:
/// ```toml
/// [decision]
/// certainty_threshold = 70
/// order_notional_usd = 100.0
/// max_loss = "1%"
/// max_profit = "2%"
/// forced_side = ""
///
/// [[pair]]
/// symbol = "SOL_USDC"
/// tick_size = 0.001
/// maker_fee = 0.001
/// taker_fee = 0.001
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(rename = "pair", default)]
    pub pairs: Vec<PairConfig>,
}

/// Parameters of the decision engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Minimum certainty (0..=100) a side must reach to emit a proposal.
    pub certainty_threshold: u8,
    /// USD notional of every order.
    pub order_notional_usd: f64,
    /// Stop distance as a fraction of entry, e.g. 0.01 or "1%".
    #[serde(deserialize_with = "fraction")]
    pub max_loss: f64,
    /// Target distance as a fraction of entry, e.g. 0.02 or "2%".
    #[serde(deserialize_with = "fraction")]
    pub max_profit: f64,
    /// Only emit proposals on this side when set.
    #[serde(deserialize_with = "optional_side")]
    pub forced_side: Option<Side>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            certainty_threshold: 70,
            order_notional_usd: 100.0,
            max_loss: 0.01,
            max_profit: 0.02,
            forced_side: None,
        }
    }
}

/// Market metadata for one traded pair.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairConfig {
    pub symbol: String,
    #[serde(default = "default_tick_size")]
    pub tick_size: f64,
    #[serde(default = "default_fee")]
    pub maker_fee: f64,
    #[serde(default = "default_fee")]
    pub taker_fee: f64,
}

fn default_tick_size() -> f64 {
    0.0001
}

fn default_fee() -> f64 {
    0.001
}

#[derive(Debug, Error)]
pub enum StrategyFileError {
    #[error("failed to read strategy config at '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse strategy config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid strategy config: {0}")]
    Invalid(String),
}

impl StrategyFileConfig {
    /// Load and validate a TOML strategy file.
    pub fn load(path: &str) -> Result<Self, StrategyFileError> {
        let content = std::fs::read_to_string(path).map_err(|source| StrategyFileError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, StrategyFileError> {
        let cfg: Self = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), StrategyFileError> {
        let d = &self.decision;
        if d.certainty_threshold > 100 {
            return Err(StrategyFileError::Invalid(format!(
                "certainty_threshold must be within 0..=100, got {}",
                d.certainty_threshold
            )));
        }
        if !(d.order_notional_usd > 0.0) {
            return Err(StrategyFileError::Invalid(
                "order_notional_usd must be positive".into(),
            ));
        }
        if !(d.max_loss >= 0.0) || !(d.max_profit >= 0.0) {
            return Err(StrategyFileError::Invalid(
                "max_loss and max_profit must be non-negative".into(),
            ));
        }
        if self.pairs.is_empty() {
            return Err(StrategyFileError::Invalid(
                "at least one [[pair]] is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for pair in &self.pairs {
            if !seen.insert(pair.symbol.as_str()) {
                return Err(StrategyFileError::Invalid(format!(
                    "pair '{}' is listed more than once",
                    pair.symbol
                )));
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFraction {
    Number(f64),
    Text(String),
}

/// Accepts `0.01` or `"1%"`.
fn fraction<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match RawFraction::deserialize(deserializer)? {
        RawFraction::Number(v) => Ok(v),
        RawFraction::Text(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct
                    .trim()
                    .parse::<f64>()
                    .map(|v| v / 100.0)
                    .map_err(serde::de::Error::custom),
                None => s.parse::<f64>().map_err(serde::de::Error::custom),
            }
        }
    }
}

/// Accepts `"long"`, `"short"` (any case) or an empty string for none.
fn optional_side<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Side>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    match raw.trim().to_lowercase().as_str() {
        "" => Ok(None),
        "long" => Ok(Some(Side::Long)),
        "short" => Ok(Some(Side::Short)),
        other => Err(serde::de::Error::custom(format!(
            "forced_side must be 'long', 'short' or empty, got '{other}'"
        ))),
    }
}
