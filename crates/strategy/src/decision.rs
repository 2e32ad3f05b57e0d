use std::cmp::Ordering;

use thiserror::Error;
use tracing::{debug, info, warn};

use common::{MarketQuote, ProposalDiagnostics, Side, TimeframeIndicators, TradeProposal};

use crate::config::DecisionConfig;
use crate::scoring::{ScoringEngine, MAX_SCORE};

/// Entry is placed this many ticks away from mark, against the trader.
pub const ENTRY_SLIPPAGE_TICKS: f64 = 10.0;

/// Input for one pair in a batch evaluation.
#[derive(Debug, Clone)]
pub struct PairInput {
    pub quote: MarketQuote,
    pub indicators: TimeframeIndicators,
}

/// Malformed input for a single pair. Never aborts a batch.
#[derive(Debug, Error, PartialEq)]
pub enum EvaluationError {
    #[error("{timeframe} indicator '{field}' is not a finite number")]
    NonFiniteIndicator {
        timeframe: &'static str,
        field: &'static str,
    },

    #[error("mark price must be positive and finite, got {0}")]
    InvalidMarkPrice(f64),

    #[error("market metadata '{field}' must be non-negative and finite, got {value}")]
    InvalidMarketMetadata { field: &'static str, value: f64 },

    #[error("entry price {0} is not positive")]
    NonPositiveEntry(f64),
}

/// Turns indicator triples into trade proposals.
///
/// Holds configuration only; evaluation is deterministic for a given input.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: DecisionConfig,
    scoring: ScoringEngine,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            scoring: ScoringEngine,
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Evaluate one pair. Malformed input is logged and yields `None`.
    pub fn evaluate(
        &self,
        quote: &MarketQuote,
        indicators: &TimeframeIndicators,
    ) -> Option<TradeProposal> {
        match self.try_evaluate(quote, indicators) {
            Ok(proposal) => proposal,
            Err(e) => {
                warn!(pair = %quote.pair, error = %e, "Evaluation failed, skipping pair");
                None
            }
        }
    }

    /// Evaluate one pair, surfacing malformed input as an error.
    ///
    /// `Ok(None)` means the input was valid but no trade qualifies.
    pub fn try_evaluate(
        &self,
        quote: &MarketQuote,
        indicators: &TimeframeIndicators,
    ) -> Result<Option<TradeProposal>, EvaluationError> {
        validate(quote, indicators)?;

        let scores = self.scoring.score_both(indicators);
        let long_pct = percent(scores.long_score);
        let short_pct = percent(scores.short_score);

        // Ties go to SHORT.
        let side = if scores.long_score > scores.short_score {
            Side::Long
        } else {
            Side::Short
        };
        let certainty = long_pct.max(short_pct);

        if certainty < self.config.certainty_threshold {
            debug!(
                pair = %quote.pair,
                certainty,
                threshold = self.config.certainty_threshold,
                "Certainty below threshold"
            );
            return Ok(None);
        }

        if let Some(forced) = self.config.forced_side {
            if forced != side {
                debug!(pair = %quote.pair, %side, %forced, "Ignored by forced side");
                return Ok(None);
            }
        }

        let entry = entry_price(quote.mark_price, quote.tick_size, side);
        if !(entry > 0.0) {
            return Err(EvaluationError::NonPositiveEntry(entry));
        }
        let size = self.config.order_notional_usd / entry;
        let stop = self.stop_loss(entry, size, quote.maker_fee, side);
        let target = self.take_profit(entry, size, quote.maker_fee, side);

        let (risk_usd, reward_usd) = match side {
            Side::Long => ((entry - stop) * size, (target - entry) * size),
            Side::Short => ((stop - entry) * size, (entry - target) * size),
        };

        if !(risk_usd > 0.0) {
            debug!(pair = %quote.pair, risk_usd, "Proposal carries no risk, discarding");
            return Ok(None);
        }

        let proposal = TradeProposal {
            pair: quote.pair.clone(),
            side,
            certainty,
            entry_price: entry,
            stop_loss: stop,
            take_profit: target,
            size,
            risk_usd,
            reward_usd,
            diagnostics: ProposalDiagnostics {
                long_score: scores.long_score,
                short_score: scores.short_score,
                long_pct,
                short_pct,
                fast_rsi: indicators.fast.rsi,
                medium_rsi: indicators.medium.rsi,
                slow_rsi: indicators.slow.rsi,
                medium_macd: indicators.medium.macd,
                medium_ema_diff_pct: indicators.medium.ema_diff_pct(),
            },
        };

        info!(
            pair = %proposal.pair,
            side = %proposal.side,
            certainty,
            long_pct,
            short_pct,
            entry = proposal.entry_price,
            stop = proposal.stop_loss,
            target = proposal.take_profit,
            risk_usd = proposal.risk_usd,
            reward_usd = proposal.reward_usd,
            rr = proposal.risk_reward(),
            "Trade opportunity"
        );

        Ok(Some(proposal))
    }

    /// Evaluate every pair independently.
    ///
    /// Returns proposals by descending certainty, ties broken by pair.
    /// Pairs without a proposal are omitted.
    pub fn evaluate_all(&self, inputs: &[PairInput]) -> Vec<TradeProposal> {
        let mut proposals: Vec<TradeProposal> = inputs
            .iter()
            .filter_map(|input| self.evaluate(&input.quote, &input.indicators))
            .collect();

        proposals.sort_by(|a, b| match b.certainty.cmp(&a.certainty) {
            Ordering::Equal => a.pair.cmp(&b.pair),
            other => other,
        });

        info!(
            evaluated = inputs.len(),
            opportunities = proposals.len(),
            "Evaluation complete"
        );
        proposals
    }

    fn stop_loss(&self, entry: f64, size: f64, maker_fee: f64, side: Side) -> f64 {
        let offset = level_offset(entry, size, maker_fee, self.config.max_loss);
        let stop = match side {
            Side::Long => entry - offset,
            Side::Short => entry + offset,
        };
        round6(stop)
    }

    fn take_profit(&self, entry: f64, size: f64, maker_fee: f64, side: Side) -> f64 {
        let offset = level_offset(entry, size, maker_fee, self.config.max_profit);
        let target = match side {
            Side::Long => entry + offset,
            Side::Short => entry - offset,
        };
        round6(target)
    }
}

/// Score as a truncated percentage of the maximum.
fn percent(score: u8) -> u8 {
    (u32::from(score) * 100 / u32::from(MAX_SCORE)) as u8
}

fn entry_price(mark_price: f64, tick_size: f64, side: Side) -> f64 {
    let slippage = tick_size * ENTRY_SLIPPAGE_TICKS;
    match side {
        Side::Long => round6(mark_price - slippage),
        Side::Short => round6(mark_price + slippage),
    }
}

/// Base distance `entry * fraction`, widened by the opening maker fee
/// (plus the same fraction of it) spread over the position size.
fn level_offset(entry: f64, size: f64, maker_fee: f64, fraction: f64) -> f64 {
    let fee_open = entry * size * maker_fee;
    entry * fraction + (fee_open + fee_open * fraction) / size
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

fn validate(quote: &MarketQuote, indicators: &TimeframeIndicators) -> Result<(), EvaluationError> {
    if !(quote.mark_price.is_finite() && quote.mark_price > 0.0) {
        return Err(EvaluationError::InvalidMarkPrice(quote.mark_price));
    }
    for (field, value) in [
        ("tick_size", quote.tick_size),
        ("maker_fee", quote.maker_fee),
        ("taker_fee", quote.taker_fee),
    ] {
        if !(value.is_finite() && value >= 0.0) {
            return Err(EvaluationError::InvalidMarketMetadata { field, value });
        }
    }
    for (timeframe, set) in [
        ("fast", &indicators.fast),
        ("medium", &indicators.medium),
        ("slow", &indicators.slow),
    ] {
        if let Some(field) = set.first_non_finite() {
            return Err(EvaluationError::NonFiniteIndicator { timeframe, field });
        }
    }
    Ok(())
}
