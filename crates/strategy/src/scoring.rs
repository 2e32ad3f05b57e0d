use common::{IndicatorSet, ScoreResult, Side, TimeframeIndicators, VolumeTrend};

/// Medium-timeframe RSI above this counts as bullish momentum.
pub const RSI_LONG_THRESHOLD: f64 = 55.0;
/// Medium-timeframe RSI below this counts as bearish momentum.
pub const RSI_SHORT_THRESHOLD: f64 = 45.0;
/// Number of binary factors, and so the maximum score per side.
pub const MAX_SCORE: u8 = 9;

/// Nine-factor confluence score across three timeframes.
///
/// Stateless: every score is a pure function of the indicator triple and
/// the side being scored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    /// Score one side in `[0, MAX_SCORE]`.
    ///
    /// Factors, one point each:
    /// 1. slow EMA trend
    /// 2. medium EMA trend
    /// 3. medium RSI momentum
    /// 4. medium MACD above/below signal
    /// 5. fast close vs Bollinger mid
    /// 6. fast close vs VWAP
    /// 7. fast volume increasing (counts for either side)
    /// 8. fast price slope
    /// 9. medium stack: 2, 3 and 4 together
    pub fn score(
        &self,
        fast: &IndicatorSet,
        medium: &IndicatorSet,
        slow: &IndicatorSet,
        side: Side,
    ) -> u8 {
        let medium_trend = ema_trend(medium, side);
        let medium_momentum = rsi_momentum(medium, side);
        let medium_macd = macd_cross(medium, side);

        let factors = [
            ema_trend(slow, side),
            medium_trend,
            medium_momentum,
            medium_macd,
            above_or_below(fast.close, fast.bollinger_mid, side),
            above_or_below(fast.close, fast.vwap, side),
            fast.volume_trend == VolumeTrend::Increasing,
            above_or_below(fast.price_slope, 0.0, side),
            medium_trend && medium_momentum && medium_macd,
        ];

        factors.iter().filter(|&&hit| hit).count() as u8
    }

    /// Score both sides independently. The two scores are not complementary.
    pub fn score_both(&self, triple: &TimeframeIndicators) -> ScoreResult {
        ScoreResult {
            long_score: self.score(&triple.fast, &triple.medium, &triple.slow, Side::Long),
            short_score: self.score(&triple.fast, &triple.medium, &triple.slow, Side::Short),
        }
    }
}

/// Strictly above `reference` for LONG, strictly below for SHORT.
fn above_or_below(value: f64, reference: f64, side: Side) -> bool {
    match side {
        Side::Long => value > reference,
        Side::Short => value < reference,
    }
}

fn ema_trend(set: &IndicatorSet, side: Side) -> bool {
    above_or_below(set.ema_fast, set.ema_slow, side)
}

fn macd_cross(set: &IndicatorSet, side: Side) -> bool {
    above_or_below(set.macd, set.macd_signal, side)
}

fn rsi_momentum(set: &IndicatorSet, side: Side) -> bool {
    match side {
        Side::Long => set.rsi > RSI_LONG_THRESHOLD,
        Side::Short => set.rsi < RSI_SHORT_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neutral() -> IndicatorSet {
        IndicatorSet {
            close: 100.0,
            ema_fast: 100.0,
            ema_slow: 100.0,
            rsi: 50.0,
            macd: 0.0,
            macd_signal: 0.0,
            bollinger_mid: 100.0,
            vwap: 100.0,
            volume_trend: VolumeTrend::Flat,
            price_slope: 0.0,
        }
    }

    fn bullish() -> IndicatorSet {
        IndicatorSet {
            close: 101.0,
            ema_fast: 101.0,
            ema_slow: 100.0,
            rsi: 60.0,
            macd: 0.5,
            macd_signal: 0.2,
            bollinger_mid: 100.0,
            vwap: 100.5,
            volume_trend: VolumeTrend::Increasing,
            price_slope: 0.5,
        }
    }

    fn bearish() -> IndicatorSet {
        IndicatorSet {
            close: 99.0,
            ema_fast: 99.0,
            ema_slow: 100.0,
            rsi: 40.0,
            macd: -0.5,
            macd_signal: -0.2,
            bollinger_mid: 100.0,
            vwap: 99.5,
            volume_trend: VolumeTrend::Decreasing,
            price_slope: -0.5,
        }
    }

    #[test]
    fn fully_bullish_triple_scores_nine_long() {
        let engine = ScoringEngine;
        let b = bullish();
        assert_eq!(engine.score(&b, &b, &b, Side::Long), 9);
        // Only the side-independent volume factor counts for SHORT.
        assert_eq!(engine.score(&b, &b, &b, Side::Short), 1);
    }

    #[test]
    fn fully_bearish_triple_scores_eight_short_without_volume() {
        let engine = ScoringEngine;
        let b = bearish();
        assert_eq!(engine.score(&b, &b, &b, Side::Short), 8);
        assert_eq!(engine.score(&b, &b, &b, Side::Long), 0);
    }

    #[test]
    fn neutral_triple_scores_zero_both_sides() {
        let n = neutral();
        let scores = ScoringEngine.score_both(&TimeframeIndicators {
            fast: n.clone(),
            medium: n.clone(),
            slow: n,
        });
        assert_eq!(scores, ScoreResult { long_score: 0, short_score: 0 });
    }

    #[test]
    fn increasing_volume_counts_for_both_sides() {
        let n = IndicatorSet {
            volume_trend: VolumeTrend::Increasing,
            ..neutral()
        };
        let engine = ScoringEngine;
        assert_eq!(engine.score(&n, &neutral(), &neutral(), Side::Long), 1);
        assert_eq!(engine.score(&n, &neutral(), &neutral(), Side::Short), 1);
    }

    #[test]
    fn rsi_thresholds_are_strict() {
        let engine = ScoringEngine;
        let at_long = IndicatorSet { rsi: 55.0, ..neutral() };
        let at_short = IndicatorSet { rsi: 45.0, ..neutral() };
        assert_eq!(engine.score(&neutral(), &at_long, &neutral(), Side::Long), 0);
        assert_eq!(engine.score(&neutral(), &at_short, &neutral(), Side::Short), 0);
    }

    #[test]
    fn stack_requires_all_three_medium_factors() {
        let engine = ScoringEngine;
        // Trend and MACD agree but RSI is neutral: factors 2 and 4 only.
        let partial = IndicatorSet {
            rsi: 50.0,
            ..bullish()
        };
        assert_eq!(engine.score(&neutral(), &partial, &neutral(), Side::Long), 2);

        // All three: factors 2, 3, 4 and the stack.
        assert_eq!(engine.score(&neutral(), &bullish(), &neutral(), Side::Long), 4);
    }

    #[test]
    fn slow_timeframe_only_contributes_trend() {
        let engine = ScoringEngine;
        assert_eq!(engine.score(&neutral(), &neutral(), &bullish(), Side::Long), 1);
        assert_eq!(engine.score(&neutral(), &neutral(), &bearish(), Side::Short), 1);
    }
}
