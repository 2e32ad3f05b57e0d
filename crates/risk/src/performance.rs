use serde::Serialize;

use common::{ClosedTrade, PerformanceCounters};

/// Capital base used to turn per-trade PnL into returns for the Sharpe ratio.
pub const CAPITAL_BASE_USD: f64 = 10_000.0;
/// Risk-free rate subtracted from the mean return.
pub const RISK_FREE_RATE: f64 = 0.02;

/// End-of-run statistics derived from the closed-trade history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PerformanceReport {
    pub counters: PerformanceCounters,
    /// Largest peak-to-trough drop of cumulative PnL, in USD.
    pub max_drawdown_usd: f64,
    pub sharpe_ratio: f64,
}

impl PerformanceReport {
    pub fn from_history(history: &[ClosedTrade]) -> Self {
        Self {
            counters: PerformanceCounters::from_history(history),
            max_drawdown_usd: max_drawdown(history),
            sharpe_ratio: sharpe_ratio(history),
        }
    }
}

impl std::fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = &self.counters;
        writeln!(f, "Performance summary")?;
        writeln!(f, "  Trades:       {}", c.trade_count)?;
        writeln!(f, "  Win rate:     {:.1}%", c.win_rate())?;
        writeln!(f, "  Wins:         {}", c.win_count)?;
        writeln!(f, "  Losses:       {}", c.loss_count)?;
        writeln!(f, "  Total profit: ${:.4}", c.total_profit)?;
        writeln!(f, "  Total loss:   ${:.4}", c.total_loss)?;
        writeln!(f, "  Net PnL:      ${:.4}", c.net_pnl())?;
        writeln!(f, "  Max drawdown: ${:.2}", self.max_drawdown_usd)?;
        write!(f, "  Sharpe:       {:.2}", self.sharpe_ratio)
    }
}

fn max_drawdown(history: &[ClosedTrade]) -> f64 {
    let mut running = 0.0f64;
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0f64;
    for trade in history {
        running += trade.pnl;
        peak = peak.max(running);
        max_dd = max_dd.max(peak - running);
    }
    max_dd
}

fn sharpe_ratio(history: &[ClosedTrade]) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = history.iter().map(|t| t.pnl / CAPITAL_BASE_USD).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return 0.0;
    }
    (mean - RISK_FREE_RATE) / std_dev
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{ExitReason, Side};

    fn trade(pnl: f64) -> ClosedTrade {
        ClosedTrade {
            position_id: "id".into(),
            pair: "SOL_USDC".into(),
            side: Side::Long,
            entry_price: 100.0,
            exit_price: 100.0,
            size: 1.0,
            stop_loss: 99.0,
            take_profit: 102.0,
            pnl,
            exit_reason: ExitReason::Manual,
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn drawdown_is_measured_from_the_running_peak() {
        let history = vec![trade(50.0), trade(-70.0), trade(500.0), trade(-20.0)];
        let report = PerformanceReport::from_history(&history);
        assert!((report.max_drawdown_usd - 70.0).abs() < 1e-9);
        assert_eq!(report.counters.trade_count, 4);
    }

    #[test]
    fn drawdown_peak_starts_at_the_first_trade() {
        let report = PerformanceReport::from_history(&[trade(-10.0), trade(-5.0)]);
        assert!((report.max_drawdown_usd - 5.0).abs() < 1e-9);
        assert_eq!(PerformanceReport::from_history(&[]).max_drawdown_usd, 0.0);
        assert_eq!(PerformanceReport::from_history(&[trade(-3.0)]).max_drawdown_usd, 0.0);
    }

    #[test]
    fn sharpe_needs_two_trades_and_some_variance() {
        assert_eq!(PerformanceReport::from_history(&[trade(10.0)]).sharpe_ratio, 0.0);
        assert_eq!(
            PerformanceReport::from_history(&[trade(10.0), trade(10.0)]).sharpe_ratio,
            0.0
        );
        let report = PerformanceReport::from_history(&[trade(50.0), trade(-70.0), trade(500.0)]);
        assert!(report.sharpe_ratio.is_finite());
        assert!(report.sharpe_ratio != 0.0);
    }

    #[test]
    fn display_includes_net_pnl() {
        let report = PerformanceReport::from_history(&[trade(5.0), trade(-2.0)]);
        let text = report.to_string();
        assert!(text.contains("Net PnL:      $3.0000"));
        assert!(text.contains("Win rate:     50.0%"));
    }
}
