use std::collections::BTreeMap;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use common::{
    ClosedTrade, EngineState, ExitReason, PerformanceCounters, PortfolioSnapshot, Position,
    RejectionReason, Side, TradeProposal,
};

/// An open request the tracker refused.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("open rejected for {pair}: {reason}")]
pub struct Rejected {
    pub pair: String,
    pub reason: RejectionReason,
}

/// Owner of the open-position set and the closed-trade history.
///
/// Each pair moves `NoPosition -> Open -> NoPosition`. All mutation goes
/// through `open`, `reconcile` and `close`; the trading loop is the only
/// writer.
#[derive(Debug)]
pub struct PositionTracker {
    max_positions: usize,
    open: BTreeMap<String, Position>,
    history: Vec<ClosedTrade>,
    counters: PerformanceCounters,
}

impl PositionTracker {
    pub fn new(max_positions: usize) -> Self {
        Self {
            max_positions,
            open: BTreeMap::new(),
            history: Vec::new(),
            counters: PerformanceCounters::default(),
        }
    }

    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn is_full(&self) -> bool {
        self.open.len() >= self.max_positions
    }

    pub fn position(&self, pair: &str) -> Option<&Position> {
        self.open.get(pair)
    }

    /// Open positions in pair order.
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values()
    }

    /// Append-only closed-trade history, oldest first.
    pub fn history(&self) -> &[ClosedTrade] {
        &self.history
    }

    /// Check whether `pair` could be opened right now without mutating.
    pub fn can_open(&self, pair: &str) -> Result<(), Rejected> {
        let reason = if self.open.contains_key(pair) {
            RejectionReason::PairAlreadyOpen
        } else if self.is_full() {
            RejectionReason::PositionCapReached
        } else {
            return Ok(());
        };
        Err(Rejected {
            pair: pair.to_string(),
            reason,
        })
    }

    /// Accept a proposal into a new open position.
    ///
    /// Rejected when the pair already has an open position or the cap is
    /// reached. An existing position is never overwritten.
    pub fn open(&mut self, proposal: &TradeProposal) -> Result<&Position, Rejected> {
        self.can_open(&proposal.pair)?;

        let position = Position {
            id: uuid::Uuid::new_v4().to_string(),
            pair: proposal.pair.clone(),
            side: proposal.side,
            entry_price: proposal.entry_price,
            size: proposal.size,
            stop_loss: proposal.stop_loss,
            take_profit: proposal.take_profit,
            certainty: proposal.certainty,
            opened_at: Utc::now(),
        };
        info!(
            pair = %position.pair,
            side = %position.side,
            entry = position.entry_price,
            size = position.size,
            stop = position.stop_loss,
            target = position.take_profit,
            certainty = position.certainty,
            "Position opened"
        );

        Ok(self.open.entry(proposal.pair.clone()).or_insert(position))
    }

    /// Close every open position whose stop or target the current price has
    /// reached.
    ///
    /// Stop-loss wins when a gapped price satisfies both. Pairs without a
    /// usable price stay open. Closed trades are returned in pair order.
    pub fn reconcile<F>(&mut self, price_lookup: F) -> Vec<ClosedTrade>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let exits: Vec<(String, f64, ExitReason)> = self
            .open
            .values()
            .filter_map(|position| {
                let price = match price_lookup(&position.pair) {
                    Some(p) if p.is_finite() => p,
                    Some(p) => {
                        warn!(pair = %position.pair, price = p, "Ignoring non-finite price");
                        return None;
                    }
                    None => {
                        debug!(pair = %position.pair, "No price this cycle, position left open");
                        return None;
                    }
                };
                exit_reason(position, price).map(|reason| (position.pair.clone(), price, reason))
            })
            .collect();

        exits
            .into_iter()
            .filter_map(|(pair, price, reason)| self.close(&pair, price, reason))
            .collect()
    }

    /// Close the position on `pair` at `exit_price`. `None` if not open.
    pub fn close(&mut self, pair: &str, exit_price: f64, reason: ExitReason) -> Option<ClosedTrade> {
        let position = self.open.remove(pair)?;
        let trade = ClosedTrade {
            pnl: position.pnl_at(exit_price),
            position_id: position.id,
            pair: position.pair,
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            size: position.size,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            exit_reason: reason,
            opened_at: position.opened_at,
            closed_at: Utc::now(),
        };

        self.counters.record(&trade);
        info!(
            pair = %trade.pair,
            side = %trade.side,
            reason = %trade.exit_reason,
            exit = trade.exit_price,
            pnl = trade.pnl,
            "Position closed"
        );
        self.history.push(trade.clone());
        Some(trade)
    }

    /// Snapshot of the running counters.
    pub fn summary(&self) -> PerformanceCounters {
        self.counters
    }

    pub fn snapshot(&self, cycle: u64, engine_state: EngineState) -> PortfolioSnapshot {
        PortfolioSnapshot {
            cycle,
            engine_state,
            open_positions: self.open.values().cloned().collect(),
            history: self.history.clone(),
            counters: self.counters,
            taken_at: Some(Utc::now()),
        }
    }
}

/// Stop is checked before target.
fn exit_reason(position: &Position, price: f64) -> Option<ExitReason> {
    let (stop_hit, target_hit) = match position.side {
        Side::Long => (price <= position.stop_loss, price >= position.take_profit),
        Side::Short => (price >= position.stop_loss, price <= position.take_profit),
    };
    if stop_hit {
        Some(ExitReason::StopLoss)
    } else if target_hit {
        Some(ExitReason::TakeProfit)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProposalDiagnostics;
    use std::collections::HashMap;

    fn proposal(pair: &str, side: Side, entry: f64, stop: f64, target: f64) -> TradeProposal {
        TradeProposal {
            pair: pair.into(),
            side,
            certainty: 100,
            entry_price: entry,
            stop_loss: stop,
            take_profit: target,
            size: 2.0,
            risk_usd: (entry - stop).abs() * 2.0,
            reward_usd: (target - entry).abs() * 2.0,
            diagnostics: ProposalDiagnostics {
                long_score: 9,
                short_score: 1,
                long_pct: 100,
                short_pct: 11,
                fast_rsi: 60.0,
                medium_rsi: 60.0,
                slow_rsi: 60.0,
                medium_macd: 0.1,
                medium_ema_diff_pct: 0.2,
            },
        }
    }

    fn long(pair: &str) -> TradeProposal {
        proposal(pair, Side::Long, 100.0, 98.0, 104.0)
    }

    fn short(pair: &str) -> TradeProposal {
        proposal(pair, Side::Short, 100.0, 102.0, 96.0)
    }

    fn prices(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries.iter().map(|(p, v)| (p.to_string(), *v)).collect()
    }

    #[test]
    fn second_open_on_same_pair_is_rejected() {
        let mut tracker = PositionTracker::new(3);
        tracker.open(&long("SOL_USDC")).unwrap();

        let err = tracker.open(&short("SOL_USDC")).unwrap_err();
        assert_eq!(err.reason, RejectionReason::PairAlreadyOpen);
        // Original position untouched.
        assert_eq!(tracker.position("SOL_USDC").unwrap().side, Side::Long);
        assert_eq!(tracker.open_count(), 1);
    }

    #[test]
    fn cap_rejects_the_fourth_open() {
        let mut tracker = PositionTracker::new(3);
        for pair in ["A", "B", "C"] {
            tracker.open(&long(pair)).unwrap();
        }
        assert!(tracker.is_full());

        let err = tracker.open(&long("D")).unwrap_err();
        assert_eq!(err.reason, RejectionReason::PositionCapReached);
        assert_eq!(err.pair, "D");
        assert_eq!(tracker.open_count(), 3);
    }

    #[test]
    fn duplicate_check_precedes_cap_check() {
        let mut tracker = PositionTracker::new(1);
        tracker.open(&long("A")).unwrap();
        assert_eq!(
            tracker.can_open("A").unwrap_err().reason,
            RejectionReason::PairAlreadyOpen
        );
    }

    #[test]
    fn long_exits_on_stop_and_target() {
        let mut tracker = PositionTracker::new(3);
        tracker.open(&long("STOP")).unwrap();
        tracker.open(&long("TARGET")).unwrap();
        tracker.open(&long("HOLD")).unwrap();

        let px = prices(&[("STOP", 98.0), ("TARGET", 104.5), ("HOLD", 101.0)]);
        let closed = tracker.reconcile(|pair| px.get(pair).copied());

        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].pair, "STOP");
        assert_eq!(closed[0].exit_reason, ExitReason::StopLoss);
        assert!((closed[0].pnl - (-4.0)).abs() < 1e-12);
        assert_eq!(closed[1].pair, "TARGET");
        assert_eq!(closed[1].exit_reason, ExitReason::TakeProfit);
        assert!((closed[1].pnl - 9.0).abs() < 1e-12);
        assert!(tracker.position("HOLD").is_some());
        assert_eq!(tracker.open_count(), 1);
    }

    #[test]
    fn short_comparisons_are_inverted() {
        let mut tracker = PositionTracker::new(3);
        tracker.open(&short("STOP")).unwrap();
        tracker.open(&short("TARGET")).unwrap();

        let px = prices(&[("STOP", 102.5), ("TARGET", 96.0)]);
        let closed = tracker.reconcile(|pair| px.get(pair).copied());

        assert_eq!(closed[0].exit_reason, ExitReason::StopLoss);
        assert!((closed[0].pnl - (-5.0)).abs() < 1e-12);
        assert_eq!(closed[1].exit_reason, ExitReason::TakeProfit);
        assert!((closed[1].pnl - 8.0).abs() < 1e-12);
    }

    #[test]
    fn gapped_price_closes_via_stop_loss() {
        // Inverted levels: any price satisfies both stop and target.
        let mut tracker = PositionTracker::new(2);
        tracker
            .open(&proposal("GAP_L", Side::Long, 100.0, 105.0, 95.0))
            .unwrap();
        tracker
            .open(&proposal("GAP_S", Side::Short, 100.0, 95.0, 105.0))
            .unwrap();

        let closed = tracker.reconcile(|_| Some(100.0));
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|t| t.exit_reason == ExitReason::StopLoss));
    }

    #[test]
    fn missing_or_non_finite_price_leaves_position_open() {
        let mut tracker = PositionTracker::new(2);
        tracker.open(&long("A")).unwrap();
        tracker.open(&long("B")).unwrap();

        let closed = tracker.reconcile(|pair| if pair == "A" { Some(f64::NAN) } else { None });
        assert!(closed.is_empty());
        assert_eq!(tracker.open_count(), 2);
    }

    #[test]
    fn counters_track_wins_losses_and_break_even() {
        let mut tracker = PositionTracker::new(3);
        tracker.open(&long("W")).unwrap();
        tracker.open(&long("L")).unwrap();
        tracker.open(&long("E")).unwrap();

        tracker.close("W", 101.0, ExitReason::Manual);
        tracker.close("L", 99.5, ExitReason::Manual);
        tracker.close("E", 100.0, ExitReason::Manual);

        let summary = tracker.summary();
        assert_eq!(summary.trade_count, 3);
        assert_eq!(summary.win_count, 1);
        assert_eq!(summary.loss_count, 1);
        assert!((summary.total_profit - 2.0).abs() < 1e-12);
        assert!((summary.total_loss - 1.0).abs() < 1e-12);
        assert_eq!(summary, PerformanceCounters::from_history(tracker.history()));
    }

    #[test]
    fn close_frees_the_slot_and_appends_history() {
        let mut tracker = PositionTracker::new(1);
        tracker.open(&long("A")).unwrap();
        assert!(tracker.close("MISSING", 1.0, ExitReason::Manual).is_none());

        let trade = tracker.close("A", 103.0, ExitReason::Manual).unwrap();
        assert_eq!(trade.exit_reason, ExitReason::Manual);
        assert_eq!(tracker.history().len(), 1);
        assert!(tracker.open(&short("A")).is_ok());
    }

    #[test]
    fn snapshot_reflects_open_set_and_history() {
        let mut tracker = PositionTracker::new(2);
        tracker.open(&long("A")).unwrap();
        tracker.open(&long("B")).unwrap();
        tracker.close("B", 104.0, ExitReason::TakeProfit);

        let snap = tracker.snapshot(7, EngineState::Running);
        assert_eq!(snap.cycle, 7);
        assert_eq!(snap.open_positions.len(), 1);
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.counters.win_count, 1);
    }
}
