use proptest::prelude::*;

use common::{
    ExitReason, PerformanceCounters, ProposalDiagnostics, RejectionReason, Side, TradeProposal,
};
use risk::PositionTracker;

fn proposal(pair: String, side: Side, entry: f64, stop: f64, target: f64, size: f64) -> TradeProposal {
    TradeProposal {
        pair,
        side,
        certainty: 80,
        entry_price: entry,
        stop_loss: stop,
        take_profit: target,
        size,
        risk_usd: (entry - stop).abs() * size,
        reward_usd: (target - entry).abs() * size,
        diagnostics: ProposalDiagnostics {
            long_score: 7,
            short_score: 2,
            long_pct: 77,
            short_pct: 22,
            fast_rsi: 50.0,
            medium_rsi: 50.0,
            slow_rsi: 50.0,
            medium_macd: 0.0,
            medium_ema_diff_pct: 0.0,
        },
    }
}

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

proptest! {
    /// A second open on an already-open pair is rejected whatever it contains.
    #[test]
    fn open_on_open_pair_always_rejected(
        first_side in side(),
        second_side in side(),
        entry in 0.01f64..100_000.0,
        size in 0.0001f64..1000.0,
        cap in 1usize..10,
    ) {
        let mut tracker = PositionTracker::new(cap);
        tracker
            .open(&proposal("P".into(), first_side, entry, entry * 0.99, entry * 1.02, size))
            .unwrap();
        let err = tracker
            .open(&proposal("P".into(), second_side, entry * 2.0, entry, entry * 3.0, size * 2.0))
            .unwrap_err();
        prop_assert_eq!(err.reason, RejectionReason::PairAlreadyOpen);
        prop_assert_eq!(tracker.position("P").unwrap().side, first_side);
    }

    /// A price that satisfies both exit conditions closes through the stop.
    #[test]
    fn gapped_price_always_stops_out(
        s in side(),
        entry in 1.0f64..10_000.0,
        gap in 0.001f64..0.5,
        price_offset in -0.5f64..0.5,
    ) {
        // Stop and target placed on the "wrong" sides so the band between
        // them triggers both.
        let (stop, target) = match s {
            Side::Long => (entry * (1.0 + gap), entry * (1.0 - gap)),
            Side::Short => (entry * (1.0 - gap), entry * (1.0 + gap)),
        };
        let price = entry * (1.0 + price_offset * gap);
        let mut tracker = PositionTracker::new(1);
        tracker.open(&proposal("G".into(), s, entry, stop, target, 1.0)).unwrap();

        let closed = tracker.reconcile(|_| Some(price));
        prop_assert_eq!(closed.len(), 1);
        prop_assert_eq!(closed[0].exit_reason, ExitReason::StopLoss);
    }

    /// Incremental counters always equal a full recomputation over history.
    #[test]
    fn incremental_counters_match_recompute(
        trades in prop::collection::vec((side(), 1.0f64..1000.0, 0.5f64..1.5, 0.01f64..10.0), 1..30),
    ) {
        let mut tracker = PositionTracker::new(1);
        for (s, entry, exit_ratio, size) in trades {
            tracker
                .open(&proposal("X".into(), s, entry, entry * 0.5, entry * 2.0, size))
                .unwrap();
            tracker.close("X", entry * exit_ratio, ExitReason::Manual).unwrap();
            prop_assert_eq!(tracker.summary(), PerformanceCounters::from_history(tracker.history()));
        }
    }

    /// Reconciliation never panics and never closes more than is open.
    #[test]
    fn reconcile_never_panics_on_extreme_prices(
        entry in 0.0001f64..1_000_000.0,
        current in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), 0.0f64..1_000_000.0],
        size in 0.0001f64..1000.0,
        s in side(),
    ) {
        let mut tracker = PositionTracker::new(1);
        let (stop, target) = match s {
            Side::Long => (entry * 0.98, entry * 1.04),
            Side::Short => (entry * 1.02, entry * 0.96),
        };
        tracker.open(&proposal("T".into(), s, entry, stop, target, size)).unwrap();
        let closed = tracker.reconcile(|_| Some(current));
        prop_assert!(closed.len() <= 1);
        prop_assert_eq!(closed.len() + tracker.open_count(), 1);
    }
}
