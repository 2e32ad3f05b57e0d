use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::{
    AlertPriority, AlertSink, ClosedTrade, EngineState, ExitReason, MarketDataSource,
    MarketQuote, OrderExecutor, PortfolioSnapshot, Result, TimeframeIndicators, Timeframes,
    TradeProposal,
};
use risk::{PerformanceReport, PositionTracker, Rejected};
use strategy::{DecisionEngine, PairConfig, PairInput};

use crate::alerts::dispatch;
use crate::executor::{OpenOutcome, ProposalExecutor};

/// Cadence and bounds of the loop.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub cycle_interval: Duration,
    pub error_backoff: Duration,
    /// Stop after this many cycles. `None` runs until stopped.
    pub max_cycles: Option<u64>,
    pub timeframes: Timeframes,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(15),
            error_backoff: Duration::from_secs(10),
            max_cycles: None,
            timeframes: Timeframes::default(),
        }
    }
}

impl From<&common::Config> for LoopSettings {
    fn from(config: &common::Config) -> Self {
        Self {
            cycle_interval: config.cycle_interval,
            error_backoff: config.error_backoff,
            max_cycles: config.max_cycles,
            timeframes: config.timeframes.clone(),
        }
    }
}

/// External systems the loop talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub market: Arc<dyn MarketDataSource>,
    pub executor: Arc<dyn OrderExecutor>,
    pub alerts: Arc<dyn AlertSink>,
}

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    /// Pairs with complete market data.
    pub evaluated: usize,
    /// Pairs skipped because data was unavailable.
    pub skipped: usize,
    pub proposals: Vec<TradeProposal>,
    pub opened: Vec<String>,
    pub rejected: Vec<Rejected>,
    pub closed: Vec<ClosedTrade>,
}

/// Cloneable handle passed to other crates (Telegram, API).
#[derive(Clone)]
pub struct EngineHandle {
    shutdown: CancellationToken,
    snapshot_rx: watch::Receiver<PortfolioSnapshot>,
}

impl EngineHandle {
    /// Ask the loop to stop. The running cycle completes first.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn state(&self) -> EngineState {
        self.snapshot_rx.borrow().engine_state
    }

    /// Subscribe to the snapshot published after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<PortfolioSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> PortfolioSnapshot {
        self.snapshot_rx.borrow().clone()
    }
}

/// The periodic scheduler: fetch, evaluate, open, reconcile, publish, sleep.
///
/// The loop task is the only writer to the tracker. Everyone else reads
/// snapshots through the handle.
pub struct TradingLoop {
    settings: LoopSettings,
    pairs: Vec<PairConfig>,
    decision: DecisionEngine,
    tracker: PositionTracker,
    market: Arc<dyn MarketDataSource>,
    router: ProposalExecutor,
    alerts: Arc<dyn AlertSink>,
    shutdown: CancellationToken,
    snapshot_tx: watch::Sender<PortfolioSnapshot>,
    cycle: u64,
    state: EngineState,
}

impl TradingLoop {
    pub fn new(
        settings: LoopSettings,
        pairs: Vec<PairConfig>,
        decision: DecisionEngine,
        tracker: PositionTracker,
        collaborators: Collaborators,
    ) -> (Self, EngineHandle) {
        let shutdown = CancellationToken::new();
        let (snapshot_tx, snapshot_rx) =
            watch::channel(tracker.snapshot(0, EngineState::Stopped));

        let handle = EngineHandle {
            shutdown: shutdown.clone(),
            snapshot_rx,
        };

        let engine = TradingLoop {
            settings,
            pairs,
            decision,
            tracker,
            market: collaborators.market,
            router: ProposalExecutor::new(collaborators.executor),
            alerts: collaborators.alerts,
            shutdown,
            snapshot_tx,
            cycle: 0,
            state: EngineState::Stopped,
        };

        (engine, handle)
    }

    /// Run until stopped (or `max_cycles` is reached) and return the final
    /// performance report. Call from `tokio::spawn`.
    pub async fn run(mut self) -> PerformanceReport {
        info!(
            pairs = self.pairs.len(),
            max_positions = self.tracker.max_positions(),
            interval_secs = self.settings.cycle_interval.as_secs_f64(),
            "Trading loop started"
        );
        self.state = EngineState::Running;
        self.publish();

        loop {
            if self.shutdown.is_cancelled() || self.reached_max_cycles() {
                break;
            }

            self.cycle += 1;
            let pause = match self.run_cycle().await {
                Ok(report) => {
                    self.state = EngineState::Running;
                    info!(
                        cycle = report.cycle,
                        evaluated = report.evaluated,
                        skipped = report.skipped,
                        proposals = report.proposals.len(),
                        opened = report.opened.len(),
                        closed = report.closed.len(),
                        open_positions = self.tracker.open_count(),
                        "Cycle complete"
                    );
                    self.settings.cycle_interval
                }
                Err(e) => {
                    self.state = EngineState::BackingOff;
                    error!(
                        cycle = self.cycle,
                        error = %e,
                        backoff_secs = self.settings.error_backoff.as_secs_f64(),
                        "Cycle failed, backing off"
                    );
                    self.alert(
                        format!("🚨 Cycle #{} failed: {e}", self.cycle),
                        AlertPriority::Critical,
                    );
                    self.settings.error_backoff
                }
            };
            self.publish();

            if self.reached_max_cycles() {
                break;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(cycle = self.cycle, "Stop requested");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        self.finish().await
    }

    fn reached_max_cycles(&self) -> bool {
        self.settings.max_cycles.is_some_and(|max| self.cycle >= max)
    }

    async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.market.refresh().await?;

        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };

        // ─── Gather market data ───────────────────────────────────────────
        let fetched = join_all(
            self.pairs
                .iter()
                .map(|pair| fetch_pair(self.market.as_ref(), &self.settings.timeframes, pair)),
        )
        .await;

        let mut inputs = Vec::with_capacity(fetched.len());
        let mut marks: HashMap<String, f64> = HashMap::new();
        for (pair, fetch) in self.pairs.iter().zip(fetched) {
            match fetch.mark {
                Ok(mark) => {
                    marks.insert(pair.symbol.clone(), mark);
                }
                Err(e) if e.is_unavailable() => {
                    debug!(pair = %pair.symbol, error = %e, "Mark price unavailable");
                }
                Err(e) => return Err(e),
            }
            match fetch.input {
                Some(Ok(input)) => inputs.push(input),
                Some(Err(e)) if e.is_unavailable() => {
                    debug!(pair = %pair.symbol, error = %e, "Market data unavailable, skipping pair");
                    report.skipped += 1;
                }
                Some(Err(e)) => return Err(e),
                None => report.skipped += 1,
            }
        }
        report.evaluated = inputs.len();

        // Open positions outside the configured pair list still need a price
        // to be reconciled.
        let orphans: Vec<String> = self
            .tracker
            .open_positions()
            .map(|p| p.pair.clone())
            .filter(|pair| !marks.contains_key(pair) && !self.pairs.iter().any(|c| &c.symbol == pair))
            .collect();
        for pair in orphans {
            match self.market.mark_price(&pair).await {
                Ok(mark) => {
                    marks.insert(pair, mark);
                }
                Err(e) if e.is_unavailable() => {
                    debug!(pair = %pair, error = %e, "Mark price unavailable");
                }
                Err(e) => return Err(e),
            }
        }

        // ─── Evaluate and open ────────────────────────────────────────────
        report.proposals = self.decision.evaluate_all(&inputs);
        for proposal in &report.proposals {
            match self.router.execute(&mut self.tracker, proposal).await? {
                OpenOutcome::Opened(position) => {
                    self.alert(
                        format!(
                            "🚀 {} {} @ {:.4} | size {:.4} | stop {:.4} | target {:.4} | certainty {}%",
                            position.side,
                            position.pair,
                            position.entry_price,
                            position.size,
                            position.stop_loss,
                            position.take_profit,
                            position.certainty
                        ),
                        AlertPriority::Normal,
                    );
                    report.opened.push(position.pair);
                }
                OpenOutcome::Declined(rejected) => {
                    let cap_reached = self.tracker.is_full();
                    report.rejected.push(rejected);
                    if cap_reached {
                        debug!(cycle = self.cycle, "Position cap reached, remaining proposals discarded");
                        break;
                    }
                }
            }
        }

        // ─── Reconcile ────────────────────────────────────────────────────
        report.closed = self.tracker.reconcile(|pair| marks.get(pair).copied());
        for trade in &report.closed {
            let icon = match trade.exit_reason {
                ExitReason::TakeProfit => "🎯",
                ExitReason::StopLoss => "🛑",
                ExitReason::Manual => "✋",
            };
            self.alert(
                format!(
                    "{icon} {} {} closed @ {:.4} ({}) | PnL ${:.4}",
                    trade.side, trade.pair, trade.exit_price, trade.exit_reason, trade.pnl
                ),
                AlertPriority::Normal,
            );
        }

        Ok(report)
    }

    fn publish(&self) {
        // send_replace never fails, even with no receivers left.
        self.snapshot_tx
            .send_replace(self.tracker.snapshot(self.cycle, self.state));
    }

    fn alert(&self, message: String, priority: AlertPriority) {
        dispatch(&self.alerts, message, priority);
    }

    async fn finish(mut self) -> PerformanceReport {
        self.state = EngineState::Stopped;
        self.publish();

        let report = PerformanceReport::from_history(self.tracker.history());
        info!(
            cycles = self.cycle,
            trades = report.counters.trade_count,
            net_pnl = report.counters.net_pnl(),
            max_drawdown = report.max_drawdown_usd,
            sharpe = report.sharpe_ratio,
            "Trading loop stopped"
        );
        // Awaited: the caller may exit as soon as this returns.
        if let Err(e) = self
            .alerts
            .notify(&format!("📊 {report}"), AlertPriority::Normal)
            .await
        {
            warn!(error = %e, "Final summary alert undeliverable");
        }
        report
    }
}

/// Market data gathered for one pair in a cycle.
struct PairFetch {
    /// Used for exit checks even when the indicators are missing.
    mark: Result<f64>,
    /// `None` when there was no mark price to build a quote from.
    input: Option<Result<PairInput>>,
}

/// Mark price plus the three timeframe indicator sets for one pair.
async fn fetch_pair(
    market: &dyn MarketDataSource,
    timeframes: &Timeframes,
    pair: &PairConfig,
) -> PairFetch {
    let symbol = pair.symbol.as_str();
    let mark_price = match market.mark_price(symbol).await {
        Ok(price) => price,
        Err(e) => {
            return PairFetch {
                mark: Err(e),
                input: None,
            }
        }
    };

    let input = fetch_indicators(market, timeframes, symbol)
        .await
        .map(|indicators| PairInput {
            quote: MarketQuote {
                pair: pair.symbol.clone(),
                mark_price,
                tick_size: pair.tick_size,
                maker_fee: pair.maker_fee,
                taker_fee: pair.taker_fee,
            },
            indicators,
        });

    PairFetch {
        mark: Ok(mark_price),
        input: Some(input),
    }
}

async fn fetch_indicators(
    market: &dyn MarketDataSource,
    timeframes: &Timeframes,
    symbol: &str,
) -> Result<TimeframeIndicators> {
    Ok(TimeframeIndicators {
        fast: market.fetch_indicators(symbol, &timeframes.fast).await?,
        medium: market.fetch_indicators(symbol, &timeframes.medium).await?,
        slow: market.fetch_indicators(symbol, &timeframes.slow).await?,
    })
}
