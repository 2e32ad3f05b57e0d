use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Direction of traded volume over the recent candles of a timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
    #[default]
    Flat,
}

/// Technical values for one pair on one timeframe.
///
/// Produced once per cycle by the market data collaborator. The core reads
/// it and never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub close: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub bollinger_mid: f64,
    pub vwap: f64,
    pub volume_trend: VolumeTrend,
    pub price_slope: f64,
}

impl IndicatorSet {
    /// Spread between the fast and slow EMA as a percentage of the slow EMA.
    pub fn ema_diff_pct(&self) -> f64 {
        if self.ema_slow == 0.0 {
            return 0.0;
        }
        (self.ema_fast - self.ema_slow) / self.ema_slow * 100.0
    }

    /// Name of the first numeric field that is NaN or infinite, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        [
            ("close", self.close),
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("rsi", self.rsi),
            ("macd", self.macd),
            ("macd_signal", self.macd_signal),
            ("bollinger_mid", self.bollinger_mid),
            ("vwap", self.vwap),
            ("price_slope", self.price_slope),
        ]
        .into_iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(name, _)| name)
    }
}

/// The three timeframes scored together for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeIndicators {
    pub fast: IndicatorSet,
    pub medium: IndicatorSet,
    pub slow: IndicatorSet,
}

/// Latest mark price and market metadata for a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub pair: String,
    pub mark_price: f64,
    pub tick_size: f64,
    pub maker_fee: f64,
    pub taker_fee: f64,
}

/// Raw factor scores for both sides of one indicator triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub long_score: u8,
    pub short_score: u8,
}

/// Scores and key indicator values carried on a proposal for observability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposalDiagnostics {
    pub long_score: u8,
    pub short_score: u8,
    pub long_pct: u8,
    pub short_pct: u8,
    pub fast_rsi: f64,
    pub medium_rsi: f64,
    pub slow_rsi: f64,
    pub medium_macd: f64,
    pub medium_ema_diff_pct: f64,
}

/// A trade plan emitted by the decision engine.
///
/// `risk_usd` is always positive on an emitted proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal {
    pub pair: String,
    pub side: Side,
    /// 0..=100
    pub certainty: u8,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Base asset units.
    pub size: f64,
    pub risk_usd: f64,
    pub reward_usd: f64,
    pub diagnostics: ProposalDiagnostics,
}

impl TradeProposal {
    /// Reward-to-risk ratio. Zero when there is no risk to divide by.
    pub fn risk_reward(&self) -> f64 {
        if self.risk_usd > 0.0 {
            self.reward_usd / self.risk_usd
        } else {
            0.0
        }
    }
}

/// An open position held by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub pair: String,
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub certainty: u8,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Realized PnL if the position were closed at `exit_price`.
    pub fn pnl_at(&self, exit_price: f64) -> f64 {
        match self.side {
            Side::Long => (exit_price - self.entry_price) * self.size,
            Side::Short => (self.entry_price - exit_price) * self.size,
        }
    }
}

/// Why a position left the open set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::Manual => write!(f, "manual"),
        }
    }
}

/// History record of a closed position. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position_id: String,
    pub pair: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub pnl: f64,
    pub exit_reason: ExitReason,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Running aggregate over the closed-trade history.
///
/// A cache: `from_history` over the full history always gives the same
/// value as recording the trades one by one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceCounters {
    pub trade_count: u64,
    pub win_count: u64,
    pub loss_count: u64,
    pub total_profit: f64,
    /// Absolute value of all losing PnL.
    pub total_loss: f64,
}

impl PerformanceCounters {
    pub fn from_history<'a>(history: impl IntoIterator<Item = &'a ClosedTrade>) -> Self {
        history.into_iter().fold(Self::default(), |mut acc, trade| {
            acc.record(trade);
            acc
        })
    }

    /// Fold one closed trade in. Break-even trades count in neither bucket.
    pub fn record(&mut self, trade: &ClosedTrade) {
        self.trade_count += 1;
        if trade.pnl > 0.0 {
            self.win_count += 1;
            self.total_profit += trade.pnl;
        } else if trade.pnl < 0.0 {
            self.loss_count += 1;
            self.total_loss += trade.pnl.abs();
        }
    }

    pub fn net_pnl(&self) -> f64 {
        self.total_profit - self.total_loss
    }

    /// Winning trades as a percentage of all closed trades.
    pub fn win_rate(&self) -> f64 {
        if self.trade_count == 0 {
            return 0.0;
        }
        self.win_count as f64 / self.trade_count as f64 * 100.0
    }
}

/// Current state of the trading loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    BackingOff,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::BackingOff => write!(f, "backing off"),
        }
    }
}

/// Read-only view of the tracker published after every cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cycle: u64,
    pub engine_state: EngineState,
    pub open_positions: Vec<Position>,
    pub history: Vec<ClosedTrade>,
    pub counters: PerformanceCounters,
    pub taken_at: Option<DateTime<Utc>>,
}

/// Reason an open was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    PositionCapReached,
    PairAlreadyOpen,
    Execution(String),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::PositionCapReached => write!(f, "position cap reached"),
            RejectionReason::PairAlreadyOpen => write!(f, "pair already has an open position"),
            RejectionReason::Execution(s) => write!(f, "execution rejected: {s}"),
        }
    }
}

/// A limit order sent to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub pair: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

impl Order {
    pub fn limit(pair: impl Into<String>, side: Side, price: f64, size: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pair: pair.into(),
            side,
            price,
            size,
        }
    }

    /// The order that enters the position described by `proposal`.
    pub fn for_proposal(proposal: &TradeProposal) -> Self {
        Self::limit(
            proposal.pair.clone(),
            proposal.side,
            proposal.entry_price,
            proposal.size,
        )
    }
}

/// Confirmation of a filled order returned by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub pair: String,
    pub side: Side,
    pub fill_price: f64,
    pub size: f64,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of submitting an order.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Filled(Fill),
    Rejected { reason: String },
}

/// Urgency of an operator alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Normal,
    Critical,
}

impl std::fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertPriority::Normal => write!(f, "normal"),
            AlertPriority::Critical => write!(f, "critical"),
        }
    }
}
