use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Error, Execution, Fill, IndicatorSet, MarketDataSource, Order, OrderExecutor, Result,
};

/// Market state of one pair inside a replay frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairFrame {
    pub mark_price: f64,
    /// Indicator snapshots keyed by timeframe label ("1m", "5m", ...).
    #[serde(default)]
    pub timeframes: HashMap<String, IndicatorSet>,
}

/// Everything the market looks like during one cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayFrame {
    pub pairs: HashMap<String, PairFrame>,
}

/// Load a replay feed: a JSON array of frames, one per cycle.
pub fn load_feed(path: &str) -> Result<Vec<ReplayFrame>> {
    let content = std::fs::read_to_string(path)?;
    let frames: Vec<ReplayFrame> = serde_json::from_str(&content)?;
    if frames.is_empty() {
        return Err(Error::Config(format!("replay feed '{path}' has no frames")));
    }
    Ok(frames)
}

#[derive(Debug, Default)]
struct ReplayState {
    frames: Vec<ReplayFrame>,
    /// Index of the next frame `refresh` will load.
    cursor: usize,
    current: ReplayFrame,
}

/// Simulated market and order executor for paper trading.
///
/// Market data comes from a sequence of replay frames; `refresh` steps to
/// the next frame and holds the last one once the feed is exhausted.
/// Orders fill at their limit price. No real orders are ever sent.
#[derive(Clone, Default)]
pub struct PaperExchange {
    state: Arc<RwLock<ReplayState>>,
}

impl PaperExchange {
    pub fn new(frames: Vec<ReplayFrame>) -> Self {
        info!(frames = frames.len(), "PaperExchange initialized");
        Self {
            state: Arc::new(RwLock::new(ReplayState {
                frames,
                cursor: 0,
                current: ReplayFrame::default(),
            })),
        }
    }

    /// Override the mark price of a pair in the current frame.
    pub async fn set_mark_price(&self, pair: &str, price: f64) {
        let mut state = self.state.write().await;
        state
            .current
            .pairs
            .entry(pair.to_string())
            .or_default()
            .mark_price = price;
    }

    /// Override one timeframe's indicators of a pair in the current frame.
    pub async fn set_indicators(&self, pair: &str, timeframe: &str, set: IndicatorSet) {
        let mut state = self.state.write().await;
        state
            .current
            .pairs
            .entry(pair.to_string())
            .or_default()
            .timeframes
            .insert(timeframe.to_string(), set);
    }

    /// Number of frames loaded so far.
    pub async fn frames_consumed(&self) -> usize {
        self.state.read().await.cursor
    }
}

#[async_trait]
impl MarketDataSource for PaperExchange {
    async fn refresh(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.cursor < state.frames.len() {
            let next = state.frames[state.cursor].clone();
            state.current = next;
            state.cursor += 1;
            debug!(frame = state.cursor, "Replay frame loaded");
        }
        Ok(())
    }

    async fn mark_price(&self, pair: &str) -> Result<f64> {
        let state = self.state.read().await;
        match state.current.pairs.get(pair) {
            Some(frame) if frame.mark_price > 0.0 => Ok(frame.mark_price),
            _ => Err(Error::unavailable(pair, "mark")),
        }
    }

    async fn fetch_indicators(&self, pair: &str, timeframe: &str) -> Result<IndicatorSet> {
        let state = self.state.read().await;
        state
            .current
            .pairs
            .get(pair)
            .and_then(|frame| frame.timeframes.get(timeframe))
            .cloned()
            .ok_or_else(|| Error::unavailable(pair, timeframe))
    }
}

#[async_trait]
impl OrderExecutor for PaperExchange {
    async fn submit(&self, order: &Order) -> Result<Execution> {
        if !(order.price > 0.0 && order.size > 0.0) {
            return Ok(Execution::Rejected {
                reason: format!("invalid price {} or size {}", order.price, order.size),
            });
        }
        if !self.state.read().await.current.pairs.contains_key(&order.pair) {
            return Ok(Execution::Rejected {
                reason: format!("no market for {}", order.pair),
            });
        }

        debug!(
            pair = %order.pair,
            side = %order.side,
            price = order.price,
            size = order.size,
            "Paper fill simulated"
        );

        Ok(Execution::Filled(Fill {
            order_id: order.id.clone(),
            pair: order.pair.clone(),
            side: order.side,
            fill_price: order.price,
            size: order.size,
            timestamp: Utc::now(),
        }))
    }
}
