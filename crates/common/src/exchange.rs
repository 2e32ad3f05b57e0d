use async_trait::async_trait;

use crate::{AlertPriority, Execution, IndicatorSet, Order, Result};

/// Source of mark prices and precomputed indicators.
///
/// `Err(Error::Unavailable)` means "skip this pair this cycle". Any other
/// error fails the whole cycle.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Called once at the start of every cycle, before any fetch.
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Latest mark price for a pair.
    async fn mark_price(&self, pair: &str) -> Result<f64>;

    /// Indicator snapshot for a pair on one timeframe (e.g. "5m").
    async fn fetch_indicators(&self, pair: &str, timeframe: &str) -> Result<IndicatorSet>;
}

/// Abstraction over order placement.
///
/// Only the trading loop calls `submit`, and only after the position
/// tracker has accepted the pair. A position is opened only on
/// `Execution::Filled`.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn submit(&self, order: &Order) -> Result<Execution>;
}

/// Fire-and-forget operator notifications. `Err` means undeliverable.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, message: &str, priority: AlertPriority) -> Result<()>;
}
