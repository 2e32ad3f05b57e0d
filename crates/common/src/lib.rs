pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::{Config, DashboardConfig, TelegramConfig, Timeframes};
pub use error::{Error, Result};
pub use exchange::{AlertSink, MarketDataSource, OrderExecutor};
pub use types::*;
