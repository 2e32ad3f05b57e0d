use axum::{
    extract::{Query, State},
    middleware,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use common::ClosedTrade;
use risk::PerformanceReport;

use crate::{auth::require_auth, AppState};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 200;

pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/positions", get(get_positions))
        .route("/api/trades", get(get_trades))
        .route("/api/performance", get(get_performance))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

// ─── Positions ────────────────────────────────────────────────────────────────

async fn get_positions(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.current();
    Json(json!({
        "positions": snapshot.open_positions,
        "total_open": snapshot.open_positions.len(),
        "engine": snapshot.engine_state,
        "cycle": snapshot.cycle,
    }))
}

// ─── Trades ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TradesQuery {
    page: Option<usize>,
    limit: Option<usize>,
    pair: Option<String>,
}

/// Closed trades, newest first, optionally filtered by pair.
async fn get_trades(State(state): State<AppState>, Query(q): Query<TradesQuery>) -> Json<Value> {
    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let snapshot = state.current();
    let matching: Vec<&ClosedTrade> = snapshot
        .history
        .iter()
        .rev()
        .filter(|t| q.pair.as_deref().map_or(true, |pair| t.pair == pair))
        .collect();
    let total = matching.len();
    let trades: Vec<&ClosedTrade> = matching
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    Json(json!({ "trades": trades, "total": total, "page": page, "limit": limit }))
}

// ─── Performance ──────────────────────────────────────────────────────────────

async fn get_performance(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.current();
    let report = PerformanceReport::from_history(&snapshot.history);

    let mut cumulative = 0.0f64;
    let curve: Vec<Value> = snapshot
        .history
        .iter()
        .map(|t| {
            cumulative += t.pnl;
            json!({ "timestamp": t.closed_at, "value": cumulative })
        })
        .collect();

    Json(json!({
        "pnl_curve": curve,
        "trade_count": report.counters.trade_count,
        "win_count": report.counters.win_count,
        "loss_count": report.counters.loss_count,
        "win_rate": report.counters.win_rate(),
        "total_profit_usd": report.counters.total_profit,
        "total_loss_usd": report.counters.total_loss,
        "net_pnl_usd": report.counters.net_pnl(),
        "max_drawdown_usd": report.max_drawdown_usd,
        "sharpe_ratio": report.sharpe_ratio,
    }))
}
