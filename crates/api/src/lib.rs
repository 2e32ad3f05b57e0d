mod auth;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use common::{PortfolioSnapshot, Result};

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Latest snapshot published by the trading loop.
    pub snapshot: watch::Receiver<PortfolioSnapshot>,
    pub dashboard_token: Arc<str>,
}

impl AppState {
    pub fn new(snapshot: watch::Receiver<PortfolioSnapshot>, dashboard_token: &str) -> Self {
        Self {
            snapshot,
            dashboard_token: Arc::from(dashboard_token),
        }
    }

    fn current(&self) -> PortfolioSnapshot {
        self.snapshot.borrow().clone()
    }
}

/// All routes with state applied.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::api_router(state.clone()))
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Build and run the read-only dashboard API.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Dashboard API listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
