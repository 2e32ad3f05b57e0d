use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::{AlertSink, Config};
use engine::{Collaborators, LogAlertSink, LoopSettings, TradingLoop};
use paper::PaperExchange;
use risk::PositionTracker;
use strategy::{DecisionEngine, StrategyFileConfig};
use telegram_ctrl::{start_bot, BotDeps, Bot, TelegramAlertSink};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().unwrap_or_else(|e| panic!("Invalid configuration: {e}"));
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .unwrap_or_else(|e| panic!("Failed to load {}: {e}", cfg.strategy_config_path));
    info!(
        pairs = strategy_file.pairs.len(),
        threshold = strategy_file.decision.certainty_threshold,
        max_positions = cfg.max_positions,
        "Confluence starting"
    );

    // ── Paper exchange ────────────────────────────────────────────────────────
    let frames = paper::load_feed(&cfg.paper_feed_path)
        .unwrap_or_else(|e| panic!("Failed to load replay feed {}: {e}", cfg.paper_feed_path));
    let exchange = PaperExchange::new(frames);

    // ── Alerts ────────────────────────────────────────────────────────────────
    let bot = cfg.telegram.as_ref().map(|tg| Bot::new(tg.token.clone()));
    let alerts: Arc<dyn AlertSink> = match (&bot, &cfg.telegram) {
        (Some(bot), Some(tg)) => {
            info!(recipients = tg.allowed_user_ids.len(), "Alerts via Telegram");
            Arc::new(TelegramAlertSink::for_users(bot.clone(), &tg.allowed_user_ids))
        }
        _ => {
            info!("Alerts via log");
            Arc::new(LogAlertSink)
        }
    };

    // ── Trading loop ──────────────────────────────────────────────────────────
    let (trading_loop, handle) = TradingLoop::new(
        LoopSettings::from(&cfg),
        strategy_file.pairs,
        DecisionEngine::new(strategy_file.decision),
        PositionTracker::new(cfg.max_positions),
        Collaborators {
            market: Arc::new(exchange.clone()),
            executor: Arc::new(exchange),
            alerts,
        },
    );

    // ── Telegram C2 ───────────────────────────────────────────────────────────
    if let (Some(bot), Some(tg)) = (bot, &cfg.telegram) {
        let deps = BotDeps {
            engine: handle.clone(),
            allowed_user_ids: Arc::new(tg.allowed_user_ids.clone()),
        };
        tokio::spawn(start_bot(bot, deps));
    }

    // ── Dashboard API ─────────────────────────────────────────────────────────
    if let Some(dashboard) = &cfg.dashboard {
        let state = api::AppState::new(handle.subscribe(), &dashboard.token);
        let port = dashboard.port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(state, port).await {
                error!(error = %e, port, "Dashboard API stopped");
            }
        });
    }

    // ── Run until stopped ─────────────────────────────────────────────────────
    let mut loop_task = tokio::spawn(trading_loop.run());
    let finished = tokio::select! {
        result = &mut loop_task => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Stopping after the current cycle.");
            handle.stop();
            loop_task.await
        }
    };

    match finished {
        Ok(report) => println!("{report}"),
        Err(e) => error!(error = %e, "Trading loop task failed"),
    }
}
