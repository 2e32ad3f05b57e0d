use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

use common::{EngineState, PortfolioSnapshot};
use engine::EngineHandle;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub engine: EngineHandle,
    pub allowed_user_ids: Arc<Vec<i64>>,
}

/// Telegram bot commands exposed to the operator.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Confluence commands:")]
pub enum Command {
    #[command(description = "Show engine status and PnL summary")]
    Status,
    #[command(description = "List open positions")]
    Positions,
    #[command(description = "Stop the trading loop after the current cycle")]
    Stop,
}

/// Start the Telegram bot in long-polling mode.
pub async fn start_bot(bot: Bot, deps: BotDeps) {
    let deps = Arc::new(deps);

    info!("Telegram bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Status].endpoint(handle_status))
        .branch(case![Command::Positions].endpoint(handle_positions))
        .branch(case![Command::Stop].endpoint(handle_stop));

    Update::filter_message()
        .filter_map(|msg: Message| msg.from().map(|u| u.id))
        .filter_async(auth_filter)
        .branch(command_handler)
}

/// Silently drop messages from users not in the allowed list.
async fn auth_filter(user_id: UserId, deps: Arc<BotDeps>) -> bool {
    let uid = user_id.0 as i64;
    let allowed = deps.allowed_user_ids.contains(&uid);
    if !allowed {
        warn!(user_id = uid, "Unauthorized Telegram access attempt");
    }
    allowed
}

async fn handle_status(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let text = status_text(&deps.engine.snapshot());
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_positions(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let text = positions_text(&deps.engine.snapshot());
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_stop(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    if deps.engine.is_stopped() || deps.engine.state() == EngineState::Stopped {
        bot.send_message(msg.chat.id, "Engine is already stopped.").await?;
    } else {
        info!(chat_id = ?msg.chat.id, "Stop requested via Telegram");
        deps.engine.stop();
        bot.send_message(msg.chat.id, "Stopping after the current cycle\u{2026}").await?;
    }
    Ok(())
}

fn status_text(snapshot: &PortfolioSnapshot) -> String {
    let c = &snapshot.counters;
    format!(
        "Confluence Status\n\
         Engine: {}\n\
         Cycle: {}\n\
         Open positions: {}\n\
         Trades: {} (win rate {:.1}%)\n\
         Net PnL: ${:.4}",
        snapshot.engine_state,
        snapshot.cycle,
        snapshot.open_positions.len(),
        c.trade_count,
        c.win_rate(),
        c.net_pnl()
    )
}

fn positions_text(snapshot: &PortfolioSnapshot) -> String {
    if snapshot.open_positions.is_empty() {
        return "No open positions.".to_string();
    }
    snapshot
        .open_positions
        .iter()
        .map(|p| {
            format!(
                "{} {} @ {:.4} | size {:.4} | stop {:.4} | target {:.4}",
                p.side, p.pair, p.entry_price, p.size, p.stop_loss, p.take_profit
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
