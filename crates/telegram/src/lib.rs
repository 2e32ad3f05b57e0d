pub mod alerts;
pub mod commands;

pub use alerts::TelegramAlertSink;
pub use commands::{start_bot, BotDeps, Command};

pub use teloxide::Bot;
