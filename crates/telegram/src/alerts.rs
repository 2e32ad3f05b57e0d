use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::warn;

use common::{AlertPriority, AlertSink, Error, Result};

/// Delivers alerts to every configured chat.
#[derive(Clone)]
pub struct TelegramAlertSink {
    bot: Bot,
    chat_ids: Vec<ChatId>,
}

impl TelegramAlertSink {
    pub fn new(bot: Bot, chat_ids: Vec<ChatId>) -> Self {
        Self { bot, chat_ids }
    }

    /// Private chats share their id with the user, so the operator
    /// allow-list doubles as the recipient list.
    pub fn for_users(bot: Bot, user_ids: &[i64]) -> Self {
        Self::new(bot, user_ids.iter().map(|&id| ChatId(id)).collect())
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn notify(&self, message: &str, priority: AlertPriority) -> Result<()> {
        let text = render(message, priority);
        let mut delivered = 0;
        for &chat_id in &self.chat_ids {
            match self.bot.send_message(chat_id, text.as_str()).await {
                Ok(_) => delivered += 1,
                Err(e) => warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram alert"),
            }
        }
        if delivered == 0 {
            return Err(Error::Alert(format!(
                "no chat accepted the alert ({} configured)",
                self.chat_ids.len()
            )));
        }
        Ok(())
    }
}

fn render(message: &str, priority: AlertPriority) -> String {
    match priority {
        AlertPriority::Normal => message.to_string(),
        AlertPriority::Critical => format!("‼️ CRITICAL\n{message}"),
    }
}
